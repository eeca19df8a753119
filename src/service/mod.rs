//! Backends that run speed tests.
//!
//! Starting a test and fetching its result are separate calls: the backend
//! does the work asynchronously and callers poll until the result reports a
//! terminal status.

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::report::{SpeedTest, StartedTest, TrendPoint};

pub use http::HttpSpeedTestService;
pub use mock::{MockLatency, MockSpeedTestService, PendingTestStore};

#[async_trait]
pub trait SpeedTestService: Send + Sync + 'static {
    /// Register a new test for `url`. Returns its id with status `running`.
    async fn start_test(&self, url: &str) -> Result<StartedTest, ServiceError>;

    /// Current state of a started test.
    ///
    /// Returns `Err(ServiceError::NotFound)` for ids that were never started or
    /// whose completed result has already been handed out.
    async fn get_test_result(&self, url: &str, id: &str) -> Result<SpeedTest, ServiceError>;

    /// Previous complete tests for `url`, most recent first.
    async fn get_test_history(&self, url: &str) -> Result<Vec<SpeedTest>, ServiceError>;

    /// Daily trend points for `url`, oldest first.
    async fn get_trend_data(&self, url: &str) -> Result<Vec<TrendPoint>, ServiceError>;
}
