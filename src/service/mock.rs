use async_trait::async_trait;
use chrono::{Local, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use super::SpeedTestService;
use crate::config::{
    HISTORY_LEN, HISTORY_SPACING_DAYS, MOCK_HISTORY_LATENCY_MS, MOCK_POLLS_BEFORE_COMPLETE,
    MOCK_POLL_LATENCY_MS, MOCK_START_LATENCY_MS, MOCK_TREND_LATENCY_MS, TREND_WINDOW_DAYS,
};
use crate::error::ServiceError;
use crate::report::{
    DeviceReport, MetricReport, Region, SpeedTest, StartedTest, TestStatus, TrendPoint,
};

/// Regions the simulated backend runs tests from: (value, label).
pub const REGIONS: &[(&str, &str)] = &[
    ("us-central1", "Iowa, USA"),
    ("europe-west1", "Belgium"),
    ("asia-east1", "Taiwan"),
    ("australia-southeast1", "Sydney, Australia"),
];

/// Pending tests keyed by id, with the number of polls each has received.
#[derive(Default)]
pub struct PendingTestStore {
    polls: Mutex<HashMap<String, u32>>,
}

/// Outcome of recording one poll against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Running { polls: u32 },
    Ready,
    Unknown,
}

impl PendingTestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str) {
        self.polls.lock().await.insert(id.to_string(), 0);
    }

    /// Count a poll. The entry is removed once it reports ready, so a test
    /// completes at most once.
    pub async fn record_poll(&self, id: &str, polls_before_complete: u32) -> PollOutcome {
        let mut polls = self.polls.lock().await;
        let Some(count) = polls.get_mut(id) else {
            return PollOutcome::Unknown;
        };

        let previous = *count;
        *count += 1;
        if previous >= polls_before_complete {
            polls.remove(id);
            PollOutcome::Ready
        } else {
            PollOutcome::Running { polls: previous + 1 }
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.polls.lock().await.contains_key(id)
    }
}

/// Artificial delay applied to each mock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockLatency {
    pub start: Duration,
    pub poll: Duration,
    pub history: Duration,
    pub trend: Duration,
}

impl MockLatency {
    pub fn simulated() -> Self {
        Self {
            start: Duration::from_millis(MOCK_START_LATENCY_MS),
            poll: Duration::from_millis(MOCK_POLL_LATENCY_MS),
            history: Duration::from_millis(MOCK_HISTORY_LATENCY_MS),
            trend: Duration::from_millis(MOCK_TREND_LATENCY_MS),
        }
    }

    pub fn none() -> Self {
        Self {
            start: Duration::ZERO,
            poll: Duration::ZERO,
            history: Duration::ZERO,
            trend: Duration::ZERO,
        }
    }
}

impl Default for MockLatency {
    fn default() -> Self {
        Self::simulated()
    }
}

/// In-process backend producing random but plausible Core Web Vitals.
pub struct MockSpeedTestService {
    store: PendingTestStore,
    latency: MockLatency,
    polls_before_complete: u32,
}

impl MockSpeedTestService {
    pub fn new(latency: MockLatency) -> Self {
        Self {
            store: PendingTestStore::new(),
            latency,
            polls_before_complete: MOCK_POLLS_BEFORE_COMPLETE,
        }
    }

    /// Number of `running` answers a test gets before it completes.
    pub fn with_polls_before_complete(mut self, polls: u32) -> Self {
        self.polls_before_complete = polls;
        self
    }

    pub fn store(&self) -> &PendingTestStore {
        &self.store
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

fn random_region() -> Region {
    let (value, label) = REGIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(REGIONS[0]);
    Region {
        value: value.to_string(),
        label: label.to_string(),
    }
}

fn seconds(score: f64) -> MetricReport {
    MetricReport {
        score,
        display_value: format!("{:.1} s", score),
    }
}

fn random_report() -> DeviceReport {
    let mut rng = rand::thread_rng();
    let cls: f64 = rng.gen_range(0.0..0.3);
    let fcp: f64 = rng.gen_range(0.5..3.0);
    let lcp: f64 = rng.gen_range(1.0..4.0);

    DeviceReport {
        cls: MetricReport {
            score: cls,
            display_value: format!("{:.3}", cls),
        },
        fcp: seconds(fcp),
        lcp: seconds(lcp),
    }
}

fn random_trend_point(date: String) -> TrendPoint {
    let mut rng = rand::thread_rng();
    TrendPoint {
        date,
        cls: rng.gen_range(0.0..0.2),
        fcp: rng.gen_range(500.0..2500.0),
        lcp: rng.gen_range(1000.0..4000.0),
    }
}

fn new_test_id() -> String {
    format!(
        "test_{}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

#[async_trait]
impl SpeedTestService for MockSpeedTestService {
    async fn start_test(&self, url: &str) -> Result<StartedTest, ServiceError> {
        let id = new_test_id();
        self.store.register(&id).await;
        debug!("Mock backend registered {} for {}", id, url);

        pause(self.latency.start).await;
        Ok(StartedTest {
            id,
            status: TestStatus::Running,
        })
    }

    async fn get_test_result(&self, url: &str, id: &str) -> Result<SpeedTest, ServiceError> {
        let outcome = self.store.record_poll(id, self.polls_before_complete).await;
        if outcome == PollOutcome::Unknown {
            return Err(ServiceError::NotFound(id.to_string()));
        }

        pause(self.latency.poll).await;

        let (status, desktop_report, mobile_report) = match outcome {
            PollOutcome::Ready => (
                TestStatus::Complete,
                Some(random_report()),
                Some(random_report()),
            ),
            _ => (TestStatus::Running, None, None),
        };
        debug!("Mock backend poll {}: {:?}", id, outcome);

        Ok(SpeedTest {
            id: id.to_string(),
            date: Utc::now(),
            url: url.to_string(),
            status,
            region: random_region(),
            desktop_report,
            mobile_report,
        })
    }

    async fn get_test_history(&self, url: &str) -> Result<Vec<SpeedTest>, ServiceError> {
        let now = Utc::now();
        let history: Vec<SpeedTest> = (0..HISTORY_LEN as i64)
            .map(|i| SpeedTest {
                id: format!("hist_{}_{}", i, Uuid::new_v4().simple()),
                date: now - chrono::Duration::days(i * HISTORY_SPACING_DAYS),
                url: url.to_string(),
                status: TestStatus::Complete,
                region: random_region(),
                desktop_report: Some(random_report()),
                mobile_report: Some(random_report()),
            })
            .collect();

        pause(self.latency.history).await;
        Ok(history)
    }

    async fn get_trend_data(&self, _url: &str) -> Result<Vec<TrendPoint>, ServiceError> {
        let today = Local::now().date_naive();
        let trend: Vec<TrendPoint> = (0..=TREND_WINDOW_DAYS)
            .rev()
            .map(|days_ago| {
                let day = today - chrono::Duration::days(days_ago);
                random_trend_point(day.format("%Y-%m-%d").to_string())
            })
            .collect();

        pause(self.latency.trend).await;
        Ok(trend)
    }
}
