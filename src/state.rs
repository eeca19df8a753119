use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::LabConfig;
use crate::error::ServiceError;
use crate::lifecycle::LifecycleController;
use crate::log_capture::LogState;
use crate::service::{HttpSpeedTestService, MockLatency, MockSpeedTestService, SpeedTestService};

pub type SharedState = Arc<LabState>;

pub struct LabState {
    pub config: LabConfig,
    pub controller: Arc<LifecycleController>,
    pub logs: Arc<LogState>,
    pub started_at: DateTime<Utc>,
}

impl LabState {
    pub fn new(config: LabConfig) -> Result<Self, ServiceError> {
        let service = build_service(&config)?;
        Ok(Self::with_service(config, service))
    }

    pub fn with_service(config: LabConfig, service: Arc<dyn SpeedTestService>) -> Self {
        let logs = Arc::new(LogState::new());
        let controller = Arc::new(LifecycleController::new(
            service,
            config.poll,
            Arc::clone(&logs),
        ));
        Self {
            config,
            controller,
            logs,
            started_at: Utc::now(),
        }
    }
}

/// The HTTP client when a backend URL is configured, the mock otherwise.
pub fn build_service(config: &LabConfig) -> Result<Arc<dyn SpeedTestService>, ServiceError> {
    match &config.backend_url {
        Some(url) => {
            let service = HttpSpeedTestService::new(url.clone(), config.request_timeout)?;
            info!("Using speed-test backend at {}", service.base_url());
            Ok(Arc::new(service))
        }
        None => {
            let latency = if config.simulate_latency {
                MockLatency::simulated()
            } else {
                MockLatency::none()
            };
            info!("Using mock speed-test backend (latency {:?})", latency);
            Ok(Arc::new(MockSpeedTestService::new(latency)))
        }
    }
}
