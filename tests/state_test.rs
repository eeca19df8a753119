use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use pagespeed_lab::config::{LabConfig, PollTimings};
use pagespeed_lab::lifecycle::LifecyclePhase;
use pagespeed_lab::log_capture::{LogLevel, LogSource};
use pagespeed_lab::state::LabState;

fn test_config(backend_url: Option<Url>) -> LabConfig {
    LabConfig {
        port: 9890,
        backend_url,
        log_file: None,
        settings_path: PathBuf::from("/tmp/settings.json"),
        simulate_latency: false,
        poll: PollTimings {
            initial_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
            max_polls: 4,
        },
        request_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn test_state_creation_with_mock() {
    let state = LabState::new(test_config(None)).unwrap();

    assert_eq!(state.config.backend_kind(), "mock");
    assert_eq!(state.controller.timings().max_polls, 4);

    let session = state.controller.status().await;
    assert_eq!(session.phase, LifecyclePhase::Idle);
    assert!(session.url.is_none());
    assert!(!session.loading);
    assert!(state.logs.history().await.is_empty());
}

#[tokio::test]
async fn test_state_creation_with_http_backend() {
    let url = Url::parse("http://127.0.0.1:9/api").unwrap();
    let state = LabState::new(test_config(Some(url))).unwrap();

    assert_eq!(state.config.backend_kind(), "http");
    assert_eq!(
        state.controller.status().await.phase,
        LifecyclePhase::Idle
    );
}

#[tokio::test]
async fn test_log_buffer_bounded() {
    let state = LabState::new(test_config(None)).unwrap();
    for i in 0..600 {
        state
            .logs
            .emit(LogSource::Lab, LogLevel::Debug, format!("entry {}", i))
            .await;
    }

    let history = state.logs.history().await;
    assert_eq!(history.len(), 500);
    assert_eq!(history.first().unwrap().message, "entry 100");
    assert_eq!(history.last().unwrap().message, "entry 599");
}

#[tokio::test]
async fn test_log_subscribers_receive_entries() {
    let state = LabState::new(test_config(None)).unwrap();
    let mut rx = state.logs.subscribe();

    state
        .logs
        .emit_for(7, LogSource::Lifecycle, LogLevel::Info, "hello")
        .await;

    let entry = rx.recv().await.unwrap();
    assert_eq!(entry.submission, Some(7));
    assert_eq!(entry.source, LogSource::Lifecycle);
    assert_eq!(entry.message, "hello");
}
