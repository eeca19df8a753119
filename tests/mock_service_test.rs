use chrono::{Local, NaiveDate};
use std::collections::HashSet;

use pagespeed_lab::error::ServiceError;
use pagespeed_lab::report::{DeviceReport, TestStatus};
use pagespeed_lab::service::mock::{PollOutcome, REGIONS};
use pagespeed_lab::service::{MockLatency, MockSpeedTestService, PendingTestStore, SpeedTestService};

const URL: &str = "https://example.com/";

fn service() -> MockSpeedTestService {
    MockSpeedTestService::new(MockLatency::none())
}

fn assert_report_in_range(report: &DeviceReport) {
    assert!((0.0..0.3).contains(&report.cls.score), "cls {}", report.cls.score);
    assert!((0.5..3.0).contains(&report.fcp.score), "fcp {}", report.fcp.score);
    assert!((1.0..4.0).contains(&report.lcp.score), "lcp {}", report.lcp.score);
    assert_eq!(report.cls.display_value, format!("{:.3}", report.cls.score));
    assert_eq!(report.lcp.display_value, format!("{:.1} s", report.lcp.score));
}

// --- Store ---

#[tokio::test]
async fn test_store_counts_polls_then_purges() {
    let store = PendingTestStore::new();
    store.register("a").await;

    assert_eq!(store.record_poll("a", 2).await, PollOutcome::Running { polls: 1 });
    assert_eq!(store.record_poll("a", 2).await, PollOutcome::Running { polls: 2 });
    assert_eq!(store.record_poll("a", 2).await, PollOutcome::Ready);
    assert_eq!(store.record_poll("a", 2).await, PollOutcome::Unknown);
    assert!(!store.contains("a").await);
}

#[tokio::test]
async fn test_store_unknown_id() {
    let store = PendingTestStore::new();
    assert_eq!(store.record_poll("missing", 2).await, PollOutcome::Unknown);
}

// --- start_test / get_test_result ---

#[tokio::test]
async fn test_start_registers_running_test() {
    let service = service();
    let started = service.start_test(URL).await.unwrap();

    assert_eq!(started.status, TestStatus::Running);
    assert!(started.id.starts_with("test_"));
    assert!(service.store().contains(&started.id).await);
}

#[tokio::test]
async fn test_ids_are_unique() {
    let service = service();
    let mut ids = HashSet::new();
    for _ in 0..100 {
        let started = service.start_test(URL).await.unwrap();
        assert!(service.store().contains(&started.id).await);
        assert!(ids.insert(started.id));
    }
}

#[tokio::test]
async fn test_completes_on_third_poll() {
    let service = service();
    let id = service.start_test(URL).await.unwrap().id;

    for _ in 0..2 {
        let running = service.get_test_result(URL, &id).await.unwrap();
        assert_eq!(running.status, TestStatus::Running);
        assert!(running.desktop_report.is_none());
        assert!(running.mobile_report.is_none());
        assert_eq!(running.id, id);
    }

    let complete = service.get_test_result(URL, &id).await.unwrap();
    assert_eq!(complete.status, TestStatus::Complete);
    assert_eq!(complete.url, URL);
    assert!(complete.is_well_formed());
    assert_report_in_range(complete.desktop_report.as_ref().unwrap());
    assert_report_in_range(complete.mobile_report.as_ref().unwrap());
    assert!(REGIONS.iter().any(|(value, _)| *value == complete.region.value));

    assert!(!service.store().contains(&id).await);
}

#[tokio::test]
async fn test_poll_after_completion_is_not_found() {
    let service = service();
    let id = service.start_test(URL).await.unwrap().id;
    for _ in 0..3 {
        service.get_test_result(URL, &id).await.unwrap();
    }

    let err = service.get_test_result(URL, &id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ref missing) if *missing == id));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let err = service()
        .get_test_result(URL, "test_never_started")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_custom_completion_threshold() {
    let service = service().with_polls_before_complete(0);
    let id = service.start_test(URL).await.unwrap().id;
    let result = service.get_test_result(URL, &id).await.unwrap();
    assert_eq!(result.status, TestStatus::Complete);
}

// --- History / trend ---

#[tokio::test]
async fn test_history_has_five_complete_entries() {
    let history = service().get_test_history(URL).await.unwrap();

    assert_eq!(history.len(), 5);
    for test in &history {
        assert_eq!(test.status, TestStatus::Complete);
        assert!(test.is_well_formed());
        assert!(test.id.starts_with("hist_"));
        assert_eq!(test.url, URL);
    }
    for pair in history.windows(2) {
        assert!(pair[0].date > pair[1].date, "history must be most recent first");
    }
}

#[tokio::test]
async fn test_trend_has_eleven_consecutive_days() {
    let trend = service().get_trend_data(URL).await.unwrap();
    assert_eq!(trend.len(), 11);

    let days: Vec<NaiveDate> = trend
        .iter()
        .map(|p| NaiveDate::parse_from_str(&p.date, "%Y-%m-%d").unwrap())
        .collect();
    for pair in days.windows(2) {
        assert_eq!(pair[1] - pair[0], chrono::Duration::days(1));
    }

    let today = Local::now().date_naive();
    let last = *days.last().unwrap();
    assert!(last == today || last + chrono::Duration::days(1) == today);

    for point in &trend {
        assert!((0.0..0.2).contains(&point.cls));
        assert!((500.0..2500.0).contains(&point.fcp));
        assert!((1000.0..4000.0).contains(&point.lcp));
    }
}
