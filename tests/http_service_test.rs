use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use pagespeed_lab::error::ServiceError;
use pagespeed_lab::report::TestStatus;
use pagespeed_lab::service::{HttpSpeedTestService, SpeedTestService};

const TARGET: &str = "https://example.com/";

#[derive(Deserialize)]
struct TargetQuery {
    url: String,
}

fn report() -> Value {
    json!({
        "cls": {"score": 0.02, "displayValue": "0.020"},
        "fcp": {"score": 1.2, "displayValue": "1.2 s"},
        "lcp": {"score": 2.1, "displayValue": "2.1 s"}
    })
}

fn complete_test(id: &str, url: &str) -> Value {
    json!({
        "id": id,
        "date": "2024-05-01T10:00:00Z",
        "url": url,
        "status": "complete",
        "region": {"value": "us-central1", "label": "Iowa, USA"},
        "desktopReport": report(),
        "mobileReport": report()
    })
}

async fn start(Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(body["url"], TARGET);
    Json(json!({"id": "t1", "status": "running"}))
}

async fn result(Path(id): Path<String>, Query(q): Query<TargetQuery>) -> impl IntoResponse {
    match id.as_str() {
        "t1" | "odd/id?x#y" => (StatusCode::OK, Json(complete_test(&id, &q.url))).into_response(),
        "garbled" => (StatusCode::OK, "<html>oops</html>").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn history(Query(q): Query<TargetQuery>) -> impl IntoResponse {
    let entries: Vec<Value> = (0..5)
        .map(|i| complete_test(&format!("hist_{}", i), &q.url))
        .collect();
    Json(entries)
}

async fn trend() -> impl IntoResponse {
    let points: Vec<Value> = (1..=11)
        .map(|day| json!({"date": format!("2024-05-{:02}", day), "cls": 0.1, "fcp": 900.0, "lcp": 2100.0}))
        .collect();
    Json(points)
}

async fn short_history(Query(q): Query<TargetQuery>) -> impl IntoResponse {
    let mut entries: Vec<Value> = (0..5)
        .map(|i| complete_test(&format!("hist_{}", i), &q.url))
        .collect();
    entries.truncate(3);
    Json(entries)
}

async fn reportless_history(Query(q): Query<TargetQuery>) -> impl IntoResponse {
    let mut entries: Vec<Value> = (0..5)
        .map(|i| complete_test(&format!("hist_{}", i), &q.url))
        .collect();
    entries[2]
        .as_object_mut()
        .expect("object")
        .remove("mobileReport");
    Json(entries)
}

async fn short_trend() -> impl IntoResponse {
    let points: Vec<Value> = (1..=4)
        .map(|day| json!({"date": format!("2024-05-{:02}", day), "cls": 0.1, "fcp": 900.0, "lcp": 2100.0}))
        .collect();
    Json(points)
}

async fn broken() -> impl IntoResponse {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Serve a stub backend under `/api` and return its base URL.
async fn spawn_backend() -> Url {
    let app = Router::new()
        .route("/api/tests", post(start))
        .route("/api/tests/{id}", get(result))
        .route("/api/history", get(history))
        .route("/api/trend", get(trend))
        .route("/broken/history", get(broken))
        .route("/short/history", get(short_history))
        .route("/short/trend", get(short_trend))
        .route("/partial/history", get(reportless_history));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{}/api", addr)).unwrap()
}

fn client(base: Url) -> HttpSpeedTestService {
    HttpSpeedTestService::new(base, Duration::from_secs(5)).unwrap()
}

#[test]
fn test_base_url_gets_trailing_slash() {
    let service = client(Url::parse("http://localhost:1234/api").unwrap());
    assert_eq!(service.base_url().as_str(), "http://localhost:1234/api/");
}

#[tokio::test]
async fn test_start_and_fetch_result() {
    let service = client(spawn_backend().await);

    let started = service.start_test(TARGET).await.unwrap();
    assert_eq!(started.id, "t1");
    assert_eq!(started.status, TestStatus::Running);

    let result = service.get_test_result(TARGET, "t1").await.unwrap();
    assert_eq!(result.status, TestStatus::Complete);
    assert_eq!(result.url, TARGET);
    assert!(result.is_well_formed());
    assert_eq!(result.desktop_report.unwrap().lcp.display_value, "2.1 s");
}

#[tokio::test]
async fn test_unknown_result_maps_to_not_found() {
    let service = client(spawn_backend().await);
    let err = service.get_test_result(TARGET, "gone").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ref id) if id == "gone"));
}

#[tokio::test]
async fn test_undecodable_body_maps_to_unknown() {
    let service = client(spawn_backend().await);
    let err = service.get_test_result(TARGET, "garbled").await.unwrap_err();
    assert!(matches!(err, ServiceError::Unknown(_)));
}

#[tokio::test]
async fn test_history_and_trend() {
    let service = client(spawn_backend().await);

    let history = service.get_test_history(TARGET).await.unwrap();
    assert_eq!(history.len(), 5);
    assert!(history.iter().all(|t| t.url == TARGET));

    let trend = service.get_trend_data(TARGET).await.unwrap();
    assert_eq!(trend.len(), 11);
    assert_eq!(trend[0].date, "2024-05-01");
    assert_eq!(trend[10].date, "2024-05-11");
}

#[tokio::test]
async fn test_server_error_maps_to_unavailable() {
    let base = spawn_backend().await;
    let broken = base.join("/broken").unwrap();
    let err = client(broken).get_test_history(TARGET).await.unwrap_err();
    assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let service = client(Url::parse(&format!("http://{}/", addr)).unwrap());
    let err = service.start_test(TARGET).await.unwrap_err();
    assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_test_id_is_encoded_as_one_segment() {
    let service = client(spawn_backend().await);

    let result = service.get_test_result(TARGET, "odd/id?x#y").await.unwrap();
    assert_eq!(result.id, "odd/id?x#y");
    assert_eq!(result.url, TARGET);
}

#[tokio::test]
async fn test_short_history_is_rejected() {
    let base = spawn_backend().await;
    let service = client(base.join("/short").unwrap());

    let err = service.get_test_history(TARGET).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unknown(_)));
}

#[tokio::test]
async fn test_history_without_reports_is_rejected() {
    let base = spawn_backend().await;
    let service = client(base.join("/partial").unwrap());

    let err = service.get_test_history(TARGET).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unknown(_)));
}

#[tokio::test]
async fn test_short_trend_is_rejected() {
    let base = spawn_backend().await;
    let service = client(base.join("/short").unwrap());

    let err = service.get_trend_data(TARGET).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unknown(_)));
}
