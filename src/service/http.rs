use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::SpeedTestService;
use crate::config::{HISTORY_LEN, TREND_LEN};
use crate::error::ServiceError;
use crate::report::{SpeedTest, StartedTest, TrendPoint};

/// Client for a speed-test backend speaking JSON over HTTP.
///
/// Endpoints, relative to `base_url`:
/// `POST tests`, `GET tests/{id}?url=`, `GET history?url=`, `GET trend?url=`.
pub struct HttpSpeedTestService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSpeedTestService {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ServiceError::Unknown(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // Url::join drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, target: Option<&str>) -> Result<Url, ServiceError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ServiceError::Unknown(format!("Bad endpoint '{}': {}", path, e)))?;
        if let Some(target) = target {
            url.query_pairs_mut().append_pair("url", target);
        }
        Ok(url)
    }

    /// `tests/{id}` with the id percent-encoded as a single path segment.
    fn test_endpoint(&self, id: &str, target: &str) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::Unknown(format!("Backend URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .push("tests")
            .push(id);
        url.query_pairs_mut().append_pair("url", target);
        Ok(url)
    }
}

fn unavailable(e: reqwest::Error) -> ServiceError {
    ServiceError::ServiceUnavailable(e.to_string())
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ServiceError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("Backend responded {}: {}", status, body);
        return Err(ServiceError::ServiceUnavailable(format!(
            "backend responded {}",
            status
        )));
    }

    resp.json::<T>()
        .await
        .map_err(|e| ServiceError::Unknown(format!("Failed to parse backend response: {}", e)))
}

#[async_trait]
impl SpeedTestService for HttpSpeedTestService {
    async fn start_test(&self, url: &str) -> Result<StartedTest, ServiceError> {
        let endpoint = self.endpoint("tests", None)?;
        debug!("POST {}", endpoint);
        let resp = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(unavailable)?;
        decode(resp).await
    }

    async fn get_test_result(&self, url: &str, id: &str) -> Result<SpeedTest, ServiceError> {
        let endpoint = self.test_endpoint(id, url)?;
        debug!("GET {}", endpoint);
        let resp = self.client.get(endpoint).send().await.map_err(unavailable)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        decode(resp).await
    }

    async fn get_test_history(&self, url: &str) -> Result<Vec<SpeedTest>, ServiceError> {
        let endpoint = self.endpoint("history", Some(url))?;
        debug!("GET {}", endpoint);
        let resp = self.client.get(endpoint).send().await.map_err(unavailable)?;
        let history: Vec<SpeedTest> = decode(resp).await?;
        if history.len() != HISTORY_LEN || !history.iter().all(|t| t.is_well_formed()) {
            return Err(ServiceError::Unknown(format!(
                "Backend returned malformed history ({} entries, expected {})",
                history.len(),
                HISTORY_LEN
            )));
        }
        Ok(history)
    }

    async fn get_trend_data(&self, url: &str) -> Result<Vec<TrendPoint>, ServiceError> {
        let endpoint = self.endpoint("trend", Some(url))?;
        debug!("GET {}", endpoint);
        let resp = self.client.get(endpoint).send().await.map_err(unavailable)?;
        let trend: Vec<TrendPoint> = decode(resp).await?;
        if trend.len() != TREND_LEN {
            return Err(ServiceError::Unknown(format!(
                "Backend returned {} trend points, expected {}",
                trend.len(),
                TREND_LEN
            )));
        }
        Ok(trend)
    }
}
