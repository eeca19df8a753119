use std::fmt;
use url::Url;

use crate::error::ServiceError;

/// An absolute http(s) URL that has passed input validation.
///
/// The lifecycle controller only accepts this type, so malformed input is
/// rejected before any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl(Url);

impl TargetUrl {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::InvalidInput("empty URL".to_string()));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| ServiceError::InvalidInput(format!("{}: {}", trimmed, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ServiceError::InvalidInput(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ServiceError::InvalidInput(format!("{} has no host", trimmed)));
        }

        Ok(TargetUrl(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
