use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LabConfig;

/// Optional overrides read from the settings file. Missing fields keep the defaults.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct PersistentSettings {
    pub initial_poll_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

impl PersistentSettings {
    /// Overlay the fields set in `other`.
    pub fn merge(&mut self, other: PersistentSettings) {
        if other.initial_poll_delay_ms.is_some() {
            self.initial_poll_delay_ms = other.initial_poll_delay_ms;
        }
        if other.poll_interval_ms.is_some() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.max_poll_attempts.is_some() {
            self.max_poll_attempts = other.max_poll_attempts;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
    }

    pub fn apply(&self, config: &mut LabConfig) {
        if let Some(ms) = self.initial_poll_delay_ms {
            config.poll.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll.poll_interval = Duration::from_millis(ms);
        }
        // Zero would make every submission time out before its first poll.
        if let Some(max) = self.max_poll_attempts.filter(|max| *max > 0) {
            config.poll.max_polls = max;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
    }
}

pub fn load_settings(path: &Path) -> PersistentSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => {
                info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Ignoring malformed settings file {:?}: {}", path, e);
                PersistentSettings::default()
            }
        },
        Err(_) => PersistentSettings::default(),
    }
}

pub fn save_settings(path: &Path, settings: &PersistentSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    info!("Saved settings to {:?}", path);
    Ok(())
}
