use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};

use crate::config::LOG_BUFFER_SIZE;

/// One line of the activity log shown next to the session.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    /// Submission the entry belongs to, if any.
    pub submission: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Lab,
    Lifecycle,
    Backend,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Bounded in-memory log with a live feed for subscribers.
pub struct LogState {
    buffer: RwLock<VecDeque<LogEntry>>,
    sender: broadcast::Sender<LogEntry>,
}

impl Default for LogState {
    fn default() -> Self {
        Self::new()
    }
}

impl LogState {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(LOG_BUFFER_SIZE)),
            sender,
        }
    }

    pub async fn push(&self, entry: LogEntry) {
        let mut buf = self.buffer.write().await;
        if buf.len() >= LOG_BUFFER_SIZE {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);

        let _ = self.sender.send(entry);
    }

    pub async fn history(&self) -> Vec<LogEntry> {
        self.buffer.read().await.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    pub async fn emit(&self, source: LogSource, level: LogLevel, message: impl Into<String>) {
        self.push(LogEntry {
            timestamp: Utc::now(),
            source,
            level,
            submission: None,
            message: message.into(),
        })
        .await;
    }

    /// Like [`LogState::emit`], tagged with the submission it concerns.
    pub async fn emit_for(
        &self,
        submission: u64,
        source: LogSource,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        self.push(LogEntry {
            timestamp: Utc::now(),
            source,
            level,
            submission: Some(submission),
            message: message.into(),
        })
        .await;
    }
}
