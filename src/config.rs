use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// PageSpeed Lab: runs simulated Core Web Vitals tests and tracks their lifecycle.
#[derive(Parser, Debug, Clone)]
#[command(name = "pagespeed-lab")]
pub struct CliArgs {
    /// HTTP port for the session API
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Base URL of a real speed-test backend (uses the built-in mock when absent)
    #[arg(short = 'b', long = "backend-url")]
    pub backend_url: Option<Url>,

    /// Write logs to this file in addition to stdout
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Path to the JSON settings file
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Simulate backend latency in the mock (off makes every call instant)
    #[arg(long = "simulate-latency", default_value_t = true, action = clap::ArgAction::Set)]
    pub simulate_latency: bool,
}

pub struct LabConfig {
    pub port: u16,
    pub backend_url: Option<Url>,
    pub log_file: Option<PathBuf>,
    pub settings_path: PathBuf,
    pub simulate_latency: bool,
    pub poll: PollTimings,
    pub request_timeout: Duration,
}

// Port constants
pub const DEFAULT_PORT: u16 = 9890;

// Polling constants
pub const INITIAL_POLL_DELAY_MS: u64 = 1000;
pub const POLL_INTERVAL_MS: u64 = 2000;
pub const MAX_POLL_ATTEMPTS: u32 = 30;

// Backend constants
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const HISTORY_LEN: usize = 5;
pub const HISTORY_SPACING_DAYS: i64 = 2;
pub const TREND_WINDOW_DAYS: i64 = 10;
pub const TREND_LEN: usize = TREND_WINDOW_DAYS as usize + 1;
pub const MOCK_POLLS_BEFORE_COMPLETE: u32 = 2;

// Mock latency constants
pub const MOCK_START_LATENCY_MS: u64 = 500;
pub const MOCK_POLL_LATENCY_MS: u64 = 1000;
pub const MOCK_HISTORY_LATENCY_MS: u64 = 300;
pub const MOCK_TREND_LATENCY_MS: u64 = 500;

// Log constants
pub const LOG_BUFFER_SIZE: usize = 500;

/// Delays governing one submission's polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimings {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_POLL_DELAY_MS),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_polls: MAX_POLL_ATTEMPTS,
        }
    }
}

impl LabConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let settings_path = args.settings.unwrap_or_else(default_settings_path);

        LabConfig {
            port: args.port,
            backend_url: args.backend_url,
            log_file: args.log_file,
            settings_path,
            simulate_latency: args.simulate_latency,
            poll: PollTimings::default(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Human-readable name of the backend this process talks to.
    pub fn backend_kind(&self) -> &'static str {
        if self.backend_url.is_some() {
            "http"
        } else {
            "mock"
        }
    }
}

/// `<config dir>/pagespeed-lab/settings.json`, falling back to the working directory.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("pagespeed-lab"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("settings.json")
}
