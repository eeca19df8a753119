//! Test lifecycle: submit, poll until the backend finishes, then expose the
//! result with its history and trend side channels.
//!
//! Every submission gets a monotonically increasing [`SubmissionId`] and a
//! stop channel. A new `analyze` call bumps the id and signals the previous
//! stop channel under the session write lock; every later mutation re-checks
//! the id under the same lock, so a superseded submission can never write
//! into the session again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PollTimings;
use crate::error::{ErrorKind, LabError, ServiceError};
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::report::{rate_report, DeviceReport, SpeedTest, TestStatus, TrendPoint};
use crate::service::SpeedTestService;
use crate::submission::TargetUrl;

pub type SubmissionId = u64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecyclePhase {
    Idle,
    Starting,
    Polling { test_id: String, attempts: u32 },
    Complete,
    Failed { kind: ErrorKind, message: String },
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Complete | LifecyclePhase::Failed { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LifecyclePhase::Starting | LifecyclePhase::Polling { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Polling { .. } => "polling",
            LifecyclePhase::Complete => "complete",
            LifecyclePhase::Failed { .. } => "failed",
        }
    }
}

/// The single message shown to the user. Non-fatal notices come from the
/// history and trend side channels and leave the result in place.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notice {
    pub message: String,
    pub fatal: bool,
}

impl Notice {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    fn advisory(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }
}

// --- State types ---

pub struct Session {
    pub submission: SubmissionId,
    pub phase: LifecyclePhase,
    pub url: Option<TargetUrl>,
    pub result: Option<SpeedTest>,
    pub history: Option<Vec<SpeedTest>>,
    pub trend: Option<Vec<TrendPoint>>,
    pub trend_visible: bool,
    pub trend_in_flight: bool,
    pub notice: Option<Notice>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            submission: 0,
            phase: LifecyclePhase::Idle,
            url: None,
            result: None,
            history: None,
            trend: None,
            trend_visible: false,
            trend_in_flight: false,
            notice: None,
            started_at: None,
            finished_at: None,
            stop_tx: None,
        }
    }

    /// Fresh session for a new submission; everything from the previous one is dropped.
    fn starting(submission: SubmissionId, url: TargetUrl, stop_tx: watch::Sender<bool>) -> Self {
        Self {
            submission,
            phase: LifecyclePhase::Starting,
            url: Some(url),
            started_at: Some(Utc::now()),
            stop_tx: Some(stop_tx),
            ..Self::new()
        }
    }

    pub fn to_status(&self) -> SessionStatus {
        SessionStatus {
            submission: self.submission,
            phase: self.phase.clone(),
            url: self.url.as_ref().map(|u| u.to_string()),
            loading: self.phase.is_loading(),
            result: self.result.clone(),
            history: self.history.clone(),
            trend: self.trend.clone(),
            trend_visible: self.trend_visible,
            error: self.notice.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// --- Read-only status for the presentation layer ---

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub submission: SubmissionId,
    pub phase: LifecyclePhase,
    pub url: Option<String>,
    pub loading: bool,
    pub result: Option<SpeedTest>,
    pub history: Option<Vec<SpeedTest>>,
    pub trend: Option<Vec<TrendPoint>>,
    pub trend_visible: bool,
    pub error: Option<Notice>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What a `view_trend` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum TrendOutcome {
    Fetched(Vec<TrendPoint>),
    Cached(Vec<TrendPoint>),
    /// Another call is already fetching; its result will land in the session.
    InFlight,
}

// --- Controller ---

pub struct LifecycleController {
    service: Arc<dyn SpeedTestService>,
    timings: PollTimings,
    session: RwLock<Session>,
    status_tx: watch::Sender<SessionStatus>,
    logs: Arc<LogState>,
}

impl LifecycleController {
    pub fn new(
        service: Arc<dyn SpeedTestService>,
        timings: PollTimings,
        logs: Arc<LogState>,
    ) -> Self {
        let session = Session::new();
        let (status_tx, _) = watch::channel(session.to_status());
        Self {
            service,
            timings,
            session: RwLock::new(session),
            status_tx,
            logs,
        }
    }

    pub fn timings(&self) -> PollTimings {
        self.timings
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.read().await.to_status()
    }

    /// Receives a fresh snapshot after every session change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Start a new submission for `url`, superseding whatever is in progress.
    pub async fn analyze(self: &Arc<Self>, url: TargetUrl) -> SubmissionId {
        let (submission, stop_rx) = {
            let mut session = self.session.write().await;
            if let Some(previous) = session.stop_tx.take() {
                let _ = previous.send(true);
                debug!("Cancelled submission {}", session.submission);
            }

            let (stop_tx, stop_rx) = watch::channel(false);
            let submission = session.submission + 1;
            *session = Session::starting(submission, url.clone(), stop_tx);
            self.publish(&session);
            (submission, stop_rx)
        };

        info!("Submission {}: analyzing {}", submission, url);
        self.logs
            .emit_for(
                submission,
                LogSource::Lifecycle,
                LogLevel::Info,
                format!("Analyzing {}", url),
            )
            .await;

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_submission(submission, url, stop_rx).await;
        });

        submission
    }

    /// Load trend data for the completed submission. Only the first call hits
    /// the backend; later calls return the cached points.
    ///
    /// The fetch runs on its own task, so a caller that gives up early does
    /// not leave the submission stuck in flight.
    pub async fn view_trend(self: &Arc<Self>) -> Result<TrendOutcome, LabError> {
        let (submission, url) = {
            let mut session = self.session.write().await;
            if session.phase != LifecyclePhase::Complete {
                return Err(LabError::NotComplete);
            }
            if let Some(points) = session.trend.clone() {
                if !session.trend_visible {
                    session.trend_visible = true;
                    self.publish(&session);
                }
                return Ok(TrendOutcome::Cached(points));
            }
            if session.trend_in_flight {
                return Ok(TrendOutcome::InFlight);
            }
            let url = session.url.clone().ok_or(LabError::NotComplete)?;
            session.trend_in_flight = true;
            self.publish(&session);
            (session.submission, url)
        };

        let controller = Arc::clone(self);
        let fetch = tokio::spawn(async move { controller.fetch_trend(submission, url).await });
        match fetch.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Submission {}: trend task aborted: {}", submission, e);
                self.update(submission, |s| s.trend_in_flight = false).await;
                Err(ServiceError::Unknown(format!("Trend fetch aborted: {}", e)).into())
            }
        }
    }

    async fn fetch_trend(
        &self,
        submission: SubmissionId,
        url: TargetUrl,
    ) -> Result<TrendOutcome, LabError> {
        match self.service.get_trend_data(url.as_str()).await {
            Ok(points) => {
                let applied = self
                    .update(submission, |s| {
                        s.trend = Some(points.clone());
                        s.trend_visible = true;
                        s.trend_in_flight = false;
                    })
                    .await;
                if !applied {
                    return Err(LabError::Superseded);
                }
                self.logs
                    .emit_for(
                        submission,
                        LogSource::Backend,
                        LogLevel::Info,
                        format!("Loaded {} trend points", points.len()),
                    )
                    .await;
                Ok(TrendOutcome::Fetched(points))
            }
            Err(e) => {
                warn!("Submission {}: trend fetch failed: {}", submission, e);
                let applied = self
                    .update(submission, |s| {
                        s.trend_in_flight = false;
                        s.notice = Some(Notice::advisory(format!(
                            "Failed to fetch trend data: {}",
                            e
                        )));
                    })
                    .await;
                if !applied {
                    return Err(LabError::Superseded);
                }
                self.logs
                    .emit_for(
                        submission,
                        LogSource::Backend,
                        LogLevel::Warn,
                        format!("Trend fetch failed: {}", e),
                    )
                    .await;
                Err(e.into())
            }
        }
    }

    // --- State update helpers ---

    fn publish(&self, session: &Session) {
        self.status_tx.send_replace(session.to_status());
    }

    /// Apply `f` only if `submission` is still the current one.
    async fn update<F>(&self, submission: SubmissionId, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.session.write().await;
        if session.submission != submission {
            debug!(
                "Dropping stale update for submission {} (current {})",
                submission, session.submission
            );
            return false;
        }
        f(&mut *session);
        self.publish(&session);
        true
    }

    async fn fail(&self, submission: SubmissionId, err: ServiceError) {
        let message = err.to_string();
        let applied = self
            .update(submission, |s| {
                s.phase = LifecyclePhase::Failed {
                    kind: err.kind(),
                    message: message.clone(),
                };
                s.notice = Some(Notice::fatal(message.clone()));
                s.finished_at = Some(Utc::now());
                s.stop_tx = None;
            })
            .await;

        if applied {
            warn!("Submission {} failed: {}", submission, message);
            self.logs
                .emit_for(
                    submission,
                    LogSource::Lifecycle,
                    LogLevel::Error,
                    format!("Test failed: {}", message),
                )
                .await;
        }
    }

    // --- Core loop ---

    async fn run_submission(
        self: Arc<Self>,
        submission: SubmissionId,
        url: TargetUrl,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let started = match self.service.start_test(url.as_str()).await {
            Ok(started) => started,
            Err(e) => {
                self.fail(submission, e).await;
                return;
            }
        };

        if *stop_rx.borrow() {
            debug!("Submission {} superseded before polling", submission);
            return;
        }

        let test_id = started.id;
        let polling = self
            .update(submission, |s| {
                s.phase = LifecyclePhase::Polling {
                    test_id: test_id.clone(),
                    attempts: 0,
                };
            })
            .await;
        if !polling {
            return;
        }

        self.logs
            .emit_for(
                submission,
                LogSource::Backend,
                LogLevel::Info,
                format!("Test {} started", test_id),
            )
            .await;

        match self
            .poll_until_complete(submission, &url, &test_id, &mut stop_rx)
            .await
        {
            Ok(Some(result)) => self.complete(submission, url, result).await,
            Ok(None) => debug!("Submission {} polling cancelled", submission),
            Err(e) => self.fail(submission, e).await,
        }
    }

    /// Poll until the test finishes. `Ok(None)` means the submission was
    /// superseded while waiting.
    async fn poll_until_complete(
        &self,
        submission: SubmissionId,
        url: &TargetUrl,
        test_id: &str,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<Option<SpeedTest>, ServiceError> {
        let mut delay = self.timings.initial_delay;

        for attempt in 1..=self.timings.max_polls {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop_rx.changed() => return Ok(None),
            }
            if *stop_rx.borrow() {
                return Ok(None);
            }

            let test = self.service.get_test_result(url.as_str(), test_id).await?;
            match test.status {
                TestStatus::Complete if test.is_well_formed() => return Ok(Some(test)),
                TestStatus::Complete => {
                    return Err(ServiceError::Unknown(format!(
                        "Test {} completed without device reports",
                        test_id
                    )))
                }
                TestStatus::Failed => {
                    return Err(ServiceError::Unknown(format!(
                        "Backend reported test {} as failed",
                        test_id
                    )))
                }
                TestStatus::Running => {
                    let current = self
                        .update(submission, |s| {
                            if let LifecyclePhase::Polling { attempts, .. } = &mut s.phase {
                                *attempts = attempt;
                            }
                        })
                        .await;
                    if !current {
                        return Ok(None);
                    }
                    debug!("Test {} still running after poll {}", test_id, attempt);
                }
            }

            delay = self.timings.poll_interval;
        }

        Err(ServiceError::Timeout {
            attempts: self.timings.max_polls,
        })
    }

    async fn complete(self: &Arc<Self>, submission: SubmissionId, url: TargetUrl, result: SpeedTest) {
        let summary = summarize(&result);
        let applied = self
            .update(submission, |s| {
                s.phase = LifecyclePhase::Complete;
                s.result = Some(result);
                s.finished_at = Some(Utc::now());
                s.stop_tx = None;
            })
            .await;
        if !applied {
            return;
        }

        info!("Submission {} complete: {}", submission, summary);
        self.logs
            .emit_for(
                submission,
                LogSource::Lifecycle,
                LogLevel::Info,
                format!("Test complete: {}", summary),
            )
            .await;

        self.spawn_history_fetch(submission, url);
    }

    /// Best-effort: a failure leaves an advisory notice, never a failed phase.
    fn spawn_history_fetch(self: &Arc<Self>, submission: SubmissionId, url: TargetUrl) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            match controller.service.get_test_history(url.as_str()).await {
                Ok(history) => {
                    let count = history.len();
                    if controller
                        .update(submission, |s| s.history = Some(history))
                        .await
                    {
                        debug!("Submission {}: attached {} history entries", submission, count);
                    }
                }
                Err(e) => {
                    warn!("Submission {}: history fetch failed: {}", submission, e);
                    let applied = controller
                        .update(submission, |s| {
                            if s.notice.is_none() {
                                s.notice = Some(Notice::advisory(format!(
                                    "Failed to fetch test history: {}",
                                    e
                                )));
                            }
                        })
                        .await;
                    if applied {
                        controller
                            .logs
                            .emit_for(
                                submission,
                                LogSource::Backend,
                                LogLevel::Warn,
                                format!("History fetch failed: {}", e),
                            )
                            .await;
                    }
                }
            }
        });
    }
}

fn summarize(test: &SpeedTest) -> String {
    let device = |label: &str, report: Option<&DeviceReport>| match report {
        Some(report) => {
            let ratings = rate_report(report)
                .into_iter()
                .map(|(metric, rating)| format!("{:?}={:?}", metric, rating))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{} [{}]", label, ratings)
        }
        None => format!("{} [-]", label),
    };

    format!(
        "{} from {}: {}, {}",
        test.id,
        test.region.label,
        device("desktop", test.desktop_report.as_ref()),
        device("mobile", test.mobile_report.as_ref()),
    )
}
