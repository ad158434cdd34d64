//! One worker sheet, one browser: log in once, then keep submitting pending rows

use crate::browser::{Browser, BrowserLauncher};
use crate::errors::{AutomationError, SheetError};
use crate::form::KnackForm;
use crate::sheet::{self, Headers, Spreadsheet, Worksheet};
use crate::types::{RowOutcome, TIMESTAMP_FORMAT};
use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error("Profile directory error: {0}")]
    Profile(#[from] std::io::Error),

    #[error("Worker task for {sheet} panicked or was aborted: {message}")]
    Join { sheet: String, message: String },
}

/// Pauses around sheet updates
#[derive(Debug, Clone)]
pub struct WorkerTiming {
    pub after_login: Duration,
    pub after_submit: Duration,
    pub after_update: Duration,
    /// Between two passes over the sheet
    pub poll_interval: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            after_login: Duration::from_secs(2),
            after_submit: Duration::from_secs(2),
            after_update: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerTiming {
    pub fn immediate() -> Self {
        Self {
            after_login: Duration::ZERO,
            after_submit: Duration::ZERO,
            after_update: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Everything a worker needs besides its sheet name
#[derive(Clone)]
pub struct WorkerConfig {
    pub form_url: String,
    pub form: KnackForm,
    pub timing: WorkerTiming,
    /// Parent of the per-worker browser profiles; the system temp dir when unset
    pub profile_root: Option<PathBuf>,
}

/// Why a worker stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MissingAccount,
    LaunchFailed(String),
    LoginFailed(String),
    /// The sheet could not be opened or prepared
    SheetError(String),
    /// A processed row's outcome could not be written back
    OutcomeNotWritten(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::MissingAccount => f.write_str("missing Knack email or password"),
            StopReason::LaunchFailed(e) => write!(f, "browser launch failed: {e}"),
            StopReason::LoginFailed(e) => write!(f, "login failed: {e}"),
            StopReason::SheetError(e) => write!(f, "sheet error: {e}"),
            StopReason::OutcomeNotWritten(e) => write!(f, "outcome not written: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub sheet: String,
    pub submitted: usize,
    pub failed: usize,
    pub stopped: StopReason,
}

impl WorkerReport {
    pub fn new(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            submitted: 0,
            failed: 0,
            stopped: StopReason::Cancelled,
        }
    }
}

/// Sleep unless cancelled first. Returns true when cancelled.
pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// How a pass over the sheet ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    Completed,
    Cancelled,
}

/// Attempts at writing one row's outcome before the worker gives up on the sheet
pub const OUTCOME_WRITE_ATTEMPTS: usize = 4;
const OUTCOME_WRITE_BACKOFF: Duration = Duration::from_secs(2);

/// Why a pass over the sheet stopped early
#[derive(Debug, thiserror::Error)]
pub(crate) enum PassError {
    /// Nothing was submitted yet, the next pass can start over
    #[error(transparent)]
    Sheet(#[from] SheetError),

    /// The row went through the form but the sheet still shows it as pending
    #[error("row {row} was processed but its outcome could not be written: {source}")]
    OutcomeNotWritten { row: usize, source: SheetError },
}

/// Write a processed row's outcome, retrying with a doubling backoff.
///
/// Not cancellable: once a row went through the form its outcome has to land.
async fn write_outcome_with_retry(
    ws: &dyn Worksheet,
    headers: &Headers,
    row: usize,
    message: &str,
    timestamp: &str,
) -> Result<(), SheetError> {
    let mut delay = OUTCOME_WRITE_BACKOFF;
    let mut attempt = 1;
    loop {
        match sheet::write_outcome(ws, headers, row, message, timestamp).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < OUTCOME_WRITE_ATTEMPTS => {
                warn!(
                    "[{}] ⚠️ Writing row {} failed (attempt {}/{}), retrying in {:?}: {}",
                    ws.title(),
                    row,
                    attempt,
                    OUTCOME_WRITE_ATTEMPTS,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Submit every pending row of `ws` once, writing each outcome back as it happens.
///
/// Row failures are counted and logged. A read error ends the pass before
/// anything is submitted; an outcome that cannot be written ends it with
/// [`PassError::OutcomeNotWritten`] so the row is never submitted twice.
pub(crate) async fn process_pending(
    form: &KnackForm,
    browser: &Browser,
    ws: &dyn Worksheet,
    headers: &Headers,
    timing: &WorkerTiming,
    cancel: &CancellationToken,
    report: &mut WorkerReport,
) -> Result<Pass, PassError> {
    let pending: Vec<_> = sheet::records(ws)
        .await?
        .into_iter()
        .filter(|row| row.is_pending())
        .collect();
    if pending.is_empty() {
        debug!("[{}] No pending rows", ws.title());
    }

    for row in pending {
        if cancel.is_cancelled() {
            return Ok(Pass::Cancelled);
        }
        info!("[{}] ▶️ Processing row {} (IMEI {})", ws.title(), row.row_index, row.imei);

        let outcome = RowOutcome::from(form.submit_row(browser, &row).await);
        match &outcome {
            RowOutcome::Submitted => report.submitted += 1,
            RowOutcome::Failed(e) => {
                report.failed += 1;
                error!("[{}] ❌ Row {} failed: {}", ws.title(), row.row_index, e);
            }
        }
        // The outcome is still written when cancelled during this pause
        let cancelled = pause(cancel, timing.after_submit).await;

        let message = outcome.log_message();
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        write_outcome_with_retry(ws, headers, row.row_index, &message, &timestamp)
            .await
            .map_err(|source| PassError::OutcomeNotWritten {
                row: row.row_index,
                source,
            })?;
        info!(
            "[{}] Row {} (sheet row {}) updated: {} at {}",
            ws.title(),
            row.data_row(),
            row.row_index,
            message,
            timestamp
        );

        if cancelled || pause(cancel, timing.after_update).await {
            return Ok(Pass::Cancelled);
        }
    }
    Ok(Pass::Completed)
}

/// Processes one worker sheet until cancelled
pub struct Worker {
    sheet: String,
    spreadsheet: Arc<dyn Spreadsheet>,
    launcher: Arc<dyn BrowserLauncher>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        sheet: impl Into<String>,
        spreadsheet: Arc<dyn Spreadsheet>,
        launcher: Arc<dyn BrowserLauncher>,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            spreadsheet,
            launcher,
            config,
            cancel,
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// Run to completion. Setup failures end up in [`WorkerReport::stopped`].
    #[instrument(skip(self), fields(sheet = %self.sheet))]
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(&self.sheet);
        let stopped = match self.run_inner(&mut report).await {
            Ok(reason) => reason,
            Err(e) => {
                error!("[{}] ❌ Worker stopped: {}", self.sheet, e);
                StopReason::SheetError(e.to_string())
            }
        };
        report.stopped = stopped;
        info!(
            "[{}] 🏁 Worker finished: {} submitted, {} failed ({})",
            report.sheet, report.submitted, report.failed, report.stopped
        );
        report
    }

    async fn run_inner(&self, report: &mut WorkerReport) -> Result<StopReason, WorkerError> {
        let ws = self.spreadsheet.worksheet_or_create(&self.sheet).await?;
        let headers = sheet::ensure_log_columns(ws.as_ref()).await?;

        let account = sheet::knack_account(ws.as_ref()).await?;
        if !account.is_complete() {
            warn!(
                "[{}] ❌ Knack email (I1) or password (K1) is empty, skipping this sheet",
                self.sheet
            );
            return Ok(StopReason::MissingAccount);
        }

        let mut builder = tempfile::Builder::new();
        let prefix = format!("profile_{}_", self.sheet);
        builder.prefix(&prefix);
        let profile = match &self.config.profile_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let browser = match self.launcher.launch(profile.path()).await {
            Ok(browser) => browser,
            Err(e) => {
                error!("[{}] ❌ Could not start browser: {}", self.sheet, e);
                return Ok(StopReason::LaunchFailed(e.to_string()));
            }
        };
        info!("[{}] 🌐 Browser started", self.sheet);

        let reason = self
            .drive(&browser, ws.as_ref(), &headers, &account, report)
            .await;

        match browser.quit().await {
            Ok(()) => info!("[{}] 🛑 Browser closed", self.sheet),
            Err(e) => warn!("[{}] Browser did not quit cleanly: {}", self.sheet, e),
        }
        if let Err(e) = profile.close() {
            warn!("[{}] Could not remove profile directory: {}", self.sheet, e);
        }
        Ok(reason)
    }

    async fn drive(
        &self,
        browser: &Browser,
        ws: &dyn Worksheet,
        headers: &Headers,
        account: &crate::types::Account,
        report: &mut WorkerReport,
    ) -> StopReason {
        let form = &self.config.form;
        let timing = &self.config.timing;

        if let Err(e) = form.login(browser, &self.config.form_url, account).await {
            error!("[{}] ❌ Login failed: {}", self.sheet, e);
            return StopReason::LoginFailed(e.to_string());
        }
        info!("[{}] 🔑 Logged in as {}", self.sheet, account.email);
        if pause(&self.cancel, timing.after_login).await {
            return StopReason::Cancelled;
        }

        loop {
            if self.cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            match process_pending(form, browser, ws, headers, timing, &self.cancel, report).await {
                Ok(Pass::Cancelled) => return StopReason::Cancelled,
                Ok(Pass::Completed) => {}
                Err(PassError::Sheet(e)) => warn!(
                    "[{}] ⚠️ Sheet error, retrying after {:?}: {}",
                    self.sheet, timing.poll_interval, e
                ),
                Err(e @ PassError::OutcomeNotWritten { .. }) => {
                    error!("[{}] ❌ Stopping, {}", self.sheet, e);
                    return StopReason::OutcomeNotWritten(e.to_string());
                }
            }
            debug!("[{}] ⏳ Waiting {:?} for new rows", self.sheet, timing.poll_interval);
            if pause(&self.cancel, timing.poll_interval).await {
                return StopReason::Cancelled;
            }
        }
    }
}
