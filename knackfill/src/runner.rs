//! Running several worker sheets: each in its own task, or all through one browser

use crate::browser::BrowserLauncher;
use crate::sheet::{self, Spreadsheet};
use crate::worker::{
    pause, process_pending, Pass, PassError, StopReason, Worker, WorkerConfig, WorkerError,
    WorkerReport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_SHEETS: [&str; 5] = ["Worker-1", "Worker-2", "Worker-3", "Worker-4", "Worker-5"];

pub fn default_sheets() -> Vec<String> {
    DEFAULT_SHEETS.iter().map(|s| s.to_string()).collect()
}

/// Start one worker task per sheet and wait for all of them.
///
/// Workers share nothing but the read-only config and the cancellation token.
/// Reports come back in the order of `sheets`.
pub async fn run_parallel(
    config: &WorkerConfig,
    spreadsheet: Arc<dyn Spreadsheet>,
    launcher: Arc<dyn BrowserLauncher>,
    sheets: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<WorkerReport>, WorkerError> {
    info!("🚀 Starting {} workers: {}", sheets.len(), sheets.join(", "));

    let handles: Vec<_> = sheets
        .iter()
        .map(|name| {
            let worker = Worker::new(
                name.clone(),
                spreadsheet.clone(),
                launcher.clone(),
                config.clone(),
                cancel.child_token(),
            );
            (name.clone(), tokio::spawn(worker.run()))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (sheet, handle) in handles {
        let report = handle.await.map_err(|e| WorkerError::Join {
            sheet,
            message: e.to_string(),
        })?;
        reports.push(report);
    }
    info!("✅ All workers finished");
    Ok(reports)
}

/// Cycle through every sheet with a single browser, logging in to each sheet's
/// account in turn, until cancelled.
///
/// A sheet whose account is missing or whose login fails is skipped for that round.
/// A sheet whose outcome could not be written is left out of every later round.
pub async fn run_sequential(
    config: &WorkerConfig,
    spreadsheet: Arc<dyn Spreadsheet>,
    launcher: Arc<dyn BrowserLauncher>,
    sheets: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<WorkerReport>, WorkerError> {
    let mut reports: Vec<WorkerReport> = sheets.iter().map(|s| WorkerReport::new(s)).collect();

    let mut builder = tempfile::Builder::new();
    builder.prefix("profile_sweep_");
    let profile = match &config.profile_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    let browser = launcher.launch(profile.path()).await?;
    info!("🌐 Shared browser started for {} sheets", sheets.len());

    let mut round = 0usize;
    'rounds: loop {
        round += 1;
        info!("🔁 Round {} over {} sheets", round, sheets.len());

        for (name, report) in sheets.iter().zip(reports.iter_mut()) {
            if cancel.is_cancelled() {
                break 'rounds;
            }
            // Its pending rows may already be in Knack
            if matches!(report.stopped, StopReason::OutcomeNotWritten(_)) {
                continue;
            }
            let ws = match spreadsheet.worksheet_or_create(name).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("[{}] ❌ Could not open sheet: {}", name, e);
                    report.stopped = StopReason::SheetError(e.to_string());
                    continue;
                }
            };
            let prepared = async {
                let headers = sheet::ensure_log_columns(ws.as_ref()).await?;
                let account = sheet::knack_account(ws.as_ref()).await?;
                Ok::<_, crate::errors::SheetError>((headers, account))
            }
            .await;
            let (headers, account) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!("[{}] ❌ Could not prepare sheet: {}", name, e);
                    report.stopped = StopReason::SheetError(e.to_string());
                    continue;
                }
            };
            if !account.is_complete() {
                warn!("[{}] ❌ Knack email or password is empty, skipping", name);
                report.stopped = StopReason::MissingAccount;
                continue;
            }

            if let Err(e) = config.form.login(&browser, &config.form_url, &account).await {
                error!("[{}] ❌ Login failed, skipping this round: {}", name, e);
                report.stopped = StopReason::LoginFailed(e.to_string());
                continue;
            }
            if pause(cancel, config.timing.after_login).await {
                break 'rounds;
            }

            match process_pending(
                &config.form,
                &browser,
                ws.as_ref(),
                &headers,
                &config.timing,
                cancel,
                report,
            )
            .await
            {
                Ok(Pass::Cancelled) => break 'rounds,
                Ok(Pass::Completed) => report.stopped = StopReason::Cancelled,
                Err(PassError::Sheet(e)) => {
                    warn!("[{}] ⚠️ Sheet error during round {}: {}", name, round, e)
                }
                Err(e @ PassError::OutcomeNotWritten { .. }) => {
                    error!("[{}] ❌ Dropping sheet from the sweep, {}", name, e);
                    report.stopped = StopReason::OutcomeNotWritten(e.to_string());
                }
            }
        }

        if pause(cancel, config.timing.poll_interval).await {
            break;
        }
    }

    if let Err(e) = browser.quit().await {
        warn!("Shared browser did not quit cleanly: {}", e);
    }
    if let Err(e) = profile.close() {
        warn!("Could not remove profile directory: {}", e);
    }
    info!("🏁 Sweep stopped after {} rounds", round);
    Ok(reports)
}
