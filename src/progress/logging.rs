//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id } => {
                info!(run_id = %run_id, "Starting bootstrap");
            }
            ProgressEvent::StepStarted { index, title } => {
                info!("Step {}. {}", index, title);
            }
            ProgressEvent::StepComplete { index, duration } => {
                debug!(
                    step = index,
                    duration_ms = duration.as_millis(),
                    "Step complete"
                );
            }
            ProgressEvent::StepFailed {
                index,
                error: message,
                fatal,
            } => {
                if *fatal {
                    error!(step = index, error = %message, "Step failed, aborting");
                } else {
                    warn!(step = index, error = %message, "Step failed, continuing");
                }
            }
            ProgressEvent::StepSkipped { index, reason } => {
                warn!(step = index, reason = %reason, "Step skipped");
            }
            ProgressEvent::BuildOutput { line } => {
                info!(target: "infraboot::build", "{}", line);
            }
            ProgressEvent::ReadinessRetry {
                attempt,
                backoff,
                error: message,
            } => {
                debug!(
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %message,
                    "Role not assumable yet"
                );
            }
            ProgressEvent::Completed {
                failures,
                total_time,
            } => {
                if *failures > 0 {
                    warn!(
                        failures,
                        total_time_ms = total_time.as_millis(),
                        "Bootstrap finished with non-fatal failures"
                    );
                } else {
                    info!(
                        total_time_ms = total_time.as_millis(),
                        "Bootstrap finished"
                    );
                }
            }
        }
    }
}
