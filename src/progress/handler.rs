//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a bootstrap run advances
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    Started { run_id: String },

    /// A numbered step began
    StepStarted { index: usize, title: String },

    /// A step finished without error
    StepComplete { index: usize, duration: Duration },

    /// A step failed; `fatal` failures end the run
    StepFailed {
        index: usize,
        error: String,
        fatal: bool,
    },

    /// A step was not attempted
    StepSkipped { index: usize, reason: String },

    /// One line of image build output
    BuildOutput { line: String },

    /// Readiness probe attempt failed and will be retried
    ReadinessRetry {
        attempt: u32,
        backoff: Duration,
        error: String,
    },

    /// Run completed
    Completed { failures: usize, total_time: Duration },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
