//! Step numbering for progress display
//!
//! A [`StepRecord`] is a plain value: beginning a step consumes it and the
//! finished [`StepOutcome`] hands back the record for the next step. Nothing
//! here decides control flow and nothing survives the run.

use crate::progress::{ProgressEvent, ProgressHandler};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StepRecord {
    index: usize,
}

impl StepRecord {
    pub fn index(self) -> usize {
        self.index
    }

    /// Advances the counter and announces the step
    pub fn begin(self, title: impl Into<String>, progress: &dyn ProgressHandler) -> Step {
        let record = Self {
            index: self.index + 1,
        };
        let title = title.into();
        progress.on_progress(&ProgressEvent::StepStarted {
            index: record.index,
            title: title.clone(),
        });
        Step {
            record,
            title,
            started: Instant::now(),
        }
    }
}

/// A step in progress
#[derive(Debug)]
pub struct Step {
    record: StepRecord,
    title: String,
    started: Instant,
}

impl Step {
    pub fn record(&self) -> StepRecord {
        self.record
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn succeed(self, progress: &dyn ProgressHandler) -> StepOutcome {
        let duration = self.started.elapsed();
        progress.on_progress(&ProgressEvent::StepComplete {
            index: self.record.index,
            duration,
        });
        self.into_outcome(StepStatus::Succeeded, duration)
    }

    pub fn fail(
        self,
        error: impl Into<String>,
        fatal: bool,
        progress: &dyn ProgressHandler,
    ) -> StepOutcome {
        let error = error.into();
        progress.on_progress(&ProgressEvent::StepFailed {
            index: self.record.index,
            error: error.clone(),
            fatal,
        });
        let duration = self.started.elapsed();
        self.into_outcome(StepStatus::Failed { error, fatal }, duration)
    }

    pub fn skip(self, reason: impl Into<String>, progress: &dyn ProgressHandler) -> StepOutcome {
        let reason = reason.into();
        progress.on_progress(&ProgressEvent::StepSkipped {
            index: self.record.index,
            reason: reason.clone(),
        });
        self.into_outcome(StepStatus::Skipped { reason }, Duration::ZERO)
    }

    fn into_outcome(self, status: StepStatus, duration: Duration) -> StepOutcome {
        StepOutcome {
            record: self.record,
            title: self.title,
            status,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { error: String, fatal: bool },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    #[serde(rename = "step")]
    pub record: StepRecord,
    pub title: String,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoOpHandler;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressHandler for Recorder {
        fn on_progress(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_indices_increase_monotonically() {
        let progress = NoOpHandler;
        let first = StepRecord::default().begin("one", &progress).succeed(&progress);
        let second = first.record.begin("two", &progress).skip("n/a", &progress);
        let third = second.record.begin("three", &progress).fail("x", false, &progress);

        assert_eq!(first.record.index(), 1);
        assert_eq!(second.record.index(), 2);
        assert_eq!(third.record.index(), 3);
        assert!(third.is_failure());
        assert!(!second.is_failure());
    }

    #[test]
    fn test_begin_announces_step() {
        let recorder = Recorder::default();
        let step = StepRecord::default().begin("Creating bucket", &recorder);
        assert_eq!(step.title(), "Creating bucket");

        let events = recorder.0.lock().unwrap();
        assert!(matches!(
            &events[0],
            ProgressEvent::StepStarted { index: 1, title } if title == "Creating bucket"
        ));
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let progress = NoOpHandler;
        let outcome = StepRecord::default()
            .begin("Publishing", &progress)
            .fail("denied", true, &progress);
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["step"]["index"], 1);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "denied");
        assert_eq!(value["fatal"], true);
    }
}
