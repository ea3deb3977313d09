use super::step::StepOutcome;
use crate::cloud::CallerIdentity;
use crate::identity::CleanupReport;
use crate::image::BuildArtifact;
use crate::registry::PublishedImage;
use crate::storage::ProvisionedBucket;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_DEGRADED: i32 = 2;

/// How non-fatal step failures map onto the process exit status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// A completed run exits 0 even if storage, build, publish or cleanup failed
    #[default]
    Lenient,
    /// Any recorded non-fatal failure yields [`EXIT_DEGRADED`]
    Strict,
}

/// Everything a completed run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub caller: Option<CallerIdentity>,
    pub steps: Vec<StepOutcome>,
    pub bucket: Option<ProvisionedBucket>,
    pub artifact: Option<BuildArtifact>,
    pub published: Option<PublishedImage>,
    pub preclean: Option<CleanupReport>,
    pub cleanup: Option<CleanupReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            caller: None,
            steps: Vec::new(),
            bucket: None,
            artifact: None,
            published: None,
            preclean: None,
            cleanup: None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.is_failure())
    }

    pub fn exit_code(&self, policy: ExitPolicy) -> i32 {
        match policy {
            ExitPolicy::Strict if self.failures().next().is_some() => EXIT_DEGRADED,
            _ => EXIT_SUCCESS,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoOpHandler;
    use crate::workflow::StepRecord;

    #[test]
    fn test_exit_code_policies() {
        let progress = NoOpHandler;
        let mut report = RunReport::new();
        report.steps.push(
            StepRecord::default()
                .begin("Creating bucket", &progress)
                .succeed(&progress),
        );
        assert_eq!(report.exit_code(ExitPolicy::Lenient), EXIT_SUCCESS);
        assert_eq!(report.exit_code(ExitPolicy::Strict), EXIT_SUCCESS);

        report.steps.push(
            StepRecord::default()
                .begin("Building image", &progress)
                .fail("daemon unavailable", false, &progress),
        );
        assert_eq!(report.exit_code(ExitPolicy::Lenient), EXIT_SUCCESS);
        assert_eq!(report.exit_code(ExitPolicy::Strict), EXIT_DEGRADED);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport::new();
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["run_id"].is_string());
        assert!(value["steps"].as_array().unwrap().is_empty());
    }
}
