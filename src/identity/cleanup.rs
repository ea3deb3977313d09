use super::IdentityTarget;
use crate::cloud::{IdentityService, ServiceError};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    DetachPolicy,
    DeleteRole,
    DeletePolicy,
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupAction::DetachPolicy => write!(f, "detach policy"),
            CleanupAction::DeleteRole => write!(f, "delete role"),
            CleanupAction::DeletePolicy => write!(f, "delete policy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "error", rename_all = "snake_case")]
pub enum CleanupResult {
    Removed,
    /// Nothing existed under the name
    Absent,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub actions: Vec<(CleanupAction, CleanupResult)>,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        self.actions
            .iter()
            .any(|(_, r)| matches!(r, CleanupResult::Failed(_)))
    }

    pub fn removed(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, r)| *r == CleanupResult::Removed)
            .count()
    }

    pub fn result(&self, action: CleanupAction) -> Option<&CleanupResult> {
        self.actions
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, r)| r)
    }

    pub fn failure_summary(&self) -> String {
        self.actions
            .iter()
            .filter_map(|(action, result)| match result {
                CleanupResult::Failed(e) => Some(format!("{}: {}", action, e)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn push(&mut self, action: CleanupAction, outcome: Result<(), ServiceError>) {
        let result = match outcome {
            Ok(()) => CleanupResult::Removed,
            Err(e) if e.is_not_found() => CleanupResult::Absent,
            Err(e) => {
                warn!(action = %action, error = %e, "Cleanup action failed");
                CleanupResult::Failed(e.to_string())
            }
        };
        debug!(action = %action, result = ?result, "Cleanup action");
        self.actions.push((action, result));
    }
}

/// Best-effort teardown of the role/policy pair
///
/// Runs detach, delete role, delete policy in that order. Every action is
/// attempted regardless of earlier failures; not-found counts as done.
pub struct CleanupCoordinator<'a> {
    identity: &'a dyn IdentityService,
}

impl<'a> CleanupCoordinator<'a> {
    pub fn new(identity: &'a dyn IdentityService) -> Self {
        Self { identity }
    }

    pub async fn teardown(&self, target: &IdentityTarget) -> CleanupReport {
        let mut report = CleanupReport::default();

        report.push(
            CleanupAction::DetachPolicy,
            self.identity
                .detach_role_policy(&target.role_name, &target.policy_arn)
                .await,
        );
        report.push(
            CleanupAction::DeleteRole,
            self.identity.delete_role(&target.role_name).await,
        );
        report.push(
            CleanupAction::DeletePolicy,
            self.identity.delete_policy(&target.policy_arn).await,
        );

        report
    }
}
