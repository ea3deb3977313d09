//! Temporary IAM trust chain: pre-clean, creation, attachment and release

pub mod cleanup;
pub mod provisioner;

pub use cleanup::{CleanupAction, CleanupCoordinator, CleanupReport, CleanupResult};
pub use provisioner::{IdentityLease, IdentityProvisioner, IdentityState, ROLE_DESCRIPTION};

use crate::cloud::CallerIdentity;
use serde::Serialize;

/// Names (and the derived policy ARN) a run provisions under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityTarget {
    pub role_name: String,
    pub policy_name: String,
    pub policy_arn: String,
}

impl IdentityTarget {
    pub fn new(caller: &CallerIdentity, role_name: &str, policy_name: &str) -> Self {
        Self {
            role_name: role_name.to_string(),
            policy_name: policy_name.to_string(),
            policy_arn: caller.policy_arn(policy_name),
        }
    }
}
