use super::{CleanupCoordinator, CleanupReport, IdentityTarget};
use crate::cloud::IdentityService;
use crate::error::{BootstrapError, EntityKind};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Description attached to the temporary role
pub const ROLE_DESCRIPTION: &str =
    "Temporary Role for IAM User Bootstrap to assume for creating S3 for Terraform";

/// What one run has created so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityState {
    pub policy_name: String,
    pub policy_arn: Option<String>,
    pub role_name: String,
    pub role_arn: Option<String>,
    pub attached: bool,
}

/// Creates the policy and hands out the lease that owns its lifetime
pub struct IdentityProvisioner<'a> {
    identity: &'a dyn IdentityService,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(identity: &'a dyn IdentityService) -> Self {
        Self { identity }
    }

    /// Removes any role/policy left under the target names
    pub async fn preclean(&self, target: &IdentityTarget) -> CleanupReport {
        let report = CleanupCoordinator::new(self.identity).teardown(target).await;
        if report.removed() > 0 {
            info!(
                removed = report.removed(),
                role = %target.role_name,
                policy = %target.policy_name,
                "Removed stale identity entities"
            );
        }
        report
    }

    /// Creates the permission policy.
    ///
    /// From here on the returned lease must be released; nothing exists to
    /// release when this fails.
    pub async fn create_policy(
        &self,
        target: &IdentityTarget,
        permission_document: &str,
    ) -> Result<IdentityLease<'a>, BootstrapError> {
        let arn = self
            .identity
            .create_policy(&target.policy_name, permission_document)
            .await
            .map_err(|e| {
                if e.is_already_exists() {
                    BootstrapError::NameCollision {
                        kind: EntityKind::Policy,
                        name: target.policy_name.clone(),
                    }
                } else {
                    BootstrapError::PolicyCreation {
                        name: target.policy_name.clone(),
                        source: e,
                    }
                }
            })?;

        if arn != target.policy_arn {
            debug!(returned = %arn, expected = %target.policy_arn, "Policy ARN differs from derived ARN");
        }
        info!(policy = %target.policy_name, arn = %arn, "Policy created");

        Ok(IdentityLease {
            identity: self.identity,
            target: target.clone(),
            state: IdentityState {
                policy_name: target.policy_name.clone(),
                policy_arn: Some(arn),
                role_name: target.role_name.clone(),
                role_arn: None,
                attached: false,
            },
            released: false,
        })
    }
}

/// Ownership of the identity entities created by one run
///
/// Obtained from [`IdentityProvisioner::create_policy`]; [`release`](Self::release)
/// tears everything down again. Dropping an unreleased lease only logs,
/// since the teardown calls are async.
pub struct IdentityLease<'a> {
    identity: &'a dyn IdentityService,
    target: IdentityTarget,
    state: IdentityState,
    released: bool,
}

impl<'a> IdentityLease<'a> {
    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    pub fn target(&self) -> &IdentityTarget {
        &self.target
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.state.role_arn.as_deref()
    }

    pub async fn create_role(&mut self, trust_document: &str) -> Result<&str, BootstrapError> {
        let name = &self.target.role_name;
        let arn = self
            .identity
            .create_role(name, trust_document, ROLE_DESCRIPTION)
            .await
            .map_err(|e| {
                if e.is_already_exists() {
                    BootstrapError::NameCollision {
                        kind: EntityKind::Role,
                        name: name.clone(),
                    }
                } else {
                    BootstrapError::RoleCreation {
                        name: name.clone(),
                        source: e,
                    }
                }
            })?;

        info!(role = %name, arn = %arn, "Role created");
        Ok(self.state.role_arn.insert(arn).as_str())
    }

    /// Attaches the policy to the role; both must have been created
    pub async fn attach(&mut self) -> Result<(), BootstrapError> {
        let role_name = self.target.role_name.clone();
        let policy_arn = self.target.policy_arn.clone();

        if self.state.role_arn.is_none() {
            return Err(BootstrapError::Attach {
                role_name,
                policy_arn,
                source: crate::cloud::ServiceError::rejected("role has not been created"),
            });
        }

        self.identity
            .attach_role_policy(&role_name, &policy_arn)
            .await
            .map_err(|source| BootstrapError::Attach {
                role_name: role_name.clone(),
                policy_arn: policy_arn.clone(),
                source,
            })?;

        self.state.attached = true;
        info!(role = %role_name, policy_arn = %policy_arn, "Policy attached to role");
        Ok(())
    }

    /// Detaches and deletes everything under the target names
    pub async fn release(mut self) -> CleanupReport {
        self.released = true;
        let report = CleanupCoordinator::new(self.identity)
            .teardown(&self.target)
            .await;
        if report.has_failures() {
            warn!(
                role = %self.target.role_name,
                policy = %self.target.policy_name,
                "Identity entities may remain: {}",
                report.failure_summary()
            );
        }
        report
    }
}

impl Drop for IdentityLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                role = %self.target.role_name,
                policy = %self.target.policy_name,
                "Identity lease dropped without release; run `infraboot cleanup` to remove leftovers"
            );
        }
    }
}
