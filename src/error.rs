//! Fatal errors of a bootstrap run
//!
//! Only configuration and the identity/role chain abort a run. Storage,
//! build, publish and cleanup failures are recorded in the
//! [`RunReport`](crate::workflow::RunReport) instead.

use crate::cloud::ServiceError;
use crate::config::ConfigError;
use crate::readiness::ReadinessError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Policy,
    Role,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Policy => write!(f, "Policy"),
            EntityKind::Role => write!(f, "Role"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Failed to look up caller identity: {0}")]
    CallerIdentity(#[source] ServiceError),

    #[error("Failed to render policy documents: {0}")]
    Documents(#[from] serde_json::Error),

    /// An entity survived pre-clean under the target name
    #[error("{kind} {name} already exists after pre-clean removed prior entities")]
    NameCollision { kind: EntityKind, name: String },

    #[error("Failed to create policy {name}: {source}")]
    PolicyCreation { name: String, source: ServiceError },

    #[error("Failed to create role {name}: {source}")]
    RoleCreation { name: String, source: ServiceError },

    #[error("Failed to attach policy {policy_arn} to role {role_name}: {source}")]
    Attach {
        role_name: String,
        policy_arn: String,
        source: ServiceError,
    },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),
}

impl BootstrapError {
    /// Whether re-running the bootstrap is the expected remedy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BootstrapError::Readiness(_) | BootstrapError::NameCollision { .. }
        )
    }
}
