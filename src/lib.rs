//! infraboot - one-shot bootstrap of the cloud prerequisites for a Terraform deployment
//!
//! A run creates a short-lived IAM trust chain (policy, role, attachment),
//! proves the role can be assumed, creates the state bucket, builds the
//! application image and publishes its manifest list. The identity resources
//! are held as an [`IdentityLease`] and deleted again on every exit path.
//!
//! # Example Usage
//!
//! ```ignore
//! use infraboot::{BootstrapConfig, BootstrapWorkflow, Collaborators, LoggingHandler};
//!
//! async fn bootstrap(cloud: Collaborators<'_>) -> anyhow::Result<()> {
//!     let config = BootstrapConfig::load(None)?;
//!     let report = BootstrapWorkflow::new(cloud, &LoggingHandler).run(&config).await?;
//!     println!("{} steps", report.steps.len());
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`cloud`]: collaborator traits and their AWS / Docker implementations
//! - [`policy`]: permission and trust documents
//! - [`identity`]: pre-clean, lease acquisition and release
//! - [`readiness`]: bounded wait until the new role is assumable
//! - [`workflow`]: step sequencing and the run report

pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod identity;
pub mod image;
pub mod policy;
pub mod progress;
pub mod readiness;
pub mod registry;
pub mod storage;
pub mod util;
pub mod workflow;

pub use cloud::{CallerIdentity, Collaborators, ServiceError};
pub use config::{BootstrapConfig, ConfigError};
pub use error::BootstrapError;
pub use identity::{CleanupCoordinator, CleanupReport, IdentityLease, IdentityProvisioner};
pub use policy::{PolicyDocument, TrustDocuments};
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use readiness::{ReadinessPolicy, RoleAssumer};
pub use registry::{ManifestList, RegistryPublisher};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use workflow::{BootstrapWorkflow, ExitPolicy, RunFailure, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_infraboot() {
        assert_eq!(NAME, "infraboot");
    }
}
