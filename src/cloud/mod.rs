//! External collaborators of the bootstrap workflow
//!
//! Every remote system the workflow touches sits behind one of these traits.
//! Production implementations live in [`aws`] (IAM, STS, S3, ECR) and
//! [`docker`] (image builds); tests substitute in-memory fakes.

pub mod aws;
pub mod docker;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure reported by a collaborator call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Rejected(String),
}

impl ServiceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Identity behind the credentials the process runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    pub account_id: String,
    pub arn: String,
}

impl CallerIdentity {
    /// Partition segment of the caller ARN (`aws`, `aws-cn`, ...)
    pub fn partition(&self) -> &str {
        self.arn
            .split(':')
            .nth(1)
            .filter(|p| !p.is_empty())
            .unwrap_or("aws")
    }

    /// ARN of a customer-managed policy in the caller's account
    pub fn policy_arn(&self, policy_name: &str) -> String {
        format!(
            "arn:{}:iam::{}:policy/{}",
            self.partition(),
            self.account_id,
            policy_name
        )
    }
}

/// Short-lived credentials returned by an assume-role call
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<String>,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Policy and role management
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates a managed policy and returns its ARN
    async fn create_policy(&self, name: &str, document: &str) -> Result<String, ServiceError>;

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ServiceError>;

    /// Creates a role and returns its ARN
    async fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        description: &str,
    ) -> Result<String, ServiceError>;

    async fn delete_role(&self, name: &str) -> Result<(), ServiceError>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str)
        -> Result<(), ServiceError>;

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str)
        -> Result<(), ServiceError>;
}

#[async_trait]
pub trait TokenService: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity, ServiceError>;

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ServiceError>;
}

/// How a bucket request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketCreation {
    Created,
    /// The account already owns a bucket with this name
    AlreadyOwned,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn create_bucket(&self, name: &str, region: &str)
        -> Result<BucketCreation, ServiceError>;
}

/// Stream of build log lines
pub type BuildLogStream<'a> = BoxStream<'a, Result<String, ServiceError>>;

#[async_trait]
pub trait ImageBuildService: Send + Sync {
    /// Submits a tar archive of the build context; the returned stream ends
    /// when the build finishes.
    async fn build<'a>(
        &'a self,
        context_archive: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<BuildLogStream<'a>, ServiceError>;
}

#[async_trait]
pub trait RegistryService: Send + Sync {
    async fn create_repository(&self, name: &str) -> Result<(), ServiceError>;

    /// Puts a manifest under `tag`; returns the registry's digest for it when known
    async fn put_image(
        &self,
        repository: &str,
        tag: &str,
        manifest: &str,
        media_type: &str,
    ) -> Result<Option<String>, ServiceError>;
}

/// Borrowed handles to every collaborator a run needs
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub identity: &'a dyn IdentityService,
    pub tokens: &'a dyn TokenService,
    pub storage: &'a dyn ObjectStorage,
    pub images: &'a dyn ImageBuildService,
    pub registry: &'a dyn RegistryService,
}
