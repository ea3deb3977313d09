//! Configuration management for infraboot
//!
//! Settings are read from environment variables, optionally seeded from a
//! `.env` file, and may be overridden from the command line.
//!
//! # Environment Variables
//!
//! ## Required
//! - `INFRABOOT_ROLE_NAME`: name of the temporary trust role
//! - `INFRABOOT_POLICY_NAME`: name of the bootstrap permission policy
//! - `INFRABOOT_BUCKET_NAME`: bucket to create
//! - `INFRABOOT_REGION`: deployment region of the bucket
//! - `INFRABOOT_REGISTRY_USER`: registry user id, prefixes the image tag
//!
//! ## Optional
//! - `INFRABOOT_CLIENT_REGION`: region for IAM/STS/ECR clients - default: "us-east-2"
//! - `INFRABOOT_POLICY_RESOURCE`: resource scope of the permission policy - default: "*"
//! - `INFRABOOT_REPOSITORY`: registry repository - default: "lambda_app"
//! - `INFRABOOT_IMAGE_NAME`: image name within the tag - default: "lambda_app"
//! - `INFRABOOT_RELEASE_TAG`: tag the manifest list is published under - default: "latest"
//! - `INFRABOOT_BUILD_CONTEXT`: build context directory - default: "./lambda_app"
//! - `INFRABOOT_DOCKERFILE`: Dockerfile name inside the context - default: "Dockerfile"
//! - `INFRABOOT_MANIFEST_FILE`: manifest list produced by a multi-arch build
//! - `INFRABOOT_SESSION_NAME`: assume-role session label - default: "BootstrapUserSession"
//! - `INFRABOOT_READINESS_TIMEOUT`: seconds to wait for the role - default: "60"

use crate::readiness::ReadinessPolicy;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_CLIENT_REGION: &str = "us-east-2";
const DEFAULT_POLICY_RESOURCE: &str = "*";
const DEFAULT_REPOSITORY: &str = "lambda_app";
const DEFAULT_IMAGE_NAME: &str = "lambda_app";
const DEFAULT_RELEASE_TAG: &str = "latest";
const DEFAULT_BUILD_CONTEXT: &str = "./lambda_app";
const DEFAULT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_SESSION_NAME: &str = "BootstrapUserSession";
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;

pub const ROLE_NAME_VAR: &str = "INFRABOOT_ROLE_NAME";
pub const POLICY_NAME_VAR: &str = "INFRABOOT_POLICY_NAME";
pub const BUCKET_NAME_VAR: &str = "INFRABOOT_BUCKET_NAME";
pub const REGION_VAR: &str = "INFRABOOT_REGION";
pub const REGISTRY_USER_VAR: &str = "INFRABOOT_REGISTRY_USER";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    #[error("Failed to load env file {path}: {error}")]
    EnvFile { path: PathBuf, error: String },
}

/// Everything one bootstrap run needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub role_name: String,
    pub policy_name: String,
    pub bucket_name: String,
    pub region: String,
    pub registry_user: String,

    pub client_region: String,
    pub policy_resource: String,
    pub repository: String,
    pub image_name: String,
    pub release_tag: String,
    pub build_context: PathBuf,
    pub dockerfile: String,
    pub manifest_file: Option<PathBuf>,
    pub session_name: String,
    pub readiness_timeout_secs: u64,
}

impl Default for BootstrapConfig {
    /// Empty required values with the optional defaults filled in
    fn default() -> Self {
        Self {
            role_name: String::new(),
            policy_name: String::new(),
            bucket_name: String::new(),
            region: String::new(),
            registry_user: String::new(),
            client_region: DEFAULT_CLIENT_REGION.to_string(),
            policy_resource: DEFAULT_POLICY_RESOURCE.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            image_name: DEFAULT_IMAGE_NAME.to_string(),
            release_tag: DEFAULT_RELEASE_TAG.to_string(),
            build_context: PathBuf::from(DEFAULT_BUILD_CONTEXT),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            manifest_file: None,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl BootstrapConfig {
    /// Reads the configuration from the process environment
    ///
    /// Missing required values are left empty; call [`validate`](Self::validate)
    /// before using the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let readiness_timeout_secs = match env::var("INFRABOOT_READINESS_TIMEOUT") {
            Ok(v) if !v.trim().is_empty() => {
                v.trim().parse::<u64>().map_err(|e| ConfigError::ParseError {
                    field: "INFRABOOT_READINESS_TIMEOUT".to_string(),
                    error: e.to_string(),
                })?
            }
            _ => DEFAULT_READINESS_TIMEOUT_SECS,
        };

        Ok(Self {
            role_name: var_or(ROLE_NAME_VAR, ""),
            policy_name: var_or(POLICY_NAME_VAR, ""),
            bucket_name: var_or(BUCKET_NAME_VAR, ""),
            region: var_or(REGION_VAR, ""),
            registry_user: var_or(REGISTRY_USER_VAR, ""),
            client_region: var_or("INFRABOOT_CLIENT_REGION", DEFAULT_CLIENT_REGION),
            policy_resource: var_or("INFRABOOT_POLICY_RESOURCE", DEFAULT_POLICY_RESOURCE),
            repository: var_or("INFRABOOT_REPOSITORY", DEFAULT_REPOSITORY),
            image_name: var_or("INFRABOOT_IMAGE_NAME", DEFAULT_IMAGE_NAME),
            release_tag: var_or("INFRABOOT_RELEASE_TAG", DEFAULT_RELEASE_TAG),
            build_context: PathBuf::from(var_or("INFRABOOT_BUILD_CONTEXT", DEFAULT_BUILD_CONTEXT)),
            dockerfile: var_or("INFRABOOT_DOCKERFILE", DEFAULT_DOCKERFILE),
            manifest_file: env::var("INFRABOOT_MANIFEST_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            session_name: var_or("INFRABOOT_SESSION_NAME", DEFAULT_SESSION_NAME),
            readiness_timeout_secs,
        })
    }

    /// Loads `path` into the environment, then reads the configuration.
    ///
    /// A missing default `.env` is not an error; an explicitly named file
    /// that cannot be read is.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })?;
            }
            None => match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "Loaded env file"),
                Err(e) => debug!(error = %e, "No .env file loaded"),
            },
        }
        Self::from_env()
    }

    /// Checks that every required value is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            (ROLE_NAME_VAR, &self.role_name),
            (POLICY_NAME_VAR, &self.policy_name),
            (BUCKET_NAME_VAR, &self.bucket_name),
            (REGION_VAR, &self.region),
            (REGISTRY_USER_VAR, &self.registry_user),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired(missing))
        }
    }

    /// Local tag the image is built under
    pub fn image_tag(&self) -> String {
        format!("{}/{}", self.registry_user, self.image_name)
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            max_wait: Duration::from_secs(self.readiness_timeout_secs),
            ..ReadinessPolicy::default()
        }
    }
}

impl fmt::Display for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bootstrap Configuration:")?;
        writeln!(f, "  Role: {}", self.role_name)?;
        writeln!(f, "  Policy: {}", self.policy_name)?;
        writeln!(f, "  Bucket: {} ({})", self.bucket_name, self.region)?;
        writeln!(f, "  Client Region: {}", self.client_region)?;
        writeln!(
            f,
            "  Image: {} -> {}:{}",
            self.image_tag(),
            self.repository,
            self.release_tag
        )?;
        writeln!(f, "  Build Context: {}", self.build_context.display())?;
        if let Some(ref manifest) = self.manifest_file {
            writeln!(f, "  Manifest: {}", manifest.display())?;
        }
        writeln!(f, "  Readiness Timeout: {}s", self.readiness_timeout_secs)?;
        Ok(())
    }
}
