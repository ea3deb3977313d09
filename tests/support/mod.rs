//! In-memory stand-in for every cloud collaborator
//!
//! Keeps just enough IAM state to behave like the real services: roles with
//! attached policies cannot be deleted, policies still attached cannot be
//! deleted, and assume-role only succeeds for an attached role whose trust
//! document names the caller.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use infraboot::cloud::{
    BucketCreation, BuildLogStream, CallerIdentity, Collaborators, IdentityService,
    ImageBuildService, ObjectStorage, RegistryService, ServiceError, TemporaryCredentials,
    TokenService,
};
use infraboot::config::BootstrapConfig;
use infraboot::progress::{ProgressEvent, ProgressHandler};
use infraboot::readiness::ReadinessPolicy;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const ACCOUNT_ID: &str = "123456789012";
pub const CALLER_ARN: &str = "arn:aws:iam::123456789012:user/bootstrap";
pub const PUBLISHED_DIGEST: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000001";

/// Knobs for failure scenarios
#[derive(Debug, Default, Clone)]
pub struct FakeBehavior {
    pub caller_identity_fails: bool,
    /// Bucket names owned by someone else
    pub taken_buckets: Vec<String>,
    /// Assume-role attempts that fail before the role becomes usable
    pub assume_failures_before_ready: u32,
    pub assume_always_fails: bool,
    pub build_error: Option<String>,
    pub create_role_fails: bool,
    pub delete_policy_fails: bool,
    pub put_image_fails: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    /// policy ARN -> document
    policies: BTreeMap<String, String>,
    /// role name -> trust document
    roles: BTreeMap<String, String>,
    attachments: BTreeSet<(String, String)>,
    buckets: BTreeMap<String, String>,
    repositories: BTreeSet<String>,
    /// (repository, tag) -> manifest
    images: BTreeMap<(String, String), String>,
    assume_attempts: u32,
}

pub struct FakeCloud {
    pub behavior: FakeBehavior,
    state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::with_behavior(FakeBehavior::default())
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            state: Mutex::new(FakeState::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            identity: self,
            tokens: self,
            storage: self,
            images: self,
            registry: self,
        }
    }

    pub fn policy_arn(name: &str) -> String {
        format!("arn:aws:iam::{}:policy/{}", ACCOUNT_ID, name)
    }

    /// Leaves a policy, role and attachment behind as an earlier crashed run would
    pub fn seed_stale(&self, role_name: &str, policy_name: &str) {
        let mut state = self.state.lock().unwrap();
        let arn = Self::policy_arn(policy_name);
        state.policies.insert(arn.clone(), "{}".to_string());
        state.roles.insert(role_name.to_string(), "{}".to_string());
        state.attachments.insert((role_name.to_string(), arn));
    }

    /// Creates a policy the pre-clean cannot see, as a concurrent run would
    pub fn seed_policy_only(&self, policy_name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .policies
            .insert(Self::policy_arn(policy_name), "{}".to_string());
    }

    /// A bucket this account created on an earlier run
    pub fn seed_bucket(&self, name: &str, region: &str) {
        let mut state = self.state.lock().unwrap();
        state.buckets.insert(name.to_string(), region.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn position(&self, call_name: &str) -> Option<usize> {
        self.call_names().iter().position(|c| c == call_name)
    }

    pub fn count(&self, call_name: &str) -> usize {
        self.call_names().iter().filter(|c| *c == call_name).count()
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .policies
            .contains_key(&Self::policy_arn(name))
    }

    pub fn policy_document(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(&Self::policy_arn(name))
            .cloned()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.state.lock().unwrap().roles.contains_key(name)
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(name)
    }

    pub fn published_manifest(&self, repository: &str, tag: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IdentityService for FakeCloud {
    async fn create_policy(&self, name: &str, document: &str) -> Result<String, ServiceError> {
        self.record(format!("create_policy {}", name));
        let arn = Self::policy_arn(name);
        let mut state = self.state.lock().unwrap();
        if state.policies.contains_key(&arn) {
            return Err(ServiceError::AlreadyExists(name.to_string()));
        }
        state.policies.insert(arn.clone(), document.to_string());
        Ok(arn)
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ServiceError> {
        self.record(format!("delete_policy {}", policy_arn));
        if self.behavior.delete_policy_fails {
            return Err(ServiceError::rejected("Throttling: rate exceeded"));
        }
        let mut state = self.state.lock().unwrap();
        if state.attachments.iter().any(|(_, arn)| arn == policy_arn) {
            return Err(ServiceError::rejected("DeleteConflict: policy is attached"));
        }
        state
            .policies
            .remove(policy_arn)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(policy_arn.to_string()))
    }

    async fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        _description: &str,
    ) -> Result<String, ServiceError> {
        self.record(format!("create_role {}", name));
        if self.behavior.create_role_fails {
            return Err(ServiceError::rejected("MalformedPolicyDocument"));
        }
        let mut state = self.state.lock().unwrap();
        if state.roles.contains_key(name) {
            return Err(ServiceError::AlreadyExists(name.to_string()));
        }
        state
            .roles
            .insert(name.to_string(), trust_document.to_string());
        Ok(format!("arn:aws:iam::{}:role/{}", ACCOUNT_ID, name))
    }

    async fn delete_role(&self, name: &str) -> Result<(), ServiceError> {
        self.record(format!("delete_role {}", name));
        let mut state = self.state.lock().unwrap();
        if state.attachments.iter().any(|(role, _)| role == name) {
            return Err(ServiceError::rejected("DeleteConflict: role has attached policies"));
        }
        state
            .roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), ServiceError> {
        self.record(format!("attach_role_policy {} {}", role_name, policy_arn));
        let mut state = self.state.lock().unwrap();
        if !state.roles.contains_key(role_name) {
            return Err(ServiceError::NotFound(role_name.to_string()));
        }
        if !state.policies.contains_key(policy_arn) {
            return Err(ServiceError::NotFound(policy_arn.to_string()));
        }
        state
            .attachments
            .insert((role_name.to_string(), policy_arn.to_string()));
        Ok(())
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), ServiceError> {
        self.record(format!("detach_role_policy {} {}", role_name, policy_arn));
        let mut state = self.state.lock().unwrap();
        if state
            .attachments
            .remove(&(role_name.to_string(), policy_arn.to_string()))
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound(format!("{} {}", role_name, policy_arn)))
        }
    }
}

#[async_trait]
impl TokenService for FakeCloud {
    async fn caller_identity(&self) -> Result<CallerIdentity, ServiceError> {
        self.record("caller_identity".to_string());
        if self.behavior.caller_identity_fails {
            return Err(ServiceError::rejected("ExpiredToken"));
        }
        Ok(CallerIdentity {
            account_id: ACCOUNT_ID.to_string(),
            arn: CALLER_ARN.to_string(),
        })
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ServiceError> {
        self.record(format!("assume_role {} {}", role_arn, session_name));
        let mut state = self.state.lock().unwrap();
        state.assume_attempts += 1;

        if self.behavior.assume_always_fails
            || state.assume_attempts <= self.behavior.assume_failures_before_ready
        {
            return Err(ServiceError::rejected("AccessDenied: not authorized"));
        }

        let role_name = role_arn.rsplit('/').next().unwrap_or_default();
        let trust = state
            .roles
            .get(role_name)
            .ok_or_else(|| ServiceError::NotFound(role_arn.to_string()))?;
        let principal = format!("\"AWS\":\"{}\"", CALLER_ARN);
        if !trust.contains(&principal) {
            return Err(ServiceError::rejected("AccessDenied: caller not trusted"));
        }
        if !state.attachments.iter().any(|(role, _)| role == role_name) {
            return Err(ServiceError::rejected("AccessDenied: role has no policy"));
        }

        Ok(TemporaryCredentials {
            access_key_id: "ASIAFAKE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: Some("2026-10-19T12:00:00Z".to_string()),
        })
    }
}

#[async_trait]
impl ObjectStorage for FakeCloud {
    async fn create_bucket(
        &self,
        name: &str,
        region: &str,
    ) -> Result<BucketCreation, ServiceError> {
        self.record(format!("create_bucket {} {}", name, region));
        if self.behavior.taken_buckets.iter().any(|b| b == name) {
            return Err(ServiceError::rejected(
                "BucketAlreadyExists: the requested bucket name is not available",
            ));
        }
        let mut state = self.state.lock().unwrap();
        if state.buckets.contains_key(name) {
            return Ok(BucketCreation::AlreadyOwned);
        }
        state.buckets.insert(name.to_string(), region.to_string());
        Ok(BucketCreation::Created)
    }
}

#[async_trait]
impl ImageBuildService for FakeCloud {
    async fn build<'a>(
        &'a self,
        context_archive: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<BuildLogStream<'a>, ServiceError> {
        self.record(format!("build {} {}", tag, dockerfile));
        let mut lines: Vec<Result<String, ServiceError>> = vec![
            Ok(format!("Step 1/2 : FROM scratch ({} bytes of context)", context_archive.len())),
            Ok("Step 2/2 : COPY . .".to_string()),
        ];
        match self.behavior.build_error {
            Some(ref error) => lines.push(Err(ServiceError::rejected(error.clone()))),
            None => lines.push(Ok(format!("Successfully tagged {}", tag))),
        }
        Ok(stream::iter(lines).boxed())
    }
}

#[async_trait]
impl RegistryService for FakeCloud {
    async fn create_repository(&self, name: &str) -> Result<(), ServiceError> {
        self.record(format!("create_repository {}", name));
        let mut state = self.state.lock().unwrap();
        if !state.repositories.insert(name.to_string()) {
            return Err(ServiceError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    async fn put_image(
        &self,
        repository: &str,
        tag: &str,
        manifest: &str,
        _media_type: &str,
    ) -> Result<Option<String>, ServiceError> {
        self.record(format!("put_image {} {}", repository, tag));
        if self.behavior.put_image_fails {
            return Err(ServiceError::rejected("InvalidParameterException"));
        }
        let mut state = self.state.lock().unwrap();
        if !state.repositories.contains(repository) {
            return Err(ServiceError::NotFound(repository.to_string()));
        }
        state
            .images
            .insert((repository.to_string(), tag.to_string()), manifest.to_string());
        Ok(Some(PUBLISHED_DIGEST.to_string()))
    }
}

/// Progress handler that keeps every event
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Readiness timings small enough for tests
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        initial_delay: Duration::ZERO,
        attempt_timeout: Duration::from_millis(200),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        max_wait: Duration::from_millis(250),
    }
}

/// Complete configuration with a real build context under `dir`
pub fn config_in(dir: &Path) -> BootstrapConfig {
    let context = dir.join("lambda_app");
    fs::create_dir_all(&context).unwrap();
    fs::write(context.join("Dockerfile"), "FROM scratch\nCOPY . .\n").unwrap();
    fs::write(context.join("main.go"), "package main\n").unwrap();

    BootstrapConfig {
        role_name: "TerraformBootstrapRole".to_string(),
        policy_name: "TerraformBootstrapPolicy".to_string(),
        bucket_name: "tf-state-bucket".to_string(),
        region: "us-west-2".to_string(),
        registry_user: "ci-user".to_string(),
        build_context: context,
        ..BootstrapConfig::default()
    }
}

pub fn manifest_fixture() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/manifests/manifest-list.json")
}
