//! The bootstrap run
//!
//! Steps execute strictly in order:
//!
//! 1. validate configuration, look up the caller, render policy documents
//! 2. pre-clean any role/policy left under the target names
//! 3. create the policy, which yields an [`IdentityLease`]
//! 4. inside the lease: create the role, attach, wait until assumable,
//!    create the bucket, build the image, publish the manifest list
//! 5. release the lease (detach, delete role, delete policy)
//!
//! Failures in steps 1-4 up to the readiness gate are fatal; bucket, build,
//! publish and cleanup failures are recorded and the run continues. Once the
//! lease exists it is released whatever the inner steps return.

pub mod report;
pub mod step;

pub use report::{ExitPolicy, RunReport, EXIT_DEGRADED, EXIT_FATAL, EXIT_SUCCESS};
pub use step::{Step, StepOutcome, StepRecord, StepStatus};

use crate::cloud::Collaborators;
use crate::config::{BootstrapConfig, ConfigError, POLICY_NAME_VAR, ROLE_NAME_VAR};
use crate::error::BootstrapError;
use crate::identity::{CleanupCoordinator, CleanupReport, IdentityLease, IdentityProvisioner, IdentityTarget};
use crate::image::ImageBuilder;
use crate::policy::TrustDocuments;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::readiness::{ReadinessPolicy, RoleAssumer};
use crate::registry::{ManifestList, RegistryPublisher};
use crate::storage::StorageProvisioner;
use chrono::Utc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A fatal error together with what the run had done before it stopped
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: BootstrapError,
    pub report: Box<RunReport>,
}

/// Step counter and report for one run
struct Run {
    record: StepRecord,
    report: RunReport,
    started: Instant,
}

impl Run {
    fn new() -> Self {
        Self {
            record: StepRecord::default(),
            report: RunReport::new(),
            started: Instant::now(),
        }
    }

    fn begin(&self, title: impl Into<String>, progress: &dyn ProgressHandler) -> Step {
        self.record.begin(title, progress)
    }

    fn finish(&mut self, outcome: StepOutcome) {
        self.record = outcome.record;
        self.report.steps.push(outcome);
    }

    fn record_fatal(&mut self, step: Step, error: &BootstrapError, progress: &dyn ProgressHandler) {
        self.finish(step.fail(error.to_string(), true, progress));
    }

    fn abort(
        mut self,
        step: Step,
        error: BootstrapError,
        progress: &dyn ProgressHandler,
    ) -> RunFailure {
        self.record_fatal(step, &error, progress);
        self.into_failure(error)
    }

    fn into_failure(mut self, error: BootstrapError) -> RunFailure {
        self.report.finished_at = Some(Utc::now());
        RunFailure {
            error,
            report: Box::new(self.report),
        }
    }

    fn complete(mut self, progress: &dyn ProgressHandler) -> RunReport {
        self.report.finished_at = Some(Utc::now());
        progress.on_progress(&ProgressEvent::Completed {
            failures: self.report.failures().count(),
            total_time: self.started.elapsed(),
        });
        self.report
    }
}

pub struct BootstrapWorkflow<'a> {
    cloud: Collaborators<'a>,
    progress: &'a dyn ProgressHandler,
    readiness: Option<ReadinessPolicy>,
}

impl<'a> BootstrapWorkflow<'a> {
    pub fn new(cloud: Collaborators<'a>, progress: &'a dyn ProgressHandler) -> Self {
        Self {
            cloud,
            progress,
            readiness: None,
        }
    }

    /// Overrides the readiness policy derived from the configuration
    pub fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = Some(policy);
        self
    }

    pub async fn run(&self, config: &BootstrapConfig) -> Result<RunReport, RunFailure> {
        let progress = self.progress;
        let mut run = Run::new();
        progress.on_progress(&ProgressEvent::Started {
            run_id: run.report.run_id.to_string(),
        });

        let step = run.begin("Validating configuration", progress);
        if let Err(e) = config.validate() {
            return Err(run.abort(step, e.into(), progress));
        }
        run.finish(step.succeed(progress));

        let step = run.begin("Looking up caller identity", progress);
        let caller = match self.cloud.tokens.caller_identity().await {
            Ok(caller) => caller,
            Err(e) => return Err(run.abort(step, BootstrapError::CallerIdentity(e), progress)),
        };
        info!(arn = %caller.arn, account = %caller.account_id, "Caller identity resolved");
        run.report.caller = Some(caller.clone());
        run.finish(step.succeed(progress));

        let step = run.begin("Creating policy documents", progress);
        let documents = match TrustDocuments::build(&config.policy_resource, &caller.arn) {
            Ok(documents) => documents,
            Err(e) => return Err(run.abort(step, e.into(), progress)),
        };
        run.finish(step.succeed(progress));

        let target = IdentityTarget::new(&caller, &config.role_name, &config.policy_name);
        let provisioner = IdentityProvisioner::new(self.cloud.identity);

        let step = run.begin("Deleting potentially pre-existing roles/policies", progress);
        let preclean = provisioner.preclean(&target).await;
        let outcome = if preclean.has_failures() {
            step.fail(preclean.failure_summary(), false, progress)
        } else {
            step.succeed(progress)
        };
        run.finish(outcome);
        run.report.preclean = Some(preclean);

        let step = run.begin(format!("Creating policy {}", target.policy_name), progress);
        let mut lease = match provisioner.create_policy(&target, &documents.permission).await {
            Ok(lease) => lease,
            Err(e) => return Err(run.abort(step, e, progress)),
        };
        run.finish(step.succeed(progress));

        let outcome = self
            .within_lease(&mut run, &mut lease, config, &documents)
            .await;

        let step = run.begin("Deleting created roles/policies", progress);
        let cleanup = lease.release().await;
        run.finish(cleanup_outcome(step, &cleanup, progress));
        run.report.cleanup = Some(cleanup);

        match outcome {
            Ok(()) => Ok(run.complete(progress)),
            Err(e) => Err(run.into_failure(e)),
        }
    }

    /// Standalone teardown of the named role and policy
    pub async fn cleanup(&self, config: &BootstrapConfig) -> Result<CleanupReport, BootstrapError> {
        let missing: Vec<&'static str> = [
            (ROLE_NAME_VAR, &config.role_name),
            (POLICY_NAME_VAR, &config.policy_name),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing).into());
        }

        let caller = self
            .cloud
            .tokens
            .caller_identity()
            .await
            .map_err(BootstrapError::CallerIdentity)?;
        let target = IdentityTarget::new(&caller, &config.role_name, &config.policy_name);

        let step = StepRecord::default().begin("Deleting roles/policies", self.progress);
        let report = CleanupCoordinator::new(self.cloud.identity)
            .teardown(&target)
            .await;
        let outcome = cleanup_outcome(step, &report, self.progress);
        debug!(status = ?outcome.status, removed = report.removed(), "Standalone cleanup finished");
        Ok(report)
    }

    /// Steps that run while the identity lease is held
    async fn within_lease(
        &self,
        run: &mut Run,
        lease: &mut IdentityLease<'_>,
        config: &BootstrapConfig,
        documents: &TrustDocuments,
    ) -> Result<(), BootstrapError> {
        let progress = self.progress;

        let step = run.begin(format!("Creating role {}", lease.target().role_name), progress);
        let role_arn = match lease.create_role(&documents.trust).await {
            Ok(arn) => arn.to_string(),
            Err(e) => {
                run.record_fatal(step, &e, progress);
                return Err(e);
            }
        };
        run.finish(step.succeed(progress));

        let step = run.begin("Attaching policy to role", progress);
        if let Err(e) = lease.attach().await {
            run.record_fatal(step, &e, progress);
            return Err(e);
        }
        run.finish(step.succeed(progress));

        let step = run.begin("Assuming role", progress);
        let policy = self.readiness.unwrap_or_else(|| config.readiness_policy());
        let assumer = RoleAssumer::new(self.cloud.tokens, policy);
        match assumer
            .wait_until_assumable(&role_arn, &config.session_name, progress)
            .await
        {
            Ok(ready) => {
                debug!(
                    attempts = ready.attempts,
                    expiration = ?ready.credentials.expiration,
                    "Temporary credentials issued"
                );
                run.finish(step.succeed(progress));
            }
            Err(e) => {
                let e = BootstrapError::from(e);
                run.record_fatal(step, &e, progress);
                return Err(e);
            }
        }

        self.provision_bucket(run, config).await;
        self.build_image(run, config).await;
        self.publish_image(run, config).await;
        Ok(())
    }

    async fn provision_bucket(&self, run: &mut Run, config: &BootstrapConfig) {
        let progress = self.progress;
        let step = run.begin(format!("Creating bucket {}", config.bucket_name), progress);
        let outcome = match StorageProvisioner::new(self.cloud.storage)
            .create_bucket(&config.bucket_name, &config.region)
            .await
        {
            Ok(bucket) => {
                run.report.bucket = Some(bucket);
                step.succeed(progress)
            }
            Err(e) => step.fail(
                format!("Could not create bucket {}: {}", config.bucket_name, e),
                false,
                progress,
            ),
        };
        run.finish(outcome);
    }

    async fn build_image(&self, run: &mut Run, config: &BootstrapConfig) {
        let progress = self.progress;
        let tag = config.image_tag();
        let step = run.begin(format!("Building image {}", tag), progress);
        let outcome = match ImageBuilder::new(self.cloud.images)
            .build(&config.build_context, &config.dockerfile, &tag, progress)
            .await
        {
            Ok(artifact) => {
                run.report.artifact = Some(artifact);
                step.succeed(progress)
            }
            Err(e) => {
                warn!("Continuing to registry publication without a fresh image build");
                step.fail(e.to_string(), false, progress)
            }
        };
        run.finish(outcome);
    }

    async fn publish_image(&self, run: &mut Run, config: &BootstrapConfig) {
        let progress = self.progress;
        let publisher = RegistryPublisher::new(self.cloud.registry);

        let step = run.begin(format!("Creating repository {}", config.repository), progress);
        let outcome = match publisher.ensure_repository(&config.repository).await {
            Ok(_) => step.succeed(progress),
            Err(e) => step.fail(
                format!("Could not create repository {}: {}", config.repository, e),
                false,
                progress,
            ),
        };
        run.finish(outcome);

        let step = run.begin(
            format!("Publishing {}:{}", config.repository, config.release_tag),
            progress,
        );
        let Some(path) = config.manifest_file.as_deref() else {
            run.finish(step.skip(
                "no manifest list supplied; set INFRABOOT_MANIFEST_FILE to the output of a multi-arch build",
                progress,
            ));
            return;
        };

        let published = match ManifestList::from_file(path) {
            Ok(manifest) => {
                publisher
                    .publish(&config.repository, &config.release_tag, &manifest)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        let outcome = match published {
            Ok(image) => {
                run.report.published = Some(image);
                step.succeed(progress)
            }
            Err(e) => step.fail(e.to_string(), false, progress),
        };
        run.finish(outcome);
    }
}

fn cleanup_outcome(step: Step, report: &CleanupReport, progress: &dyn ProgressHandler) -> StepOutcome {
    if report.has_failures() {
        step.fail(report.failure_summary(), false, progress)
    } else {
        step.succeed(progress)
    }
}
