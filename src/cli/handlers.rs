//! Subcommand entry points; each returns the process exit code

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::commands::{CleanupArgs, DocumentsArgs, RunArgs};
use super::output::OutputFormatter;
use crate::cloud::aws::AwsCloud;
use crate::cloud::docker::DockerBuilder;
use crate::cloud::{BuildLogStream, Collaborators, ImageBuildService, ServiceError, TokenService};
use crate::config::BootstrapConfig;
use crate::policy::TrustDocuments;
use crate::progress::LoggingHandler;
use crate::registry::ManifestList;
use crate::workflow::{BootstrapWorkflow, ExitPolicy, EXIT_FATAL, EXIT_SUCCESS};
use async_trait::async_trait;

/// Stands in for the Docker daemon when no client could be created, so the
/// build step fails on its own instead of aborting the run
struct DockerUnavailable(String);

#[async_trait]
impl ImageBuildService for DockerUnavailable {
    async fn build<'a>(
        &'a self,
        _context_archive: Vec<u8>,
        _dockerfile: &str,
        _tag: &str,
    ) -> Result<BuildLogStream<'a>, ServiceError> {
        Err(ServiceError::rejected(self.0.clone()))
    }
}

fn load_config(env_file: Option<&Path>) -> Result<BootstrapConfig> {
    BootstrapConfig::load(env_file).context("Failed to load configuration")
}

fn apply_overrides(config: &mut BootstrapConfig, args: &RunArgs) {
    if let Some(ref manifest) = args.manifest {
        config.manifest_file = Some(manifest.clone());
    }
    if let Some(ref context) = args.build_context {
        config.build_context = context.clone();
    }
    if let Some(ref tag) = args.release_tag {
        config.release_tag = tag.clone();
    }
    if let Some(secs) = args.readiness_timeout {
        config.readiness_timeout_secs = secs;
    }
}

fn emit(output: &str, target: Option<&Path>) -> Result<()> {
    match target {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write report to {}", path.display())),
        None => {
            print!("{}", output);
            Ok(())
        }
    }
}

pub async fn handle_run(args: &RunArgs, env_file: Option<&Path>) -> i32 {
    let mut config = match load_config(env_file) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_FATAL;
        }
    };
    apply_overrides(&mut config, args);

    // Nothing external is touched until the configuration is complete
    if let Err(e) = config.validate() {
        error!("{}", e);
        return EXIT_FATAL;
    }
    debug!("{}", config);

    let aws = AwsCloud::connect(&config.client_region, &config.region).await;
    let docker = DockerBuilder::connect();
    let unavailable;
    let images: &dyn ImageBuildService = match docker {
        Ok(ref docker) => docker,
        Err(ref e) => {
            warn!(error = %e, "Docker is unavailable; the image build step will fail");
            unavailable = DockerUnavailable(format!("{:#}", e));
            &unavailable
        }
    };

    let cloud = Collaborators {
        identity: &aws,
        tokens: &aws,
        storage: &aws,
        images,
        registry: &aws,
    };
    let progress = LoggingHandler;
    let policy = if args.strict {
        ExitPolicy::Strict
    } else {
        ExitPolicy::Lenient
    };
    let formatter = OutputFormatter::new(args.format.into());

    match BootstrapWorkflow::new(cloud, &progress).run(&config).await {
        Ok(report) => {
            let rendered = formatter.format_report(&report);
            if let Err(e) = rendered.and_then(|out| emit(&out, args.output.as_deref())) {
                error!("{:#}", e);
            }
            let code = report.exit_code(policy);
            info!(exit_code = code, failures = report.failures().count(), "Bootstrap finished");
            code
        }
        Err(failure) => {
            error!("{}", failure.error);
            let rendered = formatter.format_failure(&failure);
            if let Err(e) = rendered.and_then(|out| emit(&out, args.output.as_deref())) {
                error!("{:#}", e);
            }
            EXIT_FATAL
        }
    }
}

pub async fn handle_cleanup(args: &CleanupArgs, env_file: Option<&Path>) -> i32 {
    let config = match load_config(env_file) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_FATAL;
        }
    };

    let aws = AwsCloud::connect(&config.client_region, &config.region).await;
    let unused_images = DockerUnavailable("image builds are not part of cleanup".to_string());
    let cloud = Collaborators {
        identity: &aws,
        tokens: &aws,
        storage: &aws,
        images: &unused_images,
        registry: &aws,
    };
    let progress = LoggingHandler;

    match BootstrapWorkflow::new(cloud, &progress).cleanup(&config).await {
        Ok(report) => {
            let formatter = OutputFormatter::new(args.format.into());
            match formatter.format_cleanup(&report) {
                Ok(out) => print!("{}", out),
                Err(e) => error!("{:#}", e),
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            EXIT_FATAL
        }
    }
}

pub async fn handle_documents(args: &DocumentsArgs, env_file: Option<&Path>) -> i32 {
    match render_documents(args, env_file).await {
        Ok(out) => {
            print!("{}", out);
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            EXIT_FATAL
        }
    }
}

async fn render_documents(args: &DocumentsArgs, env_file: Option<&Path>) -> Result<String> {
    let config = load_config(env_file)?;

    let principal = match args.principal {
        Some(ref arn) => arn.clone(),
        None => {
            let aws = AwsCloud::connect(&config.client_region, &config.region).await;
            aws.caller_identity()
                .await
                .context("Failed to look up caller identity; pass --principal to skip it")?
                .arn
        }
    };

    let documents = TrustDocuments::build(&config.policy_resource, &principal)
        .context("Failed to render policy documents")?;

    let mut output = String::new();
    output.push_str("# Permission policy\n");
    output.push_str(&documents.permission);
    output.push_str("\n\n# Trust policy\n");
    output.push_str(&documents.trust);
    output.push('\n');

    let manifest_path = args.manifest.as_ref().or(config.manifest_file.as_ref());
    if let Some(path) = manifest_path {
        let manifest = ManifestList::from_file(path)?;
        manifest.validate()?;
        output.push_str(&format!(
            "\n# Manifest list ({} platforms)\n",
            manifest.manifests.len()
        ));
        output.push_str(&manifest.render()?);
    }

    Ok(output)
}
