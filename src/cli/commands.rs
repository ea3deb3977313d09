use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// One-shot bootstrap of the cloud prerequisites for a Terraform deployment
#[derive(Parser, Debug)]
#[command(
    name = "infraboot",
    about = "One-shot bootstrap of the cloud prerequisites for a Terraform deployment",
    version,
    long_about = "infraboot creates a short-lived IAM role and policy, proves the role can be \
                  assumed, provisions the Terraform state bucket, builds the application image \
                  and publishes its multi-architecture manifest list. The temporary identity \
                  resources are always removed before exit."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Load environment variables from this file (defaults to ./.env when present)"
    )]
    pub env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the full bootstrap",
        long_about = "Pre-cleans, creates the temporary role and policy, waits until the role \
                      can be assumed, then provisions the bucket, builds the image and publishes \
                      the manifest list. Identity resources are deleted on every exit path.\n\n\
                      Examples:\n  \
                      infraboot run\n  \
                      infraboot run --strict --format json\n  \
                      infraboot run --manifest dist/manifest-list.json"
    )]
    Run(RunArgs),

    #[command(
        about = "Delete the bootstrap role and policy",
        long_about = "Detaches the policy, deletes the role, then deletes the policy. Absent \
                      entities are not an error.\n\n\
                      Examples:\n  \
                      infraboot cleanup"
    )]
    Cleanup(CleanupArgs),

    #[command(
        about = "Print the documents a run would submit",
        long_about = "Renders the permission policy, the trust policy and, when configured, \
                      the manifest list without making any mutating call.\n\n\
                      Examples:\n  \
                      infraboot documents\n  \
                      infraboot documents --principal arn:aws:iam::123456789012:user/ci"
    )]
    Documents(DocumentsArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        long,
        help = "Exit with status 2 when any non-fatal step (bucket, build, publish, cleanup) failed"
    )]
    pub strict: bool,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest list produced by a multi-arch build (overrides INFRABOOT_MANIFEST_FILE)"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Build context directory (overrides INFRABOOT_BUILD_CONTEXT)"
    )]
    pub build_context: Option<PathBuf>,

    #[arg(long, value_name = "TAG", help = "Tag to publish the manifest list under")]
    pub release_tag: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Overall wait for the new role to become assumable"
    )]
    pub readiness_timeout: Option<u64>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the report to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct CleanupArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DocumentsArgs {
    #[arg(
        long,
        value_name = "ARN",
        help = "Principal allowed to assume the role (defaults to the caller identity)"
    )]
    pub principal: Option<String>,

    #[arg(
        short = 'm',
        long,
        value_name = "FILE",
        help = "Manifest list to validate and render (overrides INFRABOOT_MANIFEST_FILE)"
    )]
    pub manifest: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
