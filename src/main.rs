use infraboot::cli::commands::{CliArgs, Commands};
use infraboot::cli::handlers::{handle_cleanup, handle_documents, handle_run};
use infraboot::util::{init_logging, LoggingConfig};
use infraboot::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("infraboot v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let env_file = args.env_file.as_deref();
    let exit_code = match &args.command {
        Commands::Run(run_args) => handle_run(run_args, env_file).await,
        Commands::Cleanup(cleanup_args) => handle_cleanup(cleanup_args, env_file).await,
        Commands::Documents(doc_args) => handle_documents(doc_args, env_file).await,
    };

    std::process::exit(exit_code);
}
