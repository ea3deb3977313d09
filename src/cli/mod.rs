pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CleanupArgs, CliArgs, Commands, DocumentsArgs, RunArgs};
pub use output::{OutputFormat, OutputFormatter};
