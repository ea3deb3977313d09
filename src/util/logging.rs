//! Structured logging setup for infraboot
//!
//! Built on the `tracing` ecosystem. Output goes to stderr so that the run
//! report printed on stdout stays machine-readable.
//!
//! # Example
//!
//! ```no_run
//! use infraboot::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(bucket = "tf-state", "Creating bucket");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub const LOG_LEVEL_VAR: &str = "INFRABOOT_LOG_LEVEL";
pub const LOG_JSON_VAR: &str = "INFRABOOT_LOG_JSON";

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for the `infraboot` target
    pub level: Level,

    /// Emit JSON lines instead of the console format
    pub use_json: bool,

    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata, for CI pipelines
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    /// Resolves the level from CLI flags, falling back to `INFRABOOT_LOG_LEVEL`
    ///
    /// An explicit `--log-level` wins over `-v`/`-q`.
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level_str) = log_level {
            parse_level(level_str)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            parse_level(&env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string()))
        };

        Self {
            level,
            use_json: json_from_env(),
            ..Default::default()
        }
    }
}

/// Parses a log level, defaulting to INFO for anything unrecognised
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn json_from_env() -> bool {
    env::var(LOG_JSON_VAR)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

/// Builds the filter: `RUST_LOG` if set, otherwise our level plus quiet SDK internals
fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let directives = [
        format!("infraboot={}", level),
        "aws_config=warn".to_string(),
        "aws_smithy_runtime=warn".to_string(),
        "hyper=warn".to_string(),
        "h2=warn".to_string(),
        "bollard=warn".to_string(),
    ];
    directives
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(EnvFilter::new("warn"), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `INFRABOOT_LOG_LEVEL` and `INFRABOOT_LOG_JSON`
pub fn init_from_env() {
    init_logging(LoggingConfig::from_flags(None, false, false));
}
