//! Logging setup for applications embedding the SDK
//!
//! Library code only emits `tracing` events. Applications pick how they are
//! rendered, if at all, by installing a subscriber through this module.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No output; the default for controllers that log elsewhere
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Initialize logging with the specified mode
///
/// Call once, early, before devices are added.
///
/// # Environment Variables
///
/// - `ADCP_LOG_LEVEL`: filter directive, e.g. `debug` or `adcp_poller=trace`
/// - `RUST_LOG`: used when `ADCP_LOG_LEVEL` is not set
///
/// ```rust,ignore
/// adcp_sdk::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `ADCP_LOG_MODE`
///
/// `development` and `debug` select the matching mode; anything else,
/// including an unset variable, is silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(mode_from_env(std::env::var("ADCP_LOG_MODE").ok().as_deref()))
}

fn mode_from_env(value: Option<&str>) -> LoggingMode {
    match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("development") => LoggingMode::Development,
        Some("debug") => LoggingMode::Debug,
        _ => LoggingMode::Silent,
    }
}

/// `ADCP_LOG_LEVEL`, then `RUST_LOG`, then `default_level`
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("ADCP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter(format!("{directives}: {e}")))
}

/// Whether a global subscriber is installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

pub fn init_silent() -> Result<(), LoggingError> {
    init_logging(LoggingMode::Silent)
}
