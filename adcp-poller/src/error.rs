//! Error types for the poller crate.

/// Errors raised by the poll scheduler.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A poll task ended abnormally
    #[error("Poll task failed: {0}")]
    TaskJoin(String),
}

/// Type alias for poller results.
pub type PollerResult<T> = Result<T, PollerError>;
