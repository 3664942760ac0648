//! Error types for the ADCP client

use std::time::Duration;

use thiserror::Error;

use crate::codec::{DeviceError, MalformedFrame};

/// Errors that can occur while talking to a projector over an ADCP session
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The TCP connect or authentication handshake did not finish in time
    #[error("Connection to {addr} timed out")]
    ConnectTimeout { addr: String },

    /// The device rejected the configured password
    ///
    /// Terminal for the session: no reconnect is attempted with the same credential.
    #[error("ADCP authentication rejected by {addr}, check the configured password")]
    AuthFailed { addr: String },

    /// The connection was refused, reset or closed by the device
    #[error("Connection lost: {0}")]
    Disconnected(String),

    /// No response line arrived within the command timeout
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The device answered with an `err_*` code
    #[error("Command rejected: {0}")]
    CommandRejected(DeviceError),

    /// The device sent a line that could not be decoded
    #[error(transparent)]
    MalformedFrame(#[from] MalformedFrame),
}

impl SessionError {
    /// Whether the error leaves the connection in an unknown state
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, SessionError::Disconnected(_) | SessionError::MalformedFrame(_))
    }

    /// Whether a later attempt may succeed without reconfiguration
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SessionError::AuthFailed { .. } | SessionError::CommandRejected(_)
        )
    }

    /// The device-reported error, if this is a rejection
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            SessionError::CommandRejected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Disconnected(err.to_string())
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
