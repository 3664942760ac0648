use adcp_client::{DeviceError, SessionError};
use thiserror::Error;

/// High-level API errors for projector operations
///
/// Wraps the session errors of the client crate and adds the failures that
/// happen before anything reaches the wire.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Command id not present in the command table
    ///
    /// This is a caller or configuration error; nothing is sent to the device.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Invocation that cannot be executed as given
    ///
    /// Covers an empty command list or a repeat count of zero.
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    /// Query answer that does not decode into the attribute's type
    #[error("Unexpected value for {attribute}: {raw}")]
    InvalidValue { attribute: &'static str, raw: String },

    /// Requested select option is not offered by the device
    #[error("Option {option:?} is not available for {attribute}")]
    UnknownOption { attribute: &'static str, option: String },

    /// Failure reported by the session, including device rejections
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    /// The device's own error, when the command was rejected
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            ApiError::Session(err) => err.device_error(),
            _ => None,
        }
    }

    /// Text to show the user: the device's answer for rejections
    pub fn user_message(&self) -> String {
        match self.device_error() {
            Some(err) => err.raw.clone(),
            None => self.to_string(),
        }
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use adcp_client::ErrorCode;

    #[test]
    fn test_error_display() {
        let err = ApiError::UnknownCommand("POWER_MAYBE".to_string());
        assert_eq!(err.to_string(), "Unknown command: POWER_MAYBE");

        let err = ApiError::InvalidValue {
            attribute: "muted",
            raw: "\"maybe\"".to_string(),
        };
        assert_eq!(err.to_string(), "Unexpected value for muted: \"maybe\"");
    }

    #[test]
    fn test_user_message_prefers_device_text() {
        let rejected = ApiError::from(SessionError::CommandRejected(DeviceError::new(
            ErrorCode::InvalidValue,
            "err_val",
        )));
        assert_eq!(rejected.user_message(), "err_val");

        let unknown = ApiError::UnknownCommand("X".to_string());
        assert_eq!(unknown.user_message(), "Unknown command: X");
    }
}
