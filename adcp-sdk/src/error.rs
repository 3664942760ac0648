use adcp_api::{ApiError, AttributeId, DispatchError, SessionError};
use adcp_poller::PollerError;
use adcp_state::{DeviceId, StateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Poller error: {0}")]
    Poller(#[from] PollerError),

    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Device already registered: {0}")]
    DuplicateDevice(DeviceId),

    #[error("{attribute} is not supported by {device}")]
    Unsupported { device: DeviceId, attribute: AttributeId },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SdkError>;

/// Coarse outcome reported back to a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Unauthorized,
    NotFound,
    Timeout,
    ServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => StatusCode::Ok,
            Err(err) => err.status(),
        }
    }
}

impl SdkError {
    pub fn status(&self) -> StatusCode {
        match self {
            SdkError::Session(err) => session_status(err),
            SdkError::Api(err) => api_status(err),
            SdkError::Dispatch(err) => api_status(&err.source),
            SdkError::DeviceNotFound(_) => StatusCode::NotFound,
            SdkError::Unsupported { .. } => StatusCode::NotImplemented,
            SdkError::DuplicateDevice(_) | SdkError::Config(_) => StatusCode::BadRequest,
            SdkError::State(_) | SdkError::Poller(_) => StatusCode::ServerError,
        }
    }

    /// Text for the user; the device's own answer for rejected commands
    pub fn user_message(&self) -> String {
        match self {
            SdkError::Dispatch(err) => err.user_message(),
            SdkError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

fn api_status(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Session(err) => session_status(err),
        ApiError::UnknownCommand(_) => StatusCode::NotImplemented,
        ApiError::InvalidInvocation(_) | ApiError::InvalidValue { .. } | ApiError::UnknownOption { .. } => {
            StatusCode::BadRequest
        }
    }
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::ConnectTimeout { .. } | SessionError::Timeout(_) => StatusCode::Timeout,
        SessionError::AuthFailed { .. } => StatusCode::Unauthorized,
        SessionError::CommandRejected(_) => StatusCode::BadRequest,
        SessionError::Disconnected(_) | SessionError::MalformedFrame(_) => StatusCode::ServerError,
    }
}
