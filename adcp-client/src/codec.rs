//! ADCP frame encoding and decoding
//!
//! ADCP is a line protocol: every command and every response is a single
//! ASCII line terminated by CR LF. Commands take the form
//! `<opcode>[ <param>]`, queries use `?` as their parameter.
//!
//! Before any command is accepted the device sends a greeting line. It is
//! either `NOKEY` (authentication disabled) or a nonce that must be answered
//! with the SHA-256 digest of the nonce followed by the password.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Line terminator used in both directions
pub const TERMINATOR: &str = "\r\n";

/// Parameter used to turn an opcode into a query
pub const QUERY_PARAM: &str = "?";

/// Greeting sent by devices with authentication disabled
pub const NO_KEY: &str = "NOKEY";

/// A line that could not be decoded as an ADCP frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed ADCP frame: {0}")]
pub struct MalformedFrame(pub String);

// ============================================================================
// Command frames
// ============================================================================

/// A single outbound command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub opcode: String,
    pub param: Option<String>,
}

impl CommandFrame {
    pub fn new(opcode: impl Into<String>, param: Option<impl Into<String>>) -> Self {
        Self {
            opcode: opcode.into(),
            param: param.map(Into::into),
        }
    }

    /// A `<opcode> ?` query frame
    pub fn query(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            param: Some(QUERY_PARAM.to_string()),
        }
    }

    /// Whether the device is expected to answer with data
    pub fn is_query(&self) -> bool {
        self.param
            .as_deref()
            .map(|p| p.ends_with(QUERY_PARAM))
            .unwrap_or(false)
    }

    /// Encode the frame including the terminator
    pub fn encode(&self) -> String {
        encode(&self.opcode, self.param.as_deref())
    }

    /// Parse a command line back into opcode and parameter
    pub fn parse(line: &str) -> Result<Self, MalformedFrame> {
        let line = strip_terminator(line);
        check_ascii(line)?;

        let line = line.trim();
        if line.is_empty() {
            return Err(MalformedFrame("empty command".to_string()));
        }

        let (opcode, param) = match line.split_once(' ') {
            Some((opcode, rest)) => {
                let rest = rest.trim();
                (opcode, (!rest.is_empty()).then(|| rest.to_string()))
            }
            None => (line, None),
        };

        Ok(Self {
            opcode: opcode.to_string(),
            param,
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{} {}", self.opcode, param),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// Encode `<opcode>[ <param>]\r\n`
pub fn encode(opcode: &str, param: Option<&str>) -> String {
    match param {
        Some(param) => format!("{opcode} {param}{TERMINATOR}"),
        None => format!("{opcode}{TERMINATOR}"),
    }
}

/// Quote an enumerated value the way the device expects it
pub fn quote(value: &str) -> String {
    format!("\"{value}\"")
}

/// Strip surrounding double quotes from a scalar payload
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// ============================================================================
// Responses
// ============================================================================

/// Error codes a device can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `err_cmd`: unknown command or not supported by this model
    UnknownCommand,
    /// `err_val`: value out of range or invalid
    InvalidValue,
    /// `err_option`: option not supported, invalid or missing
    InvalidOption,
    /// `err_inactive`: temporarily unavailable, usually device off or no signal
    Inactive,
    /// `err_internal1`
    Internal1,
    /// `err_internal2`
    Internal2,
    /// `err_auth`
    Auth,
    /// Any other `err_*` token
    Unrecognized,
}

impl ErrorCode {
    pub fn from_token(token: &str) -> Self {
        match token {
            "err_cmd" => ErrorCode::UnknownCommand,
            "err_val" => ErrorCode::InvalidValue,
            "err_option" => ErrorCode::InvalidOption,
            "err_inactive" => ErrorCode::Inactive,
            "err_internal1" => ErrorCode::Internal1,
            "err_internal2" => ErrorCode::Internal2,
            "err_auth" => ErrorCode::Auth,
            _ => ErrorCode::Unrecognized,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "command not recognized or not supported on this model",
            ErrorCode::InvalidValue => "value out of range or invalid",
            ErrorCode::InvalidOption => "option not supported, invalid or missing",
            ErrorCode::Inactive => "temporarily unavailable",
            ErrorCode::Internal1 | ErrorCode::Internal2 => "internal device communication error",
            ErrorCode::Auth => "authentication required or rejected",
            ErrorCode::Unrecognized => "unrecognized device error",
        }
    }

    /// The model does not implement the command or option
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ErrorCode::UnknownCommand | ErrorCode::InvalidOption)
    }

    /// The command exists but cannot run right now
    pub fn is_inactive(&self) -> bool {
        matches!(self, ErrorCode::Inactive)
    }
}

/// An `err_*` answer, keeping the device text verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub code: ErrorCode,
    pub raw: String,
}

impl DeviceError {
    pub fn new(code: ErrorCode, raw: impl Into<String>) -> Self {
        Self {
            code,
            raw: raw.into(),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw, self.code.description())
    }
}

/// A decoded response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Query result, raw payload as sent (quotes and JSON kept)
    Data(String),
    /// Setter accepted
    Ack,
    /// Device rejected the command
    Error(DeviceError),
}

/// Decode a response line
///
/// `expects_data` is true when the command was a query; bare tokens such as
/// numbers are only accepted as data in that case.
pub fn decode(line: &str, expects_data: bool) -> Result<Response, MalformedFrame> {
    let line = strip_terminator(line);
    check_ascii(line)?;

    let payload = line.trim();
    if payload.is_empty() {
        return Err(MalformedFrame("empty response".to_string()));
    }

    if payload == "ok" {
        return Ok(Response::Ack);
    }

    if payload.starts_with("err_") {
        let token = payload.split_whitespace().next().unwrap_or(payload);
        return Ok(Response::Error(DeviceError::new(
            ErrorCode::from_token(token),
            payload,
        )));
    }

    let quoted = payload.len() >= 2 && payload.starts_with('"') && payload.ends_with('"');
    let array = payload.starts_with('[') && payload.ends_with(']');
    if quoted || array || expects_data {
        return Ok(Response::Data(payload.to_string()));
    }

    Err(MalformedFrame(format!("unexpected response {payload:?}")))
}

/// Encode a response line, used by device simulators
pub fn encode_response(response: &Response) -> String {
    match response {
        Response::Data(data) => format!("{data}{TERMINATOR}"),
        Response::Ack => format!("ok{TERMINATOR}"),
        Response::Error(err) => format!("{}{TERMINATOR}", err.raw),
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// The greeting line sent by the device on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Authentication disabled
    None,
    /// Nonce to be hashed with the password
    Nonce(String),
}

impl Challenge {
    pub fn parse(line: &str) -> Result<Self, MalformedFrame> {
        let line = strip_terminator(line);
        check_ascii(line)?;

        let line = line.trim();
        if line.is_empty() {
            return Err(MalformedFrame("empty authentication challenge".to_string()));
        }
        if line.contains(NO_KEY) {
            Ok(Challenge::None)
        } else {
            Ok(Challenge::Nonce(line.to_string()))
        }
    }
}

/// Lowercase hex SHA-256 of `nonce ++ password`
pub fn auth_response(nonce: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// The device's answer to an authentication response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReply {
    Accepted,
    Rejected,
}

impl AuthReply {
    pub fn parse(line: &str) -> Result<Self, MalformedFrame> {
        let line = strip_terminator(line).trim();
        if line.contains("err_auth") {
            Ok(AuthReply::Rejected)
        } else if line.contains("OK") || line == "ok" {
            Ok(AuthReply::Accepted)
        } else {
            Err(MalformedFrame(format!("unexpected authentication reply {line:?}")))
        }
    }
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

fn check_ascii(line: &str) -> Result<(), MalformedFrame> {
    if line.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        Ok(())
    } else {
        Err(MalformedFrame(format!("non-ASCII or control characters in {line:?}")))
    }
}
