//! Private ADCP client for Sony projector communication
//!
//! This crate provides the wire codec for the ADCP line protocol and a TCP
//! session that authenticates with the projector and serializes commands.
//! Higher layers talk to a session through the [`CommandExecutor`] trait so
//! that they can be exercised without a socket.

pub mod codec;
mod error;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use codec::{CommandFrame, DeviceError, ErrorCode, MalformedFrame, Response};
pub use error::{Result, SessionError};
pub use session::{Reply, Session, SessionConfig, SessionStats, DEFAULT_ADCP_PORT, DEFAULT_PASSWORD};

use async_trait::async_trait;

/// Anything that can run a single ADCP command and return its reply
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Send `<opcode>[ <param>]` and wait for the decoded reply
    async fn execute_command(&self, opcode: &str, param: Option<&str>) -> Result<Reply>;

    /// Send `<opcode> ?` and return the raw payload
    async fn query(&self, opcode: &str) -> Result<String> {
        match self
            .execute_command(opcode, Some(codec::QUERY_PARAM))
            .await?
        {
            Reply::Data(data) => Ok(data),
            Reply::Ack => Err(SessionError::MalformedFrame(MalformedFrame(format!(
                "query \"{opcode} ?\" was acknowledged without data"
            )))),
        }
    }
}

#[async_trait]
impl CommandExecutor for Session {
    async fn execute_command(&self, opcode: &str, param: Option<&str>) -> Result<Reply> {
        self.send(opcode, param).await
    }
}
