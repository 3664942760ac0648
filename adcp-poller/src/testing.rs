//! In-process projector for timer-driven tests
//!
//! Paused-clock tests cannot use real sockets, so this fake answers
//! commands from a table and records when each frame was sent.

use std::collections::HashMap;
use std::time::Duration;

use adcp_api::{CommandExecutor, DeviceError, ErrorCode, Reply, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Default)]
pub(crate) struct FakeProjector {
    answers: Mutex<HashMap<String, Result<Reply, SessionError>>>,
    sent: Mutex<Vec<(Instant, String)>>,
    latency: Mutex<Duration>,
}

impl FakeProjector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `<query> ?` with `raw`
    pub(crate) fn answer(&self, query: &str, raw: &str) {
        self.answers
            .lock()
            .insert(format!("{query} ?"), Ok(Reply::Data(raw.to_string())));
    }

    /// Reject `<query> ?` with an `err_*` token
    pub(crate) fn reject(&self, query: &str, token: &str) {
        let err = DeviceError::new(ErrorCode::from_token(token), token);
        self.answers
            .lock()
            .insert(format!("{query} ?"), Err(SessionError::CommandRejected(err)));
    }

    /// Fail `<query> ?` as if the connection dropped
    pub(crate) fn disconnect(&self, query: &str) {
        self.answers.lock().insert(
            format!("{query} ?"),
            Err(SessionError::Disconnected("connection reset".to_string())),
        );
    }

    /// Wait `latency` before every answer
    pub(crate) fn delay(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, frame)| frame.clone()).collect()
    }

    /// Send times of every frame matching `frame`
    pub(crate) fn sent_at(&self, frame: &str) -> Vec<Instant> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, sent)| sent == frame)
            .map(|(at, _)| *at)
            .collect()
    }

    pub(crate) fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl CommandExecutor for FakeProjector {
    async fn execute_command(&self, opcode: &str, param: Option<&str>) -> Result<Reply, SessionError> {
        let frame = match param {
            Some(param) => format!("{opcode} {param}"),
            None => opcode.to_string(),
        };
        self.sent.lock().push((Instant::now(), frame.clone()));

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.answers.lock().get(&frame) {
            Some(answer) => answer.clone(),
            None if frame.ends_with('?') => Err(SessionError::CommandRejected(DeviceError::new(
                ErrorCode::UnknownCommand,
                "err_cmd",
            ))),
            None => Ok(Reply::Ack),
        }
    }
}
