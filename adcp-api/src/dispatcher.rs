//! Execution of invocations against a session
//!
//! An [`Invocation`] names one command or a comma separated sequence and may
//! ask for repeats or a press-and-hold. The protocol has no hold primitive,
//! so a hold re-sends the command at a fixed cadence until the hold time has
//! elapsed. Repeats and holds park on a timer raced against a
//! [`CancellationToken`]; cancellation stops further sends and is reported as
//! an outcome, not an error.

use std::sync::Arc;
use std::time::Duration;

use adcp_client::codec::{quote, unquote};
use adcp_client::{CommandExecutor, Reply};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{self, CommandDescriptor, ParamRule};
use crate::error::{ApiError, Result};

/// Default pause between sends while holding
pub const DEFAULT_HOLD_INTERVAL: Duration = Duration::from_millis(200);

/// A request to run one or more commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub commands: Vec<String>,
    /// Number of rounds; the delay is only used between rounds
    pub repeat_count: u32,
    pub repeat_delay: Duration,
    pub hold_duration: Option<Duration>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self::sequence([command])
    }

    pub fn sequence<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            repeat_count: 1,
            repeat_delay: Duration::ZERO,
            hold_duration: None,
        }
    }

    /// Split a comma separated command list
    pub fn parse(spec: &str) -> Self {
        Self::sequence(
            spec.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty()),
        )
    }

    pub fn with_repeat(mut self, count: u32, delay: Duration) -> Self {
        self.repeat_count = count;
        self.repeat_delay = delay;
        self
    }

    pub fn with_hold(mut self, duration: Duration) -> Self {
        self.hold_duration = (!duration.is_zero()).then_some(duration);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.commands.is_empty() {
            return Err(ApiError::InvalidInvocation("no commands given".to_string()));
        }
        if self.repeat_count == 0 {
            return Err(ApiError::InvalidInvocation("repeat count must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub hold_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            hold_interval: DEFAULT_HOLD_INTERVAL,
        }
    }
}

/// A command that reached the device and was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub descriptor: &'static CommandDescriptor,
    /// Parameter as sent on the wire
    pub param: Option<String>,
    pub reply: Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Canceled,
}

/// Result of a successful or canceled invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: Outcome,
    pub executed: Vec<Executed>,
}

impl DispatchReport {
    pub fn is_canceled(&self) -> bool {
        self.outcome == Outcome::Canceled
    }

    pub fn frames_sent(&self) -> usize {
        self.executed.len()
    }
}

/// Failure of one element of an invocation
#[derive(Debug, Clone, Error)]
#[error("Command {index} ({id}) failed: {source}")]
pub struct DispatchError {
    /// Position of the failing command in the sequence
    pub index: usize,
    pub id: String,
    #[source]
    pub source: ApiError,
    /// Commands accepted before the failure
    pub completed: Vec<Executed>,
}

impl DispatchError {
    fn new(index: usize, id: impl Into<String>, source: ApiError, completed: Vec<Executed>) -> Self {
        Self {
            index,
            id: id.into(),
            source,
            completed,
        }
    }

    /// The device's text for rejections, otherwise the error description
    pub fn user_message(&self) -> String {
        self.source.user_message()
    }
}

/// Runs invocations through a command executor
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn CommandExecutor>,
    config: DispatcherConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("config", &self.config).finish()
    }
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_config(executor, DispatcherConfig::default())
    }

    pub fn with_config(executor: Arc<dyn CommandExecutor>, config: DispatcherConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    /// Run an invocation until it completes, fails or is canceled
    ///
    /// Every id is resolved before the first frame is sent, so an unknown id
    /// never reaches the wire. The first failing element aborts the rest.
    pub async fn invoke(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> std::result::Result<DispatchReport, DispatchError> {
        invocation
            .validate()
            .map_err(|err| DispatchError::new(0, "", err, Vec::new()))?;

        let mut resolved = Vec::with_capacity(invocation.commands.len());
        for (index, id) in invocation.commands.iter().enumerate() {
            let descriptor =
                command::resolve(id).map_err(|err| DispatchError::new(index, id.as_str(), err, Vec::new()))?;
            resolved.push(descriptor);
        }

        let mut executed = Vec::new();
        for round in 0..invocation.repeat_count {
            if round > 0 && !invocation.repeat_delay.is_zero() && !self.pause(invocation.repeat_delay, cancel).await {
                return Ok(canceled(executed));
            }

            for (index, descriptor) in resolved.iter().copied().enumerate() {
                let step = match invocation.hold_duration {
                    Some(hold) => self.hold(descriptor, hold, cancel, &mut executed).await,
                    None => self.send_once(descriptor, cancel, &mut executed).await,
                };
                match step {
                    Ok(true) => {}
                    Ok(false) => return Ok(canceled(executed)),
                    Err(err) => {
                        warn!("Command {} ({}) failed: {}", index, descriptor.id, err);
                        return Err(DispatchError::new(index, descriptor.id, err, executed));
                    }
                }
            }
        }

        Ok(DispatchReport {
            outcome: Outcome::Completed,
            executed,
        })
    }

    /// Execute a single resolved command
    pub async fn run(&self, descriptor: &'static CommandDescriptor) -> Result<Executed> {
        let param = match descriptor.param {
            ParamRule::Toggle { on, off } if !descriptor.is_query() => {
                let current = self.executor.query(descriptor.opcode).await?;
                let next = if unquote(&current) == on { off } else { on };
                debug!("Toggling {} from {} to {}", descriptor.opcode, unquote(&current), next);
                Some(quote(next))
            }
            _ => descriptor.encode_param(),
        };

        let reply = self
            .executor
            .execute_command(descriptor.opcode, param.as_deref())
            .await?;

        Ok(Executed {
            descriptor,
            param,
            reply,
        })
    }

    async fn send_once(
        &self,
        descriptor: &'static CommandDescriptor,
        cancel: &CancellationToken,
        executed: &mut Vec<Executed>,
    ) -> Result<bool> {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        executed.push(self.run(descriptor).await?);
        Ok(true)
    }

    async fn hold(
        &self,
        descriptor: &'static CommandDescriptor,
        duration: Duration,
        cancel: &CancellationToken,
        executed: &mut Vec<Executed>,
    ) -> Result<bool> {
        let deadline = Instant::now() + duration;
        loop {
            if !self.send_once(descriptor, cancel, executed).await? {
                return Ok(false);
            }

            let next = Instant::now() + self.config.hold_interval;
            if next >= deadline {
                return Ok(true);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep_until(next) => {}
            }
        }
    }

    /// Sleep unless canceled first; returns false when canceled
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

fn canceled(executed: Vec<Executed>) -> DispatchReport {
    debug!("Invocation canceled after {} command(s)", executed.len());
    DispatchReport {
        outcome: Outcome::Canceled,
        executed,
    }
}
