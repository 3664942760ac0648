//! One configured projector
//!
//! A [`Device`] ties together the session, the dispatcher, the cache view
//! and the poll scheduler of a projector, and runs its connection lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use adcp_api::{
    resolve_option, ApiError, AttributeId, AttributeValue, CommandExecutor, DispatchReport,
    Dispatcher, Executed, Invocation, SelectAction,
};
use adcp_client::codec::{quote, unquote};
use adcp_client::{Session, SessionError, SessionStats};
use adcp_poller::poll::query_options;
use adcp_poller::{PollKind, PollScheduler, SchedulerStats};
use adcp_state::{DeviceCache, DeviceId, Observation, Snapshot};

use crate::config::DeviceConfig;
use crate::error::{Result, SdkError};

/// Pause between connection attempts of the lifecycle task
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Opcode that stores the current picture position under a name
const PICTURE_POSITION_SAVE: &str = "pic_pos_save";

/// Where a device is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Waiting for the first successful connection
    Connecting,
    /// Identity read, capabilities probed and polling set up
    Online,
    /// The projector rejected the password; nothing is retried
    AuthFailed,
    /// Removed from the registry
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectMode {
    Set,
    SavePosition,
}

pub struct Device {
    config: DeviceConfig,
    session: Arc<Session>,
    dispatcher: Dispatcher,
    cache: DeviceCache,
    scheduler: PollScheduler,
    /// Token of the invocation currently running
    active: Mutex<CancellationToken>,
    stopped: CancellationToken,
    sleeping: AtomicBool,
    status: watch::Sender<DeviceStatus>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    pub(crate) fn new(config: DeviceConfig, cache: DeviceCache) -> Result<Self> {
        config.validate()?;

        let session = Arc::new(Session::new(config.session_config()));
        let executor: Arc<dyn CommandExecutor> = session.clone();
        let scheduler = PollScheduler::new(Arc::clone(&executor), cache.clone(), config.poller_config())?;
        let stopped = CancellationToken::new();

        Ok(Self {
            dispatcher: Dispatcher::new(executor),
            session,
            cache,
            scheduler,
            active: Mutex::new(stopped.child_token()),
            stopped,
            sleeping: AtomicBool::new(false),
            status: watch::channel(DeviceStatus::Connecting).0,
            lifecycle: Mutex::new(None),
            config,
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        self.config.display_name()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.borrow()
    }

    /// Wait until the lifecycle task leaves [`DeviceStatus::Connecting`]
    pub async fn wait_ready(&self) -> DeviceStatus {
        let mut status = self.status.subscribe();
        let ready = match status.wait_for(|s| *s != DeviceStatus::Connecting).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        ready
    }

    pub fn session_stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn poll_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub(crate) fn start(self: &Arc<Self>) {
        let device = Arc::clone(self);
        let handle = tokio::spawn(async move { device.run_lifecycle().await });
        if let Some(previous) = self.lifecycle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Connect, read identity, probe, refresh, then poll
    async fn run_lifecycle(self: Arc<Self>) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.session.connect().await {
                Ok(()) => break,
                Err(err @ SessionError::AuthFailed { .. }) => {
                    error!(device = %self.id(), error = %err, "giving up on device");
                    self.status.send_replace(DeviceStatus::AuthFailed);
                    return;
                }
                Err(err) => {
                    warn!(
                        device = %self.id(),
                        attempt,
                        error = %err,
                        "connection failed, retrying in {:?}",
                        RECONNECT_DELAY
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = self.stopped.cancelled() => return,
                    }
                }
            }
        }

        self.scheduler.read_identity().await;
        if let Some(model) = self.cache.value(AttributeId::ModelName) {
            info!(device = %self.id(), %model, "connected");
        }
        self.scheduler.probe().await;
        self.scheduler.refresh().await;

        if !self.sleeping.load(Ordering::Relaxed) {
            self.scheduler.start();
        }
        self.status.send_replace(DeviceStatus::Online);
    }

    /// Cancel everything and close the connection
    pub(crate) async fn stop(&self) -> Result<()> {
        self.abort();
        let result = self.scheduler.shutdown().await;
        self.session.disconnect().await;
        self.status.send_replace(DeviceStatus::Stopped);
        debug!(device = %self.id(), "device stopped");
        Ok(result?)
    }

    /// Synchronous part of [`stop`](Self::stop)
    pub(crate) fn abort(&self) {
        self.stopped.cancel();
        self.active.lock().cancel();
        if let Some(handle) = self.lifecycle.lock().take() {
            handle.abort();
        }
    }

    /// Stop polling until [`wake`](Self::wake)
    pub fn standby(&self) {
        self.sleeping.store(true, Ordering::Relaxed);
        self.scheduler.suspend();
    }

    /// Resume polling and refresh the fast attributes
    pub fn wake(&self) {
        self.sleeping.store(false, Ordering::Relaxed);
        if self.status() == DeviceStatus::Online {
            self.scheduler.resume();
            self.scheduler.trigger(PollKind::Attributes);
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await?;
        self.wake();
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.standby();
        self.active.lock().cancel();
        self.session.disconnect().await;
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run an invocation, canceling the one still running
    pub async fn invoke(&self, invocation: &Invocation) -> Result<DispatchReport> {
        let token = self.begin_invocation();
        let result = self.dispatcher.invoke(invocation, &token).await;

        let executed = match &result {
            Ok(report) => &report.executed,
            Err(err) => &err.completed,
        };
        self.apply_effects(executed);

        result.map_err(|err| {
            warn!(device = %self.id(), index = err.index, command = %err.id, "command failed: {}", err.user_message());
            SdkError::from(err)
        })
    }

    fn begin_invocation(&self) -> CancellationToken {
        let token = self.stopped.child_token();
        let previous = std::mem::replace(&mut *self.active.lock(), token.clone());
        previous.cancel();
        token
    }

    /// Record what accepted setters imply and schedule follow-up polls
    fn apply_effects(&self, executed: &[Executed]) {
        if self.stopped.is_cancelled() {
            debug!(device = %self.id(), steps = executed.len(), "device stopped, discarding effects");
            return;
        }
        let mut power = false;
        let mut input = false;
        let mut muting = false;

        for step in executed {
            power |= step.descriptor.id.starts_with("POWER_");
            let (Some(attribute), Some(param)) = (step.descriptor.effect, step.param.as_deref()) else {
                continue;
            };
            input |= attribute == AttributeId::Input;
            muting |= attribute == AttributeId::Muted;

            if let Err(err) = self.cache.apply(attribute, effect_observation(attribute, param)) {
                debug!(device = %self.id(), error = %err, "effect not recorded");
            }
        }

        if power {
            self.scheduler.power_changed();
        } else if input || muting {
            self.scheduler.trigger(PollKind::Attributes);
        }
        if input {
            self.scheduler.trigger(PollKind::Options);
        }
    }

    /// Pick and send a value of a setting
    ///
    /// Returns the option sent, or `None` when the action left the setting
    /// unchanged.
    pub async fn select(&self, setting: AttributeId, action: &SelectAction) -> Result<Option<String>> {
        self.select_with(setting, action, SelectMode::Set).await
    }

    /// Save the current picture position under one of its preset names
    pub async fn save_picture_position(&self, action: &SelectAction) -> Result<Option<String>> {
        self.select_with(AttributeId::PicturePosition, action, SelectMode::SavePosition)
            .await
    }

    async fn select_with(
        &self,
        setting: AttributeId,
        action: &SelectAction,
        mode: SelectMode,
    ) -> Result<Option<String>> {
        if self.stopped.is_cancelled() {
            return Err(SdkError::DeviceNotFound(self.id().clone()));
        }
        if !setting.has_options() {
            return Err(ApiError::InvalidInvocation(format!("{setting} has no selectable options")).into());
        }
        if self.cache.is_unsupported(setting) {
            return Err(SdkError::Unsupported {
                device: self.id().clone(),
                attribute: setting,
            });
        }

        let options = match self.cache.options(setting) {
            Some(options) => options,
            None => self.fetch_options(setting).await?,
        };
        let current = self.cache.value(setting);
        let current = current.as_ref().and_then(AttributeValue::as_str);

        let Some(option) = resolve_option(setting, &options, current, action)? else {
            debug!(device = %self.id(), %setting, ?action, "selection unchanged");
            return Ok(None);
        };

        let (opcode, param) = match mode {
            SelectMode::Set => (setting.opcode(), quote(&option)),
            SelectMode::SavePosition => (PICTURE_POSITION_SAVE, format!("--{option}")),
        };
        if let Err(err) = self.session.send(opcode, Some(param.as_str())).await {
            warn!(device = %self.id(), %setting, %option, error = %err, "select failed");
            return Err(err.into());
        }

        if mode == SelectMode::Set {
            if let Err(err) = self.cache.apply(setting, Observation::Value(param)) {
                debug!(device = %self.id(), error = %err, "selection not recorded");
            }
        }
        Ok(Some(option))
    }

    async fn fetch_options(&self, setting: AttributeId) -> Result<Vec<String>> {
        let options = query_options(self.session.as_ref(), setting)
            .await?
            .ok_or_else(|| ApiError::InvalidValue {
                attribute: setting.key(),
                raw: "no option list".to_string(),
            })?;
        self.cache.set_options(setting, options.clone());
        Ok(options)
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn get_attribute(&self, attribute: AttributeId) -> Option<Snapshot> {
        self.cache.get(attribute)
    }

    pub fn available_attributes(&self) -> Vec<AttributeId> {
        self.cache.available()
    }

    pub fn options(&self, setting: AttributeId) -> Option<Vec<String>> {
        self.cache.options(setting)
    }

    /// Poll `kind` now and wait for it
    pub async fn refresh(&self, kind: PollKind) {
        self.scheduler.poll_now(kind).await;
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", self.id())
            .field("addr", &self.session.config().addr())
            .field("status", &self.status())
            .finish()
    }
}

/// Cached value implied by an accepted setter
///
/// A projector switched off reports `standby`, never `off`.
fn effect_observation(attribute: AttributeId, param: &str) -> Observation {
    match (attribute, unquote(param)) {
        (AttributeId::Power, "off") => Observation::Value(quote("standby")),
        _ => Observation::Value(param.to_string()),
    }
}
