//! DeviceRegistry - Main entry point for the SDK
//!
//! Holds every configured projector and routes controller requests to it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use adcp_api::{AttributeId, DispatchReport, Invocation, SelectAction};
use adcp_state::{ChangeStream, DeviceId, Snapshot, StateCache};

use crate::config::{ConfigSource, DeviceConfig};
use crate::device::{Device, DeviceStatus};
use crate::error::{Result, SdkError};

/// Registry of projectors sharing one state cache
///
/// Devices start their connection lifecycle as soon as they are added, so
/// the registry must be used from inside a Tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// use adcp_sdk::{DeviceConfig, DeviceRegistry, Invocation};
///
/// let registry = DeviceRegistry::new();
/// registry.add_device(DeviceConfig::new("cinema", "192.168.1.40"))?;
///
/// registry.invoke(&"cinema".into(), &Invocation::new("POWER_ON")).await?;
///
/// let changes = registry.changes();
/// while let Some(event) = changes.recv().await {
///     println!("{} {} -> {:?}", event.device_id, event.attribute, event.value);
/// }
/// ```
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
    cache: StateCache,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            cache: StateCache::new(),
        }
    }

    /// Build a registry from every device a source knows
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let registry = Self::new();
        registry.load(source)?;
        Ok(registry)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Register a projector and start connecting to it
    pub fn add_device(&self, config: DeviceConfig) -> Result<Arc<Device>> {
        config.validate()?;
        let id = config.id.clone();

        let device = {
            let mut devices = self.devices.write();
            if devices.contains_key(&id) {
                return Err(SdkError::DuplicateDevice(id));
            }
            let device = Arc::new(Device::new(config, self.cache.device(&id))?);
            devices.insert(id.clone(), Arc::clone(&device));
            device
        };

        info!(device = %id, name = device.name(), "device added");
        device.start();
        Ok(device)
    }

    /// Add every device of `source`, returning their ids
    pub fn load(&self, source: &dyn ConfigSource) -> Result<Vec<DeviceId>> {
        let configs = source.load()?;
        let mut added = Vec::with_capacity(configs.len());
        for config in configs {
            added.push(self.add_device(config)?.id().clone());
        }
        Ok(added)
    }

    /// Write the current device list to `source`
    pub fn save(&self, source: &dyn ConfigSource) -> Result<()> {
        let mut configs: Vec<DeviceConfig> = self
            .devices
            .read()
            .values()
            .map(|device| device.config().clone())
            .collect();
        configs.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        source.save(&configs)
    }

    /// Stop a projector and forget its cached state
    ///
    /// Cached state is dropped before the device stops, so work still in
    /// flight for it can no longer write, even when the id is added again.
    pub async fn remove_device(&self, id: &DeviceId) -> Result<()> {
        let device = {
            let mut devices = self.devices.write();
            let device = devices
                .remove(id)
                .ok_or_else(|| SdkError::DeviceNotFound(id.clone()))?;
            self.cache.remove_device(id);
            device
        };

        let result = device.stop().await;
        info!(device = %id, "device removed");
        result
    }

    /// Replace the configuration of a registered projector
    ///
    /// The device is stopped and started again with the new settings.
    pub async fn reconfigure(&self, config: DeviceConfig) -> Result<Arc<Device>> {
        config.validate()?;
        self.remove_device(&config.id).await?;
        self.add_device(config)
    }

    pub fn device(&self, id: &DeviceId) -> Result<Arc<Device>> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SdkError::DeviceNotFound(id.clone()))
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.read().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    fn all(&self) -> Vec<Arc<Device>> {
        self.devices.read().values().cloned().collect()
    }

    /// Wait for the lifecycle of `id` to come online or give up
    pub async fn wait_ready(&self, id: &DeviceId) -> Result<DeviceStatus> {
        Ok(self.device(id)?.wait_ready().await)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn invoke(&self, id: &DeviceId, invocation: &Invocation) -> Result<DispatchReport> {
        self.device(id)?.invoke(invocation).await
    }

    pub async fn select(
        &self,
        id: &DeviceId,
        setting: AttributeId,
        action: &SelectAction,
    ) -> Result<Option<String>> {
        self.device(id)?.select(setting, action).await
    }

    pub async fn save_picture_position(&self, id: &DeviceId, action: &SelectAction) -> Result<Option<String>> {
        self.device(id)?.save_picture_position(action).await
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Cached snapshot of one attribute; `None` until first observed
    pub fn get_attribute(&self, id: &DeviceId, attribute: AttributeId) -> Result<Option<Snapshot>> {
        Ok(self.device(id)?.get_attribute(attribute))
    }

    /// Attributes a controller may offer for `id`
    pub fn list_available_attributes(&self, id: &DeviceId) -> Result<Vec<AttributeId>> {
        Ok(self.device(id)?.available_attributes())
    }

    pub fn options(&self, id: &DeviceId, setting: AttributeId) -> Result<Option<Vec<String>>> {
        Ok(self.device(id)?.options(setting))
    }

    /// Change events of every device
    pub fn changes(&self) -> ChangeStream {
        self.cache.changes()
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    // ========================================================================
    // Power management of the host
    // ========================================================================

    /// Pause polling of every device
    pub fn standby(&self) {
        for device in self.all() {
            device.standby();
        }
    }

    /// Resume polling of every device and refresh it
    pub fn wake(&self) {
        for device in self.all() {
            device.wake();
        }
    }

    /// Pause polling, cancel invocations and close every connection
    pub async fn disconnect_all(&self) {
        for device in self.all() {
            device.disconnect().await;
        }
    }

    /// Reconnect every device and resume polling
    ///
    /// Every device is tried; the first failure is returned.
    pub async fn connect_all(&self) -> Result<()> {
        let mut first_error = None;
        for device in self.all() {
            if let Err(err) = device.connect().await {
                warn!(device = %device.id(), error = %err, "reconnect failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every device
    pub async fn shutdown(&self) {
        let devices: Vec<Arc<Device>> = self.devices.write().drain().map(|(_, device)| device).collect();
        for device in devices {
            if let Err(err) = device.stop().await {
                warn!(device = %device.id(), error = %err, "device did not stop cleanly");
            }
            self.cache.remove_device(device.id());
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        for device in self.devices.get_mut().values() {
            device.abort();
        }
    }
}
