//! Attribute storage with change detection
//!
//! - `StateCache`: every device's attributes plus the shared change channel
//! - `DeviceCache`: a cheap handle scoped to one device, handed to pollers

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use adcp_api::{AttributeId, AttributeValue, PowerState};

use crate::error::{Result, StateError};
use crate::event::{ChangeEvent, ChangeKind};
use crate::id::DeviceId;
use crate::iter::ChangeStream;
use crate::snapshot::{Observation, Revision, Snapshot, Validity};

// ============================================================================
// DeviceEntries - the attributes of one device
// ============================================================================

/// Capacity of the change queue; events beyond it are dropped
pub const CHANGE_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct DeviceEntries {
    /// Distinguishes a re-added device from the one removed before it
    generation: u64,
    attributes: HashMap<AttributeId, Snapshot>,
    options: HashMap<AttributeId, Vec<String>>,
}

impl DeviceEntries {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            attributes: HashMap::new(),
            options: HashMap::new(),
        }
    }
}

/// Value half of a write
enum NewValue {
    Set(Option<AttributeValue>),
    /// Keep whatever is stored when the write lock is taken
    Retain,
}

// ============================================================================
// StateCache - all devices
// ============================================================================

struct Inner {
    devices: RwLock<HashMap<DeviceId, DeviceEntries>>,
    revision: AtomicU64,
    generation: AtomicU64,
    event_tx: mpsc::Sender<ChangeEvent>,
    stream: ChangeStream,
}

/// Cached attribute state of every device
///
/// Locks are only held for the duration of a map operation and never across
/// an await point. Events are sent after the lock is released.
///
/// # Example
///
/// ```rust,ignore
/// let cache = StateCache::new();
/// let device = cache.device(&DeviceId::from("cinema"));
///
/// device.apply(AttributeId::Input, Observation::Value("\"hdmi1\"".into()))?;
/// assert_eq!(device.value(AttributeId::Input), Some(AttributeValue::Enum("hdmi1".into())));
///
/// while let Some(event) = cache.changes().try_recv() {
///     println!("{} changed on {}", event.attribute, event.device_id);
/// }
/// ```
#[derive(Clone)]
pub struct StateCache {
    inner: Arc<Inner>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::with_capacity(CHANGE_QUEUE_CAPACITY)
    }

    /// Cache whose change queue holds at most `capacity` unread events
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                devices: RwLock::new(HashMap::new()),
                revision: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                event_tx,
                stream: ChangeStream::new(event_rx),
            }),
        }
    }

    /// Register a device and return a handle scoped to it
    ///
    /// Handles of the same registration share its entries. Once the device is
    /// removed its handles stop writing, even if the id is registered again.
    pub fn device(&self, id: &DeviceId) -> DeviceCache {
        let generation = self
            .inner
            .devices
            .write()
            .entry(id.clone())
            .or_insert_with(|| {
                DeviceEntries::new(self.inner.generation.fetch_add(1, Ordering::Relaxed))
            })
            .generation;

        DeviceCache {
            id: id.clone(),
            generation,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Change events of all devices
    ///
    /// Every returned stream reads from the same queue, so each event is
    /// delivered to exactly one of them.
    pub fn changes(&self) -> ChangeStream {
        self.inner.stream.clone()
    }

    /// Drop everything cached for a device, returning whether it existed
    pub fn remove_device(&self, id: &DeviceId) -> bool {
        self.inner.devices.write().remove(id).is_some()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.inner.devices.read().keys().cloned().collect()
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.read().len()
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCache")
            .field("device_count", &self.device_count())
            .field("revision", &self.inner.revision.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// DeviceCache - one device
// ============================================================================

/// Cache view of a single device
#[derive(Clone)]
pub struct DeviceCache {
    id: DeviceId,
    generation: u64,
    inner: Arc<Inner>,
}

impl DeviceCache {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Whether the device this handle was issued for is still registered
    pub fn is_attached(&self) -> bool {
        self.entries(&self.inner.devices.read()).is_some()
    }

    /// Record the outcome of a regular query
    ///
    /// Returns whether an event was emitted. `Unsupported` is ignored here
    /// and an attribute already marked unsupported never changes.
    pub fn apply(&self, attribute: AttributeId, observation: Observation) -> Result<bool> {
        self.update(attribute, observation, false)
    }

    /// Record the outcome of a capability probe
    ///
    /// Same as [`apply`](Self::apply), except that `Unsupported` is stored and
    /// sticks for the lifetime of this cache entry.
    pub fn probe(&self, attribute: AttributeId, observation: Observation) -> Result<bool> {
        self.update(attribute, observation, true)
    }

    /// Store a value implied by a successful setter
    pub fn set(&self, attribute: AttributeId, value: AttributeValue) -> bool {
        self.store(attribute, NewValue::Set(Some(value)), Validity::Valid)
    }

    /// Drop the retained value of an attribute
    pub fn clear(&self, attribute: AttributeId) -> bool {
        let event = {
            let mut devices = self.inner.devices.write();
            let Some(entry) = self
                .entries_mut(&mut devices)
                .and_then(|entries| entries.attributes.get_mut(&attribute))
            else {
                return false;
            };
            if entry.value.is_none() || entry.validity == Validity::Unsupported {
                return false;
            }
            entry.value = None;
            entry.revision = self.next_revision();
            self.event(attribute, ChangeKind::Value, entry)
        };
        self.emit(event);
        true
    }

    pub fn get(&self, attribute: AttributeId) -> Option<Snapshot> {
        self.entries(&self.inner.devices.read())?
            .attributes
            .get(&attribute)
            .cloned()
    }

    /// Last known value, valid or retained
    pub fn value(&self, attribute: AttributeId) -> Option<AttributeValue> {
        self.get(attribute)?.value
    }

    pub fn validity(&self, attribute: AttributeId) -> Option<Validity> {
        self.get(attribute).map(|s| s.validity)
    }

    pub fn is_unsupported(&self, attribute: AttributeId) -> bool {
        self.validity(attribute) == Some(Validity::Unsupported)
    }

    /// Power classification of the last known `power_status`
    pub fn power(&self) -> Option<PowerState> {
        self.value(AttributeId::Power)
            .as_ref()
            .and_then(PowerState::from_value)
    }

    /// Attributes a caller may rely on
    ///
    /// Attributes that need a capability probe are only listed after the
    /// probe has seen them answer. Unsupported attributes are never listed.
    pub fn available(&self) -> Vec<AttributeId> {
        let devices = self.inner.devices.read();
        let attributes = self.entries(&devices).map(|entries| &entries.attributes);

        AttributeId::ALL
            .into_iter()
            .filter(|attr| {
                match attributes.and_then(|attributes| attributes.get(attr)) {
                    Some(snapshot) => snapshot.is_supported(),
                    None => !attr.info().probed,
                }
            })
            .collect()
    }

    /// Replace the option list of a setting, returning whether it changed
    pub fn set_options(&self, attribute: AttributeId, options: Vec<String>) -> bool {
        let event = {
            let mut devices = self.inner.devices.write();
            let Some(entries) = self.entries_mut(&mut devices) else {
                trace!(device = %self.id, %attribute, "device removed, dropping options");
                return false;
            };
            if entries.options.get(&attribute) == Some(&options) {
                return false;
            }

            let validity = entries
                .attributes
                .get(&attribute)
                .map_or(Validity::Valid, |s| s.validity);
            entries.options.insert(attribute, options.clone());
            ChangeEvent::new(
                self.id.clone(),
                attribute,
                ChangeKind::Options,
                Some(AttributeValue::List(options)),
                validity,
                self.next_revision(),
            )
        };
        self.emit(event);
        true
    }

    pub fn options(&self, attribute: AttributeId) -> Option<Vec<String>> {
        self.entries(&self.inner.devices.read())?
            .options
            .get(&attribute)
            .cloned()
    }

    fn update(&self, attribute: AttributeId, observation: Observation, probing: bool) -> Result<bool> {
        if self.is_unsupported(attribute) {
            trace!(device = %self.id, %attribute, "ignoring update of unsupported attribute");
            return Ok(false);
        }

        match observation {
            Observation::Value(raw) => {
                let value = attribute
                    .parse(&raw)
                    .map_err(|_| StateError::UnparseableValue { attribute, raw })?;
                Ok(self.store(attribute, NewValue::Set(Some(value)), Validity::Valid))
            }
            Observation::Unavailable => {
                Ok(self.store(attribute, NewValue::Retain, Validity::Unavailable))
            }
            Observation::Unsupported if probing => {
                debug!(device = %self.id, %attribute, "attribute not supported by this model");
                Ok(self.store(attribute, NewValue::Set(None), Validity::Unsupported))
            }
            Observation::Unsupported => {
                debug!(device = %self.id, %attribute, "unsupported answer outside a probe, ignoring");
                Ok(false)
            }
        }
    }

    /// Write an entry, emitting when value or validity differ
    ///
    /// Valid writes always bump the revision so callers can tell a fresh
    /// answer from a stale one.
    fn store(&self, attribute: AttributeId, value: NewValue, validity: Validity) -> bool {
        let event = {
            let mut devices = self.inner.devices.write();
            let Some(entries) = self.entries_mut(&mut devices) else {
                trace!(device = %self.id, %attribute, "device removed, dropping write");
                return false;
            };
            let attributes = &mut entries.attributes;
            let current = attributes.get(&attribute);

            if current.is_some_and(|c| c.validity == Validity::Unsupported) {
                return false;
            }
            let value = match value {
                NewValue::Set(value) => value,
                NewValue::Retain => current.and_then(|c| c.value.clone()),
            };
            let changed = match current {
                Some(current) => current.value != value || current.validity != validity,
                None => true,
            };
            if !changed && validity != Validity::Valid {
                return false;
            }

            let snapshot = Snapshot {
                value,
                validity,
                revision: self.next_revision(),
            };
            let event = changed.then(|| self.event(attribute, ChangeKind::Value, &snapshot));
            attributes.insert(attribute, snapshot);
            event
        };

        match event {
            Some(event) => {
                self.emit(event);
                true
            }
            None => false,
        }
    }

    fn entries<'a>(&self, devices: &'a HashMap<DeviceId, DeviceEntries>) -> Option<&'a DeviceEntries> {
        devices
            .get(&self.id)
            .filter(|entries| entries.generation == self.generation)
    }

    fn entries_mut<'a>(
        &self,
        devices: &'a mut HashMap<DeviceId, DeviceEntries>,
    ) -> Option<&'a mut DeviceEntries> {
        devices
            .get_mut(&self.id)
            .filter(|entries| entries.generation == self.generation)
    }

    fn next_revision(&self) -> Revision {
        Revision::new(self.inner.revision.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn event(&self, attribute: AttributeId, kind: ChangeKind, snapshot: &Snapshot) -> ChangeEvent {
        ChangeEvent::new(
            self.id.clone(),
            attribute,
            kind,
            snapshot.value.clone(),
            snapshot.validity,
            snapshot.revision,
        )
    }

    fn emit(&self, event: ChangeEvent) {
        trace!(device = %event.device_id, attribute = %event.attribute, "change");
        // The receiver lives in `Inner`, so the channel cannot be closed here
        if let Err(mpsc::error::TrySendError::Full(event)) = self.inner.event_tx.try_send(event) {
            debug!(
                device = %event.device_id,
                attribute = %event.attribute,
                "change queue full, dropping event"
            );
        }
    }
}

impl std::fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCache").field("id", &self.id).finish()
    }
}
