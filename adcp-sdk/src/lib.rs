//! # ADCP SDK - control and state sync for Sony projectors
//!
//! Registers projectors by address, keeps one authenticated ADCP session per
//! device, runs named commands and publishes attribute changes:
//!
//! ```rust,no_run
//! use adcp_sdk::{AttributeId, DeviceConfig, DeviceRegistry, Invocation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), adcp_sdk::SdkError> {
//!     adcp_sdk::logging::init_logging_from_env().ok();
//!
//!     let registry = DeviceRegistry::new();
//!     let cinema = registry.add_device(DeviceConfig::new("cinema", "192.168.1.40"))?;
//!     cinema.wait_ready().await;
//!
//!     registry.invoke(cinema.id(), &Invocation::parse("POWER_ON")).await?;
//!     println!("power: {:?}", registry.get_attribute(cinema.id(), AttributeId::Power)?);
//!
//!     let changes = registry.changes();
//!     while let Some(event) = changes.recv().await {
//!         println!("{} {} -> {:?}", event.device_id, event.attribute, event.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! adcp-sdk     (registry, device lifecycle, configuration)
//!     ↓
//! adcp-poller  (fast, health and option polling)
//!     ↓
//! adcp-state   (attribute cache and change events)
//!     ↓
//! adcp-api     (command catalogue, attributes, dispatcher)
//!     ↓
//! adcp-client  (framing, authentication, session)
//! ```

mod config;
mod device;
mod error;
mod registry;

pub mod logging;

pub use config::{
    ConfigSource, DeviceConfig, JsonFileSource, PollIntervals, Timeouts, DEFAULT_SDAP_PORT,
};
pub use device::{Device, DeviceStatus, RECONNECT_DELAY};
pub use error::{Result, SdkError, StatusCode};
pub use registry::DeviceRegistry;

pub use adcp_api::{
    AttributeId, AttributeValue, DispatchReport, Invocation, Outcome, PowerState, SelectAction,
};
pub use adcp_client::{SessionError, SessionStats, DEFAULT_ADCP_PORT, DEFAULT_PASSWORD};
pub use adcp_poller::{PollKind, SchedulerStats};
pub use adcp_state::{ChangeEvent, ChangeKind, ChangeStream, DeviceId, Snapshot, Validity};
