//! Polling of ADCP projector state
//!
//! ADCP has no push notifications, so attribute changes made with the
//! projector's own remote are only noticed by asking. This crate keeps a
//! device's [`DeviceCache`](adcp_state::DeviceCache) current with three poll
//! kinds:
//!
//! - **Attributes**: power, input, picture muting and signal (default 20 s)
//! - **Health**: light source hours, temperature, warnings and errors
//!   (default 30 min, skipped while the projector is off)
//! - **Options**: picture settings and their selectable values (on demand)
//!
//! A power on/off flip seen by the attribute poll pulls the health poll
//! forward, and a switch to on also refreshes the settings.

pub mod config;
pub mod error;
pub mod poll;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use config::{PollerConfig, MIN_INTERVAL};
pub use error::{PollerError, PollerResult};
pub use poll::{PollKind, PollReport};
pub use scheduler::{PollScheduler, PollingTaskStats, SchedulerStats};
