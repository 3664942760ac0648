//! Attribute state of ADCP projectors
//!
//! Keeps the last known value of every attribute of every device, tracks
//! whether that value is current, and reports changes.
//!
//! # Features
//!
//! - **Change detection**: events are emitted only when a value, its
//!   validity or a setting's option list actually changes
//! - **Retained values**: an attribute that becomes unavailable keeps its
//!   last valid value
//! - **Capability probing**: attributes the model does not implement are
//!   marked unsupported once and never listed as available
//!
//! # Quick Start
//!
//! ```rust
//! use adcp_api::{AttributeId, AttributeValue};
//! use adcp_state::{DeviceId, Observation, StateCache, Validity};
//!
//! let cache = StateCache::new();
//! let device = cache.device(&DeviceId::from("cinema"));
//!
//! device.apply(AttributeId::Input, Observation::Value("\"hdmi1\"".into())).unwrap();
//! device.apply(AttributeId::Input, Observation::Unavailable).unwrap();
//!
//! let snapshot = device.get(AttributeId::Input).unwrap();
//! assert_eq!(snapshot.validity, Validity::Unavailable);
//! assert_eq!(snapshot.value, Some(AttributeValue::Enum("hdmi1".into())));
//! assert_eq!(cache.changes().try_iter().count(), 2);
//! ```

mod cache;
mod error;
mod event;
mod id;
mod iter;
mod snapshot;

pub use cache::{DeviceCache, StateCache, CHANGE_QUEUE_CAPACITY};
pub use error::{Result, StateError};
pub use event::{ChangeEvent, ChangeKind};
pub use id::DeviceId;
pub use iter::{ChangeStream, TryIter};
pub use snapshot::{Observation, Revision, Snapshot, Validity};
