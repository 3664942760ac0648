//! Change notifications
//!
//! Every cache update that alters a value, a validity flag or an option list
//! emits one `ChangeEvent` carrying the new state.

use std::time::Instant;

use adcp_api::{AttributeId, AttributeValue};

use crate::id::DeviceId;
use crate::snapshot::{Revision, Validity};

/// What part of an attribute changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The value or its validity
    Value,
    /// The list of selectable options of a setting
    Options,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub device_id: DeviceId,
    pub attribute: AttributeId,
    pub kind: ChangeKind,
    /// New value; for [`ChangeKind::Options`] the option list
    pub value: Option<AttributeValue>,
    pub validity: Validity,
    pub revision: Revision,
    /// When the change was detected
    pub timestamp: Instant,
}

impl ChangeEvent {
    pub fn new(
        device_id: DeviceId,
        attribute: AttributeId,
        kind: ChangeKind,
        value: Option<AttributeValue>,
        validity: Validity,
        revision: Revision,
    ) -> Self {
        Self {
            device_id,
            attribute,
            kind,
            value,
            validity,
            revision,
            timestamp: Instant::now(),
        }
    }
}

impl PartialEq for ChangeEvent {
    fn eq(&self, other: &Self) -> bool {
        // Timestamp not included in equality
        self.device_id == other.device_id
            && self.attribute == other.attribute
            && self.kind == other.kind
            && self.value == other.value
            && self.validity == other.validity
            && self.revision == other.revision
    }
}
