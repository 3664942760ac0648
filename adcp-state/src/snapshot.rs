//! Cached state of a single attribute

use adcp_api::{AttributeValue, SessionError};

/// Whether the cached value reflects the device right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    /// The device cannot answer at the moment, e.g. it is off or has no signal.
    /// The last valid value is kept.
    Unavailable,
    /// The model does not implement the attribute
    Unsupported,
}

/// Monotonic update counter, shared by all devices of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub value: Option<AttributeValue>,
    pub validity: Validity,
    pub revision: Revision,
}

impl Snapshot {
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn is_supported(&self) -> bool {
        self.validity != Validity::Unsupported
    }

    /// The value, only while it is current
    pub fn current(&self) -> Option<&AttributeValue> {
        self.value.as_ref().filter(|_| self.is_valid())
    }
}

/// Result of querying an attribute, as fed into the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Raw answer of the query
    Value(String),
    Unavailable,
    Unsupported,
}

impl Observation {
    /// Classify a failed query
    ///
    /// `err_inactive` means unavailable, `err_cmd` and `err_option` mean the
    /// model lacks the attribute. Everything else says nothing about the
    /// attribute and yields `None`.
    pub fn from_error(err: &SessionError) -> Option<Self> {
        let device = err.device_error()?;
        if device.code.is_inactive() {
            Some(Observation::Unavailable)
        } else if device.code.is_unsupported() {
            Some(Observation::Unsupported)
        } else {
            None
        }
    }
}
