//! Poll intervals
//!
//! An interval of zero disables the periodic task for that kind. The kind
//! can still be run on demand through a trigger.

use std::time::Duration;

use crate::error::{PollerError, PollerResult};
use crate::PollKind;

/// Shortest accepted non-zero interval
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Power, input, picture muting and signal
    /// Default: 20 seconds
    pub attributes_interval: Duration,

    /// Light source timer, temperature, warnings and errors
    /// Default: 1800 seconds (30 minutes)
    pub health_interval: Duration,

    /// Picture settings and their selectable options
    /// Default: 0 (on demand only)
    pub options_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            attributes_interval: Duration::from_secs(20),
            health_interval: Duration::from_secs(1800), // 30 minutes
            options_interval: Duration::ZERO,
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// For controllers that poll on their own schedule or run on battery:
    /// no fast polling, health stays on
    pub fn low_power() -> Self {
        Self {
            attributes_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Short intervals for dashboards and tests
    pub fn aggressive() -> Self {
        Self {
            attributes_interval: Duration::from_secs(2),
            health_interval: Duration::from_secs(60),
            options_interval: Duration::from_secs(300),
        }
    }

    /// Periodic interval of a poll kind
    pub fn interval(&self, kind: PollKind) -> Duration {
        match kind {
            PollKind::Attributes => self.attributes_interval,
            PollKind::Health => self.health_interval,
            PollKind::Options => self.options_interval,
        }
    }

    pub fn is_enabled(&self, kind: PollKind) -> bool {
        !self.interval(kind).is_zero()
    }

    pub fn validate(&self) -> PollerResult<()> {
        for kind in PollKind::ALL {
            let interval = self.interval(kind);
            if !interval.is_zero() && interval < MIN_INTERVAL {
                return Err(PollerError::Configuration(format!(
                    "{kind} interval must be 0 or at least {MIN_INTERVAL:?}, got {interval:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn with_attributes_interval(mut self, interval: Duration) -> Self {
        self.attributes_interval = interval;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_options_interval(mut self, interval: Duration) -> Self {
        self.options_interval = interval;
        self
    }
}
