//! Device configuration
//!
//! Durations are stored as whole seconds so that configuration files stay
//! readable. Missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use adcp_client::{SessionConfig, DEFAULT_ADCP_PORT, DEFAULT_PASSWORD};
use adcp_poller::PollerConfig;
use adcp_state::DeviceId;

use crate::error::{Result, SdkError};

/// Default port of the SDAP discovery advertisement
pub const DEFAULT_SDAP_PORT: u16 = 53862;

mod seconds {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn default_adcp_port() -> u16 {
    DEFAULT_ADCP_PORT
}

fn default_sdap_port() -> u16 {
    DEFAULT_SDAP_PORT
}

fn default_password() -> Option<String> {
    Some(DEFAULT_PASSWORD.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "seconds")]
    pub connect: Duration,
    #[serde(with = "seconds")]
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            command: Duration::from_secs(5),
        }
    }
}

/// Poll intervals in seconds; 0 disables the periodic poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollIntervals {
    #[serde(with = "seconds")]
    pub attributes: Duration,
    #[serde(with = "seconds")]
    pub health: Duration,
    #[serde(with = "seconds")]
    pub options: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        PollerConfig::default().into()
    }
}

impl PollIntervals {
    /// Controller runs on battery: no fast polling
    pub fn low_power() -> Self {
        PollerConfig::low_power().into()
    }
}

impl From<PollerConfig> for PollIntervals {
    fn from(config: PollerConfig) -> Self {
        Self {
            attributes: config.attributes_interval,
            health: config.health_interval,
            options: config.options_interval,
        }
    }
}

impl From<&PollIntervals> for PollerConfig {
    fn from(intervals: &PollIntervals) -> Self {
        PollerConfig::new()
            .with_attributes_interval(intervals.attributes)
            .with_health_interval(intervals.health)
            .with_options_interval(intervals.options)
    }
}

/// Everything needed to talk to one projector
///
/// # Example
///
/// ```rust
/// use adcp_sdk::DeviceConfig;
///
/// let config: DeviceConfig = serde_json::from_str(
///     r#"{ "id": "cinema", "host": "192.168.1.40", "intervals": { "attributes": 0 } }"#,
/// ).unwrap();
///
/// assert_eq!(config.adcp_port, 53595);
/// assert_eq!(config.password.as_deref(), Some("Projector"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    /// Display name; the id when empty
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_adcp_port")]
    pub adcp_port: u16,
    #[serde(default = "default_sdap_port")]
    pub sdap_port: u16,
    /// `null` for projectors with authentication turned off
    #[serde(default = "default_password")]
    pub password: Option<String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub intervals: PollIntervals,
}

impl DeviceConfig {
    pub fn new(id: impl Into<DeviceId>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            host: host.into(),
            adcp_port: DEFAULT_ADCP_PORT,
            sdap_port: DEFAULT_SDAP_PORT,
            password: default_password(),
            timeouts: Timeouts::default(),
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.adcp_port = port;
        self
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SdkError::Config("Device id must not be empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(SdkError::Config(format!("Host of {} must not be empty", self.id)));
        }
        if self.adcp_port == 0 {
            return Err(SdkError::Config(format!("ADCP port of {} must not be 0", self.id)));
        }
        if self.timeouts.connect.is_zero() || self.timeouts.command.is_zero() {
            return Err(SdkError::Config(format!(
                "Timeouts of {} must be greater than 0",
                self.id
            )));
        }
        self.poller_config().validate()?;
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(self.host.trim(), self.adcp_port)
            .with_connect_timeout(self.timeouts.connect)
            .with_command_timeout(self.timeouts.command);
        match &self.password {
            Some(password) => config.with_password(password.clone()),
            None => config,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig::from(&self.intervals)
    }
}

// ============================================================================
// Configuration sources
// ============================================================================

/// Where device configurations are loaded from and saved to
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Vec<DeviceConfig>>;

    fn save(&self, devices: &[DeviceConfig]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    devices: Vec<DeviceConfig>,
}

/// Device list stored as JSON
///
/// ```json
/// { "devices": [ { "id": "cinema", "host": "192.168.1.40" } ] }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/adcp-sdk/devices.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("adcp-sdk").join("devices.json"))
    }

    pub fn at_default_location() -> Result<Self> {
        Self::default_path()
            .map(Self::new)
            .ok_or_else(|| SdkError::Config("No configuration directory on this platform".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonFileSource {
    /// A missing file is an empty device list
    fn load(&self) -> Result<Vec<DeviceConfig>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no configuration file");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(SdkError::Config(format!(
                    "Failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        let file: ConfigFile = serde_json::from_str(&text).map_err(|err| {
            SdkError::Config(format!("Invalid configuration in {}: {err}", self.path.display()))
        })?;
        for device in &file.devices {
            device.validate()?;
        }
        info!(path = %self.path.display(), devices = file.devices.len(), "configuration loaded");
        Ok(file.devices)
    }

    fn save(&self, devices: &[DeviceConfig]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                SdkError::Config(format!("Failed to create {}: {err}", parent.display()))
            })?;
        }

        let file = ConfigFile {
            devices: devices.to_vec(),
        };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|err| SdkError::Config(format!("Failed to serialize configuration: {err}")))?;
        fs::write(&self.path, text)
            .map_err(|err| SdkError::Config(format!("Failed to write {}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), devices = devices.len(), "configuration saved");
        Ok(())
    }
}
