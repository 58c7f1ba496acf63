//! Configuration loading: TOML file with environment variable overrides.
//!
//! Reads `homewire.toml` from the working directory, or the file named by
//! `HOMEWIRE_CONFIG`. Every section has defaults so the file is optional,
//! though a hub without devices has nothing to do. Environment variables
//! take precedence over file values.

use std::collections::BTreeMap;

use serde::Deserialize;

use homewire_adapter_telnet::TelnetConfig;
use homewire_adapter_telnet::codec::MIN_BACKLOG_BYTES;
use homewire_adapter_upnp::UpnpConfig;
use homewire_app::processor::DEFAULT_QUEUE_CAPACITY;
use homewire_domain::command::Command;
use homewire_domain::device::{Protocol, SensorAttr, SensorDataType};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub processor: ProcessorConfig,
    pub bus: BusConfig,
    /// Settings shared by every UPnP device.
    pub upnp: UpnpConfig,
    pub devices: Vec<DeviceConfig>,
    pub scenes: Vec<SceneConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Commands that may wait for the worker before `enqueue` blocks.
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events a subscriber may fall behind before it starts losing them.
    pub capacity: usize,
}

/// One physical device and the components it owns.
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub local_id: String,
    pub name: String,
    /// `host:port` for telnet, base URL for UPnP.
    pub address: String,
    pub protocol: Protocol,
    /// Global IDs of devices whose frames this one relays.
    #[serde(default)]
    pub bridges: Vec<String>,
    #[serde(default)]
    pub telnet: TelnetConfig,
    #[serde(default)]
    pub zones: Vec<ComponentConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub buttons: Vec<ComponentConfig>,
}

/// A zone or button.
#[derive(Debug, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    pub local_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    pub local_id: String,
    pub name: String,
    #[serde(default = "default_attr_name")]
    pub attr_name: String,
    #[serde(default)]
    pub data_type: SensorDataType,
    /// Labels for enumerated values, e.g. `{ "0" = "closed", "1" = "open" }`.
    #[serde(default)]
    pub states: Option<BTreeMap<String, String>>,
}

impl SensorConfig {
    /// The attribute before any reading arrives.
    #[must_use]
    pub fn attr(&self) -> SensorAttr {
        SensorAttr {
            name: self.attr_name.clone(),
            value: String::new(),
            data_type: self.data_type,
            states: self.states.clone(),
        }
    }
}

fn default_attr_name() -> String {
    "sensor".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SceneConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

/// A scene step, addressed by global ID.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandConfig {
    ZoneSetLevel { zone: String, level: f32 },
    ButtonPress { button: String },
    ButtonRelease { button: String },
    SceneSet { scene: String },
}

impl From<&CommandConfig> for Command {
    fn from(config: &CommandConfig) -> Self {
        match config {
            CommandConfig::ZoneSetLevel { zone, level } => {
                Command::zone_set_level(zone.as_str(), *level)
            }
            CommandConfig::ButtonPress { button } => Command::button_press(button.as_str()),
            CommandConfig::ButtonRelease { button } => Command::button_release(button.as_str()),
            CommandConfig::SceneSet { scene } => Command::scene_set(scene.as_str()),
        }
    }
}

impl Config {
    /// Load configuration then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("HOMEWIRE_CONFIG").unwrap_or_else(|_| "homewire.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOMEWIRE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("HOMEWIRE_CALLBACK_HOST") {
            self.upnp.callback_host = val;
        }
        if let Ok(val) = std::env::var("HOMEWIRE_CALLBACK_PORT") {
            if let Ok(port) = val.parse() {
                self.upnp.callback_port = port;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "processor queue capacity must be non-zero".to_string(),
            ));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::Validation(
                "bus capacity must be non-zero".to_string(),
            ));
        }
        if self.upnp.callback_port == 0 {
            return Err(ConfigError::Validation(
                "upnp callback port must be non-zero".to_string(),
            ));
        }
        for device in self.devices.iter().filter(|d| d.protocol == Protocol::Telnet) {
            let telnet = &device.telnet;
            if telnet.pool_size == 0 {
                return Err(ConfigError::Validation(format!(
                    "device {} needs a pool size of at least 1",
                    device.id
                )));
            }
            if telnet.max_backlog_bytes < MIN_BACKLOG_BYTES {
                return Err(ConfigError::Validation(format!(
                    "device {} needs max_backlog_bytes of at least {MIN_BACKLOG_BYTES}",
                    device.id
                )));
            }
            if telnet.retry_delay_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "device {} needs a retry delay of at least 1 second",
                    device.id
                )));
            }
        }
        Ok(())
    }

    /// Whether any configured device needs the notification server.
    #[must_use]
    pub fn has_upnp_devices(&self) -> bool {
        self.devices.iter().any(|d| d.protocol != Protocol::Telnet)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homewired=info,homewire=info,tower_http=info".to_string(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
