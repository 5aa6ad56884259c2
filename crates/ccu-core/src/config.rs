//! CCU configuration.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults (this module's constants)
//! 2. a TOML file (`config.toml` unless told otherwise)
//! 3. environment variables (see [`env_vars`])

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::config_err;
use crate::error::Result;
use crate::types::ModuleType;

/// Default values.
pub mod defaults {
    pub const MQTT_HOST: &str = "localhost";
    pub const MQTT_PORT: u16 = 1883;
    pub const MQTT_CLIENT_ID: &str = "ccu";
    pub const MQTT_KEEP_ALIVE_SECS: u64 = 30;
    pub const LAYOUT_PATH: &str = "data/layout.json";
    pub const CONFIG_PATH: &str = "config.toml";

    /// Default production durations in seconds.
    pub const MILL_DURATION_SECS: u64 = 30;
    pub const DRILL_DURATION_SECS: u64 = 30;
    pub const OVEN_DURATION_SECS: u64 = 45;
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_HOST: &str = "CCU_MQTT_HOST";
    pub const MQTT_PORT: &str = "CCU_MQTT_PORT";
    pub const MQTT_USERNAME: &str = "CCU_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "CCU_MQTT_PASSWORD";
    pub const LAYOUT_PATH: &str = "CCU_LAYOUT_PATH";
    pub const LOG_JSON: &str = "CCU_LOG_JSON";
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: defaults::MQTT_HOST.to_string(),
            port: defaults::MQTT_PORT,
            client_id: defaults::MQTT_CLIENT_ID.to_string(),
            username: None,
            password: None,
            keep_alive_secs: defaults::MQTT_KEEP_ALIVE_SECS,
        }
    }
}

/// Where the shopfloor layout is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutSettings {
    pub path: String,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            path: defaults::LAYOUT_PATH.to_string(),
        }
    }
}

/// Pairing behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PairingSettings {
    /// Modules that never receive a default production duration.
    pub support_modules: Vec<ModuleType>,
    /// Serial numbers of the AGVs that belong to this factory.
    pub agvs: Vec<String>,
    /// Default production duration per type, in seconds.
    pub default_durations: HashMap<ModuleType, u64>,
}

impl Default for PairingSettings {
    fn default() -> Self {
        let default_durations = HashMap::from([
            (ModuleType::Mill, defaults::MILL_DURATION_SECS),
            (ModuleType::Drill, defaults::DRILL_DURATION_SECS),
            (ModuleType::Oven, defaults::OVEN_DURATION_SECS),
        ]);
        Self {
            support_modules: vec![ModuleType::Dps, ModuleType::Hbw, ModuleType::Chrg],
            agvs: Vec::new(),
            default_durations,
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

/// Complete CCU configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CcuConfig {
    pub mqtt: MqttSettings,
    pub layout: LayoutSettings,
    pub pairing: PairingSettings,
    pub logging: LoggingSettings,
}

impl CcuConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CcuConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(category = "config", "Loading config from: {}", path.display());
                Self::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    category = "config",
                    "No config file at {}, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the file, apply environment overrides and validate.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup(env_vars::MQTT_PORT) {
            self.mqtt.port = port
                .parse()
                .map_err(|_| config_err!("{} is not a port: {}", env_vars::MQTT_PORT, port))?;
        }
        if let Some(username) = lookup(env_vars::MQTT_USERNAME) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(env_vars::MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
        if let Some(path) = lookup(env_vars::LAYOUT_PATH) {
            self.layout.path = path;
        }
        if let Some(json) = lookup(env_vars::LOG_JSON) {
            self.logging.json = json == "1" || json.eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    /// Reject settings the CCU cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            return Err(config_err!("mqtt.host must not be empty"));
        }
        if self.mqtt.port == 0 {
            return Err(config_err!("mqtt.port must not be 0"));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(config_err!("mqtt.keep_alive_secs must be positive"));
        }
        if self.layout.path.trim().is_empty() {
            return Err(config_err!("layout.path must not be empty"));
        }
        Ok(())
    }
}
