//! Bridge configuration.
//!
//! Values are layered, lowest priority first: built-in defaults, a TOML
//! file, `MILIGHT_*` environment variables, then command-line flags (applied
//! by the binary). [`BridgeConfig::resolve`] compiles the result into the
//! [`BridgeSettings`] the service runs with.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::topic::{TopicError, TopicTemplate};

/// Built-in defaults.
pub mod defaults {
    pub const MQTT_HOST: &str = "127.0.0.1";
    pub const MQTT_PORT: u16 = 1883;
    pub const KEEP_ALIVE_SECS: u64 = 60;
    pub const COMMAND_TOPIC: &str = "milight/{device_id}/{device_type}/{group_id}";
    pub const STATE_TOPIC: &str = "milight/states/{device_id}/{device_type}/{group_id}";
    pub const HEARTBEAT_SECS: u64 = 10;
    pub const CONFIG_FILE: &str = "milight.toml";
    pub const CLIENT_ID_PREFIX: &str = "milight-bridge";
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_HOST: &str = "MILIGHT_MQTT_HOST";
    pub const MQTT_PORT: &str = "MILIGHT_MQTT_PORT";
    pub const MQTT_USERNAME: &str = "MILIGHT_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "MILIGHT_MQTT_PASSWORD";
    pub const COMMAND_TOPIC: &str = "MILIGHT_COMMAND_TOPIC";
    pub const STATE_TOPIC: &str = "MILIGHT_STATE_TOPIC";
    pub const IGNORED_TOPICS: &str = "MILIGHT_IGNORED_TOPICS";
    pub const OPTIONS: &str = "MILIGHT_OPTIONS";
    pub const DEBUG: &str = "MILIGHT_DEBUG";
    pub const LOG_JSON: &str = "MILIGHT_LOG_JSON";
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors. All of them abort start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error(transparent)]
    Pattern(#[from] TopicError),
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: defaults::MQTT_HOST.to_string(),
            port: defaults::MQTT_PORT,
            username: None,
            password: None,
            client_id: None,
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
        }
    }
}

impl MqttSettings {
    /// Broker host with spaces removed.
    pub fn host(&self) -> String {
        self.host.replace(' ', "")
    }

    /// Configured client id, or a fresh `milight-bridge-<uuid>`.
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", defaults::CLIENT_ID_PREFIX, Uuid::new_v4()))
    }

    /// Credentials, only when both parts are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

/// Diagnostic verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DebugLevel {
    #[default]
    None,
    Normal,
    Verbose,
    VerbosePlus,
}

impl DebugLevel {
    /// Default `EnvFilter` directive for the level.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::None => "warn,milight=info",
            Self::Normal | Self::Verbose => "warn,milight=debug",
            Self::VerbosePlus => "warn,milight=trace",
        }
    }

    /// Whether raw inbound messages are logged.
    pub fn dumps_messages(self) -> bool {
        matches!(self, Self::Verbose | Self::VerbosePlus)
    }
}

impl FromStr for DebugLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "normal" | "debug" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            "verbose+" => Ok(Self::VerbosePlus),
            _ => Err(ConfigError::Parse(format!("unknown debug level '{}'", s))),
        }
    }
}

impl TryFrom<String> for DebugLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Normal => "Normal",
            Self::Verbose => "Verbose",
            Self::VerbosePlus => "Verbose+",
        })
    }
}

impl From<DebugLevel> for String {
    fn from(level: DebugLevel) -> Self {
        level.to_string()
    }
}

/// Options recognised in the free-form JSON options blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// New devices are shown among active devices.
    #[serde(rename = "addDiscoveredDeviceUsed", default = "default_true")]
    pub add_discovered_device_used: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            add_discovered_device_used: true,
        }
    }
}

impl BridgeOptions {
    /// Parse the options blob. Invalid input falls back to defaults.
    pub fn parse_blob(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).unwrap_or_else(|e| {
                    warn!(category = "config", "Ignoring invalid options '{}': {}", raw, e);
                    Self::default()
                })
            }
            Ok(_) => {
                warn!(category = "config", "Ignoring options '{}': not a JSON object", raw);
                Self::default()
            }
            Err(e) => {
                warn!(category = "config", "Ignoring options '{}': {}", raw, e);
                Self::default()
            }
        }
    }
}

/// Raw bridge configuration as read from file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub command_topic: String,
    pub state_topic: String,
    /// Comma-separated topics whose messages are dropped
    pub ignored_topics: String,
    /// JSON options blob
    pub options: String,
    pub debug: DebugLevel,
    pub heartbeat_secs: u64,
    pub mqtt: MqttSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_topic: defaults::COMMAND_TOPIC.to_string(),
            state_topic: defaults::STATE_TOPIC.to_string(),
            ignored_topics: String::new(),
            options: String::new(),
            debug: DebugLevel::None,
            heartbeat_secs: defaults::HEARTBEAT_SECS,
            mqtt: MqttSettings::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(category = "config", "Loading config from: {}", path.display());
        Self::from_toml_str(&content)
    }

    /// The file [`load`](Self::load) reads: `path` if given, else the
    /// default file if it exists.
    pub fn source_path(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = Path::new(defaults::CONFIG_FILE);
                default_path.exists().then(|| default_path.to_path_buf())
            }
        }
    }

    /// Load the file named by [`source_path`](Self::source_path), else
    /// defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match Self::source_path(path) {
            Some(path) => Self::load_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::MQTT_HOST) {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup(env_vars::MQTT_PORT) {
            self.mqtt.port = port.trim().parse().map_err(|_| {
                ConfigError::Parse(format!("{} is not a port: '{}'", env_vars::MQTT_PORT, port))
            })?;
        }
        if let Some(username) = lookup(env_vars::MQTT_USERNAME) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(env_vars::MQTT_PASSWORD) {
            self.mqtt.password = Some(password);
        }
        if let Some(topic) = lookup(env_vars::COMMAND_TOPIC) {
            self.command_topic = topic;
        }
        if let Some(topic) = lookup(env_vars::STATE_TOPIC) {
            self.state_topic = topic;
        }
        if let Some(ignored) = lookup(env_vars::IGNORED_TOPICS) {
            self.ignored_topics = ignored;
        }
        if let Some(options) = lookup(env_vars::OPTIONS) {
            self.options = options;
        }
        if let Some(debug) = lookup(env_vars::DEBUG) {
            self.debug = debug.parse()?;
        }
        Ok(())
    }

    /// Ignored topics, empty entries skipped.
    pub fn ignored_topic_set(&self) -> HashSet<String> {
        self.ignored_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Compile patterns and parse derived values.
    pub fn resolve(&self) -> ConfigResult<BridgeSettings> {
        Ok(BridgeSettings {
            command_topic: TopicTemplate::compile(&self.command_topic)?,
            state_topic: TopicTemplate::compile(&self.state_topic)?,
            ignored_topics: self.ignored_topic_set(),
            options: BridgeOptions::parse_blob(&self.options),
            debug: self.debug,
            heartbeat: Duration::from_secs(self.heartbeat_secs.max(1)),
        })
    }
}

/// Compiled settings the service runs with.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub command_topic: TopicTemplate,
    pub state_topic: TopicTemplate,
    pub ignored_topics: HashSet<String>,
    pub options: BridgeOptions,
    pub debug: DebugLevel,
    pub heartbeat: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt.host, "127.0.0.1");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.heartbeat_secs, 10);

        let settings = config.resolve().unwrap();
        assert_eq!(
            settings.state_topic.subscription_filter(),
            "milight/states/+/+/+"
        );
        assert!(settings.options.add_discovered_device_used);
        assert!(settings.ignored_topics.is_empty());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            ignored_topics = "milight/states/0x1/rgbw/1,,milight/states/0x2/rgbw/1"
            debug = "Verbose+"

            [mqtt]
            host = "10.0.0.5"
            port = 1884
            "#,
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "10.0.0.5");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.debug, DebugLevel::VerbosePlus);
        assert_eq!(config.command_topic, defaults::COMMAND_TOPIC);
        assert_eq!(config.ignored_topic_set().len(), 2);
    }

    #[test]
    fn test_source_path() {
        let explicit = Path::new("/etc/milight/bridge.toml");
        assert_eq!(
            BridgeConfig::source_path(Some(explicit)),
            Some(explicit.to_path_buf())
        );
        // The crate directory carries no milight.toml
        assert_eq!(BridgeConfig::source_path(None), None);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            BridgeConfig::from_toml_str("debug = \"Loud\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(BridgeConfig::from_toml_str("[mqtt\nport = 1").is_err());
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            (env_vars::MQTT_HOST, "broker.local"),
            (env_vars::MQTT_PORT, "8883"),
            (env_vars::STATE_TOPIC, "hub/:device_id/:device_type/:group_id"),
            (env_vars::DEBUG, "Debug"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.debug, DebugLevel::Normal);
        assert_eq!(
            config.resolve().unwrap().state_topic.subscription_filter(),
            "hub/+/+/+"
        );
    }

    #[test]
    fn test_env_bad_port() {
        let mut config = BridgeConfig::default();
        let result = config.apply_env_from(|key| {
            (key == env_vars::MQTT_PORT).then(|| "eighteen".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_pattern_fails_resolve() {
        let config = BridgeConfig {
            command_topic: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn test_options_blob() {
        assert!(BridgeOptions::parse_blob("").add_discovered_device_used);
        assert!(
            !BridgeOptions::parse_blob(r#"{"addDiscoveredDeviceUsed": false}"#)
                .add_discovered_device_used
        );
        assert!(BridgeOptions::parse_blob(r#"{"other": 1}"#).add_discovered_device_used);
        assert!(BridgeOptions::parse_blob("not json").add_discovered_device_used);
        assert!(BridgeOptions::parse_blob("[false]").add_discovered_device_used);
        assert!(
            BridgeOptions::parse_blob(r#"{"addDiscoveredDeviceUsed": "no"}"#)
                .add_discovered_device_used
        );
    }

    #[test]
    fn test_debug_levels() {
        assert_eq!("None".parse::<DebugLevel>().unwrap(), DebugLevel::None);
        assert_eq!("Verbose+".parse::<DebugLevel>().unwrap(), DebugLevel::VerbosePlus);
        assert_eq!("debug".parse::<DebugLevel>().unwrap(), DebugLevel::Normal);
        assert!("Loud".parse::<DebugLevel>().is_err());

        assert!(!DebugLevel::Normal.dumps_messages());
        assert!(DebugLevel::Verbose.dumps_messages());
        assert_eq!(DebugLevel::VerbosePlus.filter_directive(), "warn,milight=trace");
        assert_eq!(DebugLevel::VerbosePlus.to_string(), "Verbose+");
    }

    #[test]
    fn test_mqtt_settings_helpers() {
        let settings = MqttSettings {
            host: " 192.168.1.2 ".to_string(),
            username: Some("user".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.host(), "192.168.1.2");
        assert_eq!(settings.broker_addr(), "192.168.1.2:1883");
        assert_eq!(settings.credentials(), None);
        assert!(settings.client_id().starts_with("milight-bridge-"));

        let with_pass = MqttSettings {
            password: Some("secret".to_string()),
            ..settings
        };
        assert_eq!(with_pass.credentials(), Some(("user", "secret")));
    }
}
