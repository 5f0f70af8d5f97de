//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `linkbridge.toml` in the working directory, or the file named
//! by `LINKBRIDGE_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use linkbridge_adapter_mqtt::MqttConfig;
use linkbridge_app::poller::PollPlan;
use linkbridge_app::services::command_service::{LearningConfig, MacroPolicy};
use linkbridge_domain::metric::MetricKind;

const DEFAULT_PATH: &str = "linkbridge.toml";

/// Upper bound for a learning session phase, in seconds.
const MAX_LEARNING_SECS: u64 = 24 * 60 * 60;

/// Upper bound for a poll interval, in seconds.
const MAX_POLL_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Which devices to bridge and how they map onto topics.
    pub devices: DevicesConfig,
    /// Command store settings.
    pub commands: CommandsConfig,
    /// Learning session timings.
    pub learning: LearningSettings,
    /// Metric polling.
    pub polling: PollingConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// How devices are addressed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// One device answers every topic under the prefix.
    #[default]
    Single,
    /// Each device owns a subprefix below the prefix.
    Multiple,
}

/// Device transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Simulated devices.
    #[default]
    Virtual,
}

/// Device sourcing and topology.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub mode: DeviceMode,
    pub transport: TransportKind,
    /// How long discovery listens for answers, in seconds.
    pub discovery_timeout_secs: u64,
    /// Subprefix format for devices without an explicit subprefix.
    /// Placeholders: `{type}`, `{host}`, `{mac}`, `{mac_nic}`.
    pub subprefix_format: String,
    /// Subprefix that addresses every device at once.
    pub broadcast_prefix: String,
    /// Explicit devices. Discovery is used when empty.
    pub list: Vec<DeviceEntry>,
}

/// One configured device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    /// Device family (`rm`, `sp2`, `mp1`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    /// Hardware address, `aa:bb:cc:dd:ee:ff` or bare hex.
    pub mac: String,
    /// Overrides the subprefix computed from `subprefix_format`.
    #[serde(default)]
    pub subprefix: Option<String>,
}

/// Command store configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Directory holding `commands/` and `macros/`.
    pub root: PathBuf,
    /// What a macro does when one of its lines fails.
    pub macro_policy: MacroPolicy,
}

/// Learning timings, in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    pub capture_attempts: u32,
    pub capture_period_secs: u64,
    pub rf_sweep_timeout_secs: u64,
    pub rf_sweep_poll_secs: u64,
    pub rf_settle_secs: u64,
}

/// Poll intervals per metric, in seconds. Unset or zero disables polling.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub temperature_secs: Option<u64>,
    pub humidity_secs: Option<u64>,
    pub energy_secs: Option<u64>,
    pub sensors_secs: Option<u64>,
    pub state_secs: Option<u64>,
    pub position_secs: Option<u64>,
    /// Metrics published as one JSON document instead of one topic per
    /// field.
    pub json: Vec<MetricKind>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `LINKBRIDGE_CONFIG` or `linkbridge.toml` (if
    /// present) then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("LINKBRIDGE_CONFIG")
            .map_or_else(|| PathBuf::from(DEFAULT_PATH), PathBuf::from);
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("LINKBRIDGE_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(val) = var("LINKBRIDGE_MQTT_PORT")
            && let Ok(port) = val.parse()
        {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("LINKBRIDGE_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = var("LINKBRIDGE_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(val) = var("LINKBRIDGE_COMMANDS_ROOT") {
            self.commands.root = PathBuf::from(val);
        }
        if let Some(val) = var("LINKBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Validation(message.to_string()));

        if self.mqtt.broker_port == 0 {
            return invalid("mqtt.broker_port must be non-zero");
        }
        if self.mqtt.qos().is_err() {
            return invalid("mqtt.qos must be 0, 1 or 2");
        }
        let announcements = [&self.mqtt.birth, &self.mqtt.will];
        if announcements
            .into_iter()
            .flatten()
            .any(|announcement| announcement.qos().is_err())
        {
            return invalid("mqtt.birth and mqtt.will qos must be 0, 1 or 2");
        }
        if !self.mqtt.topic_prefix.is_empty() && !self.mqtt.topic_prefix.ends_with('/') {
            return invalid("mqtt.topic_prefix must end with '/'");
        }
        if self.mqtt.tls.enabled && self.mqtt.tls.ca_certs.is_none() {
            return invalid("mqtt.tls.ca_certs is required when TLS is enabled");
        }
        if self.mqtt.tls.certfile.is_some() != self.mqtt.tls.keyfile.is_some() {
            return invalid("mqtt.tls.certfile and mqtt.tls.keyfile must be set together");
        }
        if self.devices.mode == DeviceMode::Multiple
            && (self.devices.broadcast_prefix.len() < 2
                || !self.devices.broadcast_prefix.ends_with('/'))
        {
            return invalid("devices.broadcast_prefix must be non-empty and end with '/'");
        }
        if self.devices.mode == DeviceMode::Single && self.devices.list.len() > 1 {
            return invalid("devices.mode = \"single\" allows at most one device in devices.list");
        }
        let learning = &self.learning;
        if learning.capture_attempts == 0
            || learning.capture_period_secs == 0
            || learning.rf_sweep_timeout_secs == 0
            || learning.rf_sweep_poll_secs == 0
        {
            return invalid("learning timings must be non-zero");
        }
        let window = learning
            .capture_period_secs
            .checked_mul(u64::from(learning.capture_attempts));
        if [
            window,
            Some(learning.rf_sweep_timeout_secs),
            Some(learning.rf_sweep_poll_secs),
            Some(learning.rf_settle_secs),
        ]
        .into_iter()
        .any(|secs| secs.is_none_or(|secs| secs > MAX_LEARNING_SECS))
        {
            return invalid("learning timings must add up to at most one day");
        }
        if self
            .polling
            .intervals()
            .any(|(_, secs)| secs > MAX_POLL_INTERVAL_SECS)
        {
            return invalid("polling intervals must be at most one week");
        }
        Ok(())
    }

    /// Discovery listening window.
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.devices.discovery_timeout_secs)
    }
}

impl LearningSettings {
    /// Timings used by the command service.
    #[must_use]
    pub fn to_learning_config(&self) -> LearningConfig {
        LearningConfig {
            capture_attempts: self.capture_attempts,
            capture_period: Duration::from_secs(self.capture_period_secs),
            rf_sweep_timeout: Duration::from_secs(self.rf_sweep_timeout_secs),
            rf_sweep_poll: Duration::from_secs(self.rf_sweep_poll_secs),
            rf_settle: Duration::from_secs(self.rf_settle_secs),
        }
    }
}

impl PollingConfig {
    /// Build the poll plan.
    #[must_use]
    pub fn plan(&self) -> PollPlan {
        let plan = self
            .intervals()
            .fold(PollPlan::default(), |plan, (metric, secs)| {
                plan.every(metric, Duration::from_secs(secs))
            });
        self.json
            .iter()
            .fold(plan, |plan, metric| plan.json(*metric))
    }

    fn intervals(&self) -> impl Iterator<Item = (MetricKind, u64)> {
        [
            (MetricKind::Temperature, self.temperature_secs),
            (MetricKind::Humidity, self.humidity_secs),
            (MetricKind::Energy, self.energy_secs),
            (MetricKind::Sensors, self.sensors_secs),
            (MetricKind::State, self.state_secs),
            (MetricKind::Position, self.position_secs),
        ]
        .into_iter()
        .filter_map(|(metric, secs)| secs.map(|secs| (metric, secs)))
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Single,
            transport: TransportKind::Virtual,
            discovery_timeout_secs: 20,
            subprefix_format: "{type}_{mac_nic}/".to_string(),
            broadcast_prefix: "all/".to_string(),
            list: Vec::new(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            macro_policy: MacroPolicy::Abort,
        }
    }
}

impl Default for LearningSettings {
    fn default() -> Self {
        let defaults = LearningConfig::default();
        Self {
            capture_attempts: defaults.capture_attempts,
            capture_period_secs: defaults.capture_period.as_secs(),
            rf_sweep_timeout_secs: defaults.rf_sweep_timeout.as_secs(),
            rf_sweep_poll_secs: defaults.rf_sweep_poll.as_secs(),
            rf_settle_secs: defaults.rf_settle.as_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "linkbridged=info,linkbridge=info,rumqttc=warn".to_string(),
        }
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
