//! MQTT connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use rumqttc::QoS;
use serde::Deserialize;

use crate::error::MqttError;

/// Configuration of the bus connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Prefix of every topic the bridge subscribes and publishes to.
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    /// QoS of the subscription and of published telemetry.
    pub qos: u8,
    /// Retain flag of published telemetry.
    pub retain: bool,
    /// Delay before reconnecting after a connection error, in seconds.
    pub reconnect_delay_secs: u64,
    pub tls: TlsConfig,
    /// Message published on every successful connection.
    pub birth: Option<Announcement>,
    /// Message the broker publishes when the bridge disappears.
    pub will: Option<Announcement>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: format!("linkbridge-{}", std::process::id()),
            topic_prefix: "broadlink/".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            clean_session: false,
            qos: 0,
            retain: false,
            reconnect_delay_secs: 5,
            tls: TlsConfig::default(),
            birth: None,
            will: None,
        }
    }
}

impl MqttConfig {
    /// QoS level for subscriptions and telemetry.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] for levels above 2.
    pub fn qos(&self) -> Result<QoS, MqttError> {
        qos_from_level(self.qos)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// TLS settings. TLS is used only when `enabled` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// PEM bundle of trusted certificate authorities.
    pub ca_certs: Option<PathBuf>,
    /// PEM client certificate, used together with `keyfile`.
    pub certfile: Option<PathBuf>,
    /// PEM private key of the client certificate.
    pub keyfile: Option<PathBuf>,
}

/// A birth or last-will message.
#[derive(Debug, Clone, Deserialize)]
pub struct Announcement {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_retain")]
    pub retain: bool,
}

impl Announcement {
    /// QoS level of the announcement.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] for levels above 2.
    pub fn qos(&self) -> Result<QoS, MqttError> {
        qos_from_level(self.qos)
    }
}

fn default_retain() -> bool {
    true
}

fn qos_from_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}
