//! MQTT adapter error types.

use std::path::PathBuf;

use linkbridge_domain::error::BridgeError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The session is not connected to the broker.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client rejected a request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The connection to the broker failed.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// A QoS level outside 0..=2 was configured.
    #[error("invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),

    /// A TLS certificate or key could not be read.
    #[error("failed to read TLS file {}", path.display())]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MqttError {
    /// Convert into a [`BridgeError::Bus`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> BridgeError {
        BridgeError::Bus(Box::new(self))
    }
}

impl From<MqttError> for BridgeError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
