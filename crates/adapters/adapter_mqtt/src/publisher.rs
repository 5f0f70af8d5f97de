//! Bus publisher backed by the shared `rumqttc` client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rumqttc::{AsyncClient, QoS};

use linkbridge_app::ports::BusPublisher;
use linkbridge_domain::error::BridgeError;

use crate::error::MqttError;

/// Cloneable publish handle shared by the router and every poller.
///
/// While the session is disconnected, publishing fails fast with
/// [`MqttError::NotConnected`] instead of queueing behind the reconnect.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    qos: QoS,
    retain: bool,
}

impl MqttPublisher {
    pub(crate) fn new(client: AsyncClient, qos: QoS, retain: bool) -> Self {
        Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            qos,
            retain,
        }
    }

    /// Whether the session currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Publish `payload` on `topic` with the configured QoS and retain flag.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::NotConnected`] while disconnected, or the client
    /// error when the request cannot be queued.
    pub async fn send(&self, topic: &str, payload: String) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.client
            .publish(topic, self.qos, self.retain, payload)
            .await
            .map_err(MqttError::Client)
    }
}

impl BusPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BridgeError> {
        tracing::trace!(topic, payload = %payload, "publishing");
        self.send(topic, payload).await.map_err(MqttError::into_domain)
    }
}
