//! Session manager: owns the `rumqttc` event loop.
//!
//! The session cycles through `Connecting → Connected → Disconnected` for as
//! long as it runs. Every successful connection re-subscribes to
//! `<prefix>#` and re-publishes the birth message, since the broker may
//! have dropped both. Connection errors are never fatal: the session waits for the
//! reconnect delay and polls again, which makes `rumqttc` reconnect.

use std::future::Future;
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport,
};

use linkbridge_app::poller::PollerSet;
use linkbridge_app::ports::{CommandStore, DeviceTransport};
use linkbridge_app::router::Router;

use crate::config::{MqttConfig, TlsConfig};
use crate::error::MqttError;
use crate::publisher::MqttPublisher;

/// Capacity of the request channel between clients and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long shutdown waits for the disconnect packet to go out.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Connection state of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Birth {
    topic: String,
    payload: String,
    qos: QoS,
    retain: bool,
}

/// A configured but not yet running connection.
///
/// Created first so the publisher can be handed to the router and the
/// pollers before the session starts.
pub struct MqttLink {
    client: AsyncClient,
    eventloop: EventLoop,
    publisher: MqttPublisher,
    qos: QoS,
    birth: Option<Birth>,
    reconnect_delay: Duration,
}

impl MqttLink {
    /// Build the connection options and the client.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] for bad QoS levels, and
    /// [`MqttError::Tls`] when a TLS file cannot be read.
    pub fn new(config: &MqttConfig) -> Result<Self, MqttError> {
        let options = build_options(config)?;
        let qos = config.qos()?;
        let birth = config
            .birth
            .as_ref()
            .map(|birth| {
                Ok::<_, MqttError>(Birth {
                    topic: birth.topic.clone(),
                    payload: birth.payload.clone(),
                    qos: birth.qos()?,
                    retain: birth.retain,
                })
            })
            .transpose()?;

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let publisher = MqttPublisher::new(client.clone(), qos, config.retain);

        Ok(Self {
            client,
            eventloop,
            publisher,
            qos,
            birth,
            reconnect_delay: config.reconnect_delay(),
        })
    }

    /// Publish handle for the router and the pollers.
    pub fn publisher(&self) -> MqttPublisher {
        self.publisher.clone()
    }

    /// Attach the router that handles inbound messages and the pollers the
    /// session stops on shutdown.
    pub fn into_session<D, S>(
        self,
        router: Router<D, S, MqttPublisher>,
        pollers: PollerSet,
    ) -> MqttSession<D, S> {
        MqttSession {
            link: self,
            router,
            pollers,
            state: SessionState::Connecting,
        }
    }
}

/// A running bus session.
pub struct MqttSession<D, S> {
    link: MqttLink,
    router: Router<D, S, MqttPublisher>,
    pollers: PollerSet,
    state: SessionState,
}

impl<D, S> MqttSession<D, S>
where
    D: DeviceTransport + 'static,
    S: CommandStore,
{
    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until `shutdown` resolves, then disconnect cleanly
    /// and stop the pollers.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                () = &mut shutdown => break,
                event = self.link.eventloop.poll() => event,
            };
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(err) => {
                    self.on_connection_error(&err);
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(self.link.reconnect_delay) => {
                            self.state = SessionState::Connecting;
                        }
                    }
                }
            }
        }
        self.stop().await;
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => self.on_connected(),
            Event::Incoming(Packet::Publish(publish)) => {
                let topic = String::from_utf8_lossy(publish.topic.as_ref()).into_owned();
                self.router.route(&topic, &publish.payload).await;
            }
            Event::Incoming(Packet::Disconnect) => {
                self.set_state(SessionState::Disconnected);
                tracing::warn!("broker closed the session");
            }
            _ => {}
        }
    }

    fn on_connected(&mut self) {
        self.set_state(SessionState::Connected);
        tracing::info!("connected to broker");

        let filter = self.router.subscription();
        match self.link.client.try_subscribe(&filter, self.link.qos) {
            Ok(()) => tracing::debug!(filter = %filter, "subscribed"),
            Err(err) => tracing::warn!(filter = %filter, %err, "subscription failed"),
        }

        if let Some(birth) = &self.link.birth
            && let Err(err) = self.link.client.try_publish(
                &birth.topic,
                birth.qos,
                birth.retain,
                birth.payload.clone(),
            )
        {
            tracing::warn!(topic = %birth.topic, %err, "birth message not sent");
        }
    }

    fn on_connection_error(&mut self, err: &rumqttc::ConnectionError) {
        self.set_state(SessionState::Disconnected);
        tracing::warn!(
            error = %err,
            retry_in_secs = self.link.reconnect_delay.as_secs(),
            "broker connection failed"
        );
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.link
            .publisher
            .set_connected(state == SessionState::Connected);
    }

    async fn stop(mut self) {
        tracing::info!("shutting down");
        std::mem::take(&mut self.pollers).shutdown();

        if self.state != SessionState::Connected {
            return;
        }
        self.set_state(SessionState::Disconnected);
        if let Err(err) = self.link.client.disconnect().await {
            tracing::debug!(%err, "disconnect request not queued");
            return;
        }
        let eventloop = &mut self.link.eventloop;
        let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            tracing::debug!("disconnect not acknowledged before grace period");
        }
    }
}

fn build_options(config: &MqttConfig) -> Result<MqttOptions, MqttError> {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(config.clean_session);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    if let Some(will) = &config.will {
        options.set_last_will(LastWill::new(
            &will.topic,
            will.payload.clone(),
            will.qos()?,
            will.retain,
        ));
    }
    if config.tls.enabled {
        options.set_transport(Transport::tls_with_config(tls_configuration(&config.tls)?));
    }
    Ok(options)
}

fn tls_configuration(tls: &TlsConfig) -> Result<TlsConfiguration, MqttError> {
    let ca = match &tls.ca_certs {
        Some(path) => read_pem(path)?,
        None => Vec::new(),
    };
    let client_auth = match (&tls.certfile, &tls.keyfile) {
        (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
        _ => None,
    };
    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    })
}

fn read_pem(path: &std::path::Path) -> Result<Vec<u8>, MqttError> {
    std::fs::read(path).map_err(|source| MqttError::Tls {
        path: path.to_path_buf(),
        source,
    })
}
