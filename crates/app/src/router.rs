//! Router: turns one inbound bus message into device operations.
//!
//! Classification is driven by the capabilities of the addressed device, in
//! a fixed order: telemetry echo, power, actuator, transceiver. A message
//! that matches nothing is logged and dropped. Learning sessions, macros and
//! actuator moves run on their own task so the bus keeps flowing while they
//! wait on the device.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use linkbridge_domain::command::{CommandKey, CommandName};
use linkbridge_domain::device::{Motion, PowerControl, Transceiver};
use linkbridge_domain::error::BridgeError;
use linkbridge_domain::metric::MetricKind;
use linkbridge_domain::topic::{self, TopicRoute};

use crate::ports::{BusPublisher, CommandStore, DeviceTransport};
use crate::registry::{DeviceRegistry, ManagedDevice, Resolved};
use crate::services::command_service::{Band, CommandService};

/// What happened to an inbound message.
#[derive(Debug)]
pub enum Routed {
    /// Outside the prefix, or one of the bridge's own telemetry topics.
    Ignored,
    /// No registered device matches the topic.
    Unresolved,
    /// One entry per addressed device, in registration order.
    Dispatched(Vec<Dispatch>),
}

impl Routed {
    /// Wait for every background operation started by this message.
    pub async fn join(self) {
        let Self::Dispatched(dispatches) = self else {
            return;
        };
        for dispatch in dispatches {
            if let Dispatch::Background(handle) = dispatch
                && let Err(err) = handle.await
            {
                tracing::warn!(%err, "background operation did not complete");
            }
        }
    }
}

/// Outcome for a single addressed device.
#[derive(Debug)]
pub enum Dispatch {
    /// The operation completed.
    Done,
    /// The operation failed; the error has been logged.
    Failed,
    /// The device has no operation for this command.
    Unrecognized,
    /// A long-running operation was started on its own task.
    Background(JoinHandle<()>),
}

#[derive(Debug)]
enum Intent {
    Power { socket: Option<u8>, on: bool },
    State(Map<String, Value>),
    Motion(Motion),
    MoveTo(u8),
    Replay(CommandKey),
    Record { key: CommandKey, band: Band },
    RecordOrReplay { key: CommandKey, band: Band },
    Macro(CommandName),
}

impl Intent {
    fn runs_in_background(&self) -> bool {
        !matches!(self, Self::Power { .. } | Self::State(_) | Self::Replay(_))
    }
}

/// Inbound message router.
pub struct Router<D, S, P> {
    registry: Arc<DeviceRegistry<D>>,
    commands: Arc<CommandService<S>>,
    publisher: P,
}

impl<D, S, P: Clone> Clone for Router<D, S, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            commands: Arc::clone(&self.commands),
            publisher: self.publisher.clone(),
        }
    }
}

impl<D, S, P> Router<D, S, P>
where
    D: DeviceTransport + 'static,
    S: CommandStore,
    P: BusPublisher,
{
    /// Create a new router.
    pub fn new(
        registry: Arc<DeviceRegistry<D>>,
        commands: Arc<CommandService<S>>,
        publisher: P,
    ) -> Self {
        Self {
            registry,
            commands,
            publisher,
        }
    }

    /// Topic filter covering every message the router handles.
    pub fn subscription(&self) -> String {
        format!("{}#", self.registry.prefix())
    }

    /// Route one inbound message.
    ///
    /// Never fails: every problem is logged and reflected in the returned
    /// [`Routed`] value, so one bad message cannot stall the bus.
    #[tracing::instrument(skip(self, payload))]
    pub async fn route(&self, topic: &str, payload: &[u8]) -> Routed {
        let Some(suffix) = topic.strip_prefix(self.registry.prefix()) else {
            tracing::debug!("topic outside prefix, ignored");
            return Routed::Ignored;
        };
        let (resolved, command) = match self.registry.resolve(suffix) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(%err, "no device for topic, message dropped");
                return Routed::Unresolved;
            }
        };
        if MetricKind::is_telemetry_topic(command) {
            tracing::trace!("own telemetry, ignored");
            return Routed::Ignored;
        }

        let devices = match resolved {
            Resolved::One(device) => vec![device.clone()],
            Resolved::All(devices) => devices.to_vec(),
        };
        let mut dispatches = Vec::with_capacity(devices.len());
        for device in devices {
            let route = TopicRoute::new(command, payload);
            dispatches.push(self.dispatch(device, &route).await);
        }
        Routed::Dispatched(dispatches)
    }

    async fn dispatch(&self, device: ManagedDevice<D>, route: &TopicRoute) -> Dispatch {
        let intent = match self.classify(&device, &route.command, &route.action).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                tracing::warn!(
                    device = %device.handle(),
                    command = %route.command,
                    action = %route.action,
                    "unrecognized command, message dropped"
                );
                return Dispatch::Unrecognized;
            }
            Err(err) => {
                tracing::warn!(
                    device = %device.handle(),
                    command = %route.command,
                    error = ?err,
                    "invalid command, message dropped"
                );
                return Dispatch::Failed;
            }
        };

        if intent.runs_in_background() {
            let router = self.clone();
            return Dispatch::Background(tokio::spawn(async move {
                router.run(&device, intent).await;
            }));
        }
        if self.run(&device, intent).await {
            Dispatch::Done
        } else {
            Dispatch::Failed
        }
    }

    async fn classify(
        &self,
        device: &ManagedDevice<D>,
        command: &str,
        action: &str,
    ) -> Result<Option<Intent>, BridgeError> {
        let caps = device.handle().capabilities();

        match caps.power {
            PowerControl::Single if command == "power" => {
                return Ok(Some(Intent::Power {
                    socket: None,
                    on: topic::is_switched_on(action),
                }));
            }
            PowerControl::MultiSocket { sockets } => {
                if let Some((socket, on)) = topic::parse_socket(command, action, sockets)? {
                    return Ok(Some(Intent::Power {
                        socket: Some(socket),
                        on,
                    }));
                }
            }
            PowerControl::Fields => {
                if let Some(field) = PowerControl::field_for(command) {
                    let on = u8::from(topic::is_switched_on(action));
                    let mut fields = Map::new();
                    fields.insert(field.to_string(), Value::from(on));
                    return Ok(Some(Intent::State(fields)));
                }
            }
            _ => {}
        }

        if caps.actuator {
            match command {
                "action" => {
                    if let Some(motion) = Motion::from_action(action) {
                        return Ok(Some(Intent::Motion(motion)));
                    }
                }
                "set" => return Ok(Some(Intent::MoveTo(topic::parse_percentage(action)?))),
                _ => {}
            }
        }

        match caps.transceiver {
            Some(transceiver) => self.classify_transceiver(device, transceiver, command, action).await,
            None => Ok(None),
        }
    }

    async fn classify_transceiver(
        &self,
        device: &ManagedDevice<D>,
        transceiver: Transceiver,
        command: &str,
        action: &str,
    ) -> Result<Option<Intent>, BridgeError> {
        if command == "macro" {
            return Ok(Some(Intent::Macro(CommandName::new(action)?)));
        }

        let key = CommandKey::new(device.namespace().cloned(), CommandName::new(command)?);
        if !action.is_empty()
            && let Ok(handler) = key.handler(action)
            && self.commands.contains(&handler).await
        {
            return Ok(Some(Intent::Replay(handler)));
        }

        let rf = transceiver.supports_rf();
        let intent = match action {
            "" | "auto" => Intent::RecordOrReplay {
                key,
                band: Band::Ir,
            },
            "autorf" if rf => Intent::RecordOrReplay {
                key,
                band: Band::Rf,
            },
            "record" => Intent::Record {
                key,
                band: Band::Ir,
            },
            "recordrf" if rf => Intent::Record {
                key,
                band: Band::Rf,
            },
            "replay" => Intent::Replay(key),
            "macro" => Intent::Macro(key.name),
            _ => return Ok(None),
        };
        Ok(Some(intent))
    }

    async fn run(&self, device: &ManagedDevice<D>, intent: Intent) -> bool {
        tracing::debug!(device = %device.handle(), ?intent, "dispatching");
        match self.execute(device, intent).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(device = %device.handle(), error = ?err, "device operation failed");
                false
            }
        }
    }

    async fn execute(&self, device: &ManagedDevice<D>, intent: Intent) -> Result<(), BridgeError> {
        let transport = device.transport();
        match intent {
            Intent::Power { socket, on } => transport.set_power(socket, on).await?,
            Intent::State(fields) => transport.set_state(fields).await?,
            Intent::Motion(motion) => {
                transport.actuate(motion).await?;
                self.publish_position(device).await?;
            }
            Intent::MoveTo(percentage) => {
                transport.move_to(percentage).await?;
                self.publish_position(device).await?;
            }
            Intent::Replay(key) => self.commands.replay(transport, &key).await?,
            Intent::Record { key, band } => {
                let outcome = match band {
                    Band::Ir => self.commands.record(transport, &key).await?,
                    Band::Rf => self.commands.record_rf(transport, &key).await?,
                };
                tracing::debug!(?outcome, "learning finished");
            }
            Intent::RecordOrReplay { key, band } => {
                let outcome = self.commands.record_or_replay(transport, &key, band).await?;
                tracing::debug!(?outcome, "auto finished");
            }
            Intent::Macro(name) => {
                self.commands
                    .run_macro(transport, device.namespace(), &name)
                    .await?;
            }
        }
        Ok(())
    }

    async fn publish_position(&self, device: &ManagedDevice<D>) -> Result<(), BridgeError> {
        let position = device.transport().position().await?;
        self.publisher
            .publish(&device.topic(MetricKind::Position.topic()), position.to_string())
            .await
    }
}
