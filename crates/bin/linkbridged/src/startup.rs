//! Startup: turns the device configuration into a populated registry.
//!
//! Devices come from `devices.list` when it is non-empty, otherwise from
//! discovery. Every device is authenticated before the registry is built, so
//! a device that cannot be reached stops the bridge before it touches the
//! bus.

use linkbridge_app::ports::{DeviceProvider, DeviceTransport};
use linkbridge_app::registry::DeviceRegistry;
use linkbridge_domain::device::{DeviceHandle, DeviceKind, MacAddress};
use linkbridge_domain::error::{DeviceError, ValidationError};

use crate::config::{Config, DeviceEntry, DeviceMode};

/// Fatal errors while preparing the bridge.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// A `devices.list` entry has an unknown type or a malformed MAC.
    #[error("invalid device entry #{index}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: ValidationError,
    },

    /// The discovery broadcast failed.
    #[error("device discovery failed")]
    Discovery(#[source] DeviceError),

    /// Discovery found nothing.
    #[error("no device found")]
    NoDevice,

    /// Single-device mode found more than one device.
    #[error("more than one device found ({})", hosts.join(", "))]
    Ambiguous { hosts: Vec<String> },

    /// A configured device could not be opened.
    #[error("failed to open {device}")]
    Open {
        device: DeviceHandle,
        #[source]
        source: DeviceError,
    },

    /// A device rejected the authentication handshake.
    #[error("failed to authenticate {device}")]
    Auth {
        device: DeviceHandle,
        #[source]
        source: DeviceError,
    },

    /// Two devices share a subprefix, or a subprefix is malformed.
    #[error("invalid device topology")]
    Topology(#[from] ValidationError),

    /// The bus connection could not be configured.
    #[error("failed to configure the MQTT connection")]
    Mqtt(#[from] linkbridge_adapter_mqtt::MqttError),
}

struct Candidate<D> {
    handle: DeviceHandle,
    subprefix: Option<String>,
    transport: D,
}

/// Parse a configured device entry into a handle.
///
/// # Errors
///
/// Returns the validation error of the type or the MAC address.
pub fn parse_entry(entry: &DeviceEntry) -> Result<DeviceHandle, ValidationError> {
    let kind: DeviceKind = entry.kind.parse()?;
    let mac: MacAddress = entry.mac.parse()?;
    Ok(DeviceHandle::new(kind, entry.host.clone(), mac))
}

/// Open or discover, authenticate and register every device.
///
/// # Errors
///
/// Returns a [`StartupError`] for bad entries, failed discovery, an
/// ambiguous single-device setup, unreachable devices, and conflicting
/// subprefixes.
#[tracing::instrument(skip_all, fields(mode = ?config.devices.mode))]
pub async fn build_registry<P>(
    provider: &P,
    config: &Config,
) -> Result<DeviceRegistry<P::Device>, StartupError>
where
    P: DeviceProvider,
{
    let candidates = if config.devices.list.is_empty() {
        discover(provider, config).await?
    } else {
        open_configured(provider, &config.devices.list)?
    };

    if config.devices.mode == DeviceMode::Single && candidates.len() > 1 {
        return Err(StartupError::Ambiguous {
            hosts: candidates.iter().map(|c| c.handle.host.clone()).collect(),
        });
    }

    for candidate in &candidates {
        candidate
            .transport
            .authenticate()
            .await
            .map_err(|source| StartupError::Auth {
                device: candidate.handle.clone(),
                source,
            })?;
        tracing::info!(device = %candidate.handle, "device ready");
    }

    let prefix = config.mqtt.topic_prefix.as_str();
    match config.devices.mode {
        DeviceMode::Single => {
            let candidate = candidates.into_iter().next().ok_or(StartupError::NoDevice)?;
            Ok(DeviceRegistry::single(
                prefix,
                candidate.handle,
                candidate.transport,
            ))
        }
        DeviceMode::Multiple => {
            if candidates.is_empty() {
                return Err(StartupError::NoDevice);
            }
            let mut registry =
                DeviceRegistry::multiple(prefix, config.devices.broadcast_prefix.as_str());
            for candidate in candidates {
                let subprefix = candidate
                    .subprefix
                    .unwrap_or_else(|| candidate.handle.subprefix(&config.devices.subprefix_format));
                registry.register(subprefix, candidate.handle, candidate.transport)?;
            }
            Ok(registry)
        }
    }
}

async fn discover<P>(
    provider: &P,
    config: &Config,
) -> Result<Vec<Candidate<P::Device>>, StartupError>
where
    P: DeviceProvider,
{
    let timeout = config.discovery_timeout();
    tracing::info!(timeout_secs = timeout.as_secs(), "discovering devices");
    let found = provider
        .discover(timeout)
        .await
        .map_err(StartupError::Discovery)?;
    if found.is_empty() {
        return Err(StartupError::NoDevice);
    }
    Ok(found
        .into_iter()
        .map(|(handle, transport)| Candidate {
            handle,
            subprefix: None,
            transport,
        })
        .collect())
}

fn open_configured<P>(
    provider: &P,
    entries: &[DeviceEntry],
) -> Result<Vec<Candidate<P::Device>>, StartupError>
where
    P: DeviceProvider,
{
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let handle =
                parse_entry(entry).map_err(|source| StartupError::InvalidEntry { index, source })?;
            let transport = provider
                .open(&handle)
                .map_err(|source| StartupError::Open {
                    device: handle.clone(),
                    source,
                })?;
            Ok(Candidate {
                handle,
                subprefix: entry.subprefix.clone(),
                transport,
            })
        })
        .collect()
}
