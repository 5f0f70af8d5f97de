//! Device port: the capability interface every device transport satisfies.
//!
//! The byte-level protocol (discovery handshake, encryption, per-family
//! command encoding) lives behind this boundary. One transport type serves
//! every family; which operations make sense for a given device is decided
//! by the [`Capabilities`](linkbridge_domain::device::Capabilities) of its
//! kind, and the default implementations reject everything else with
//! [`DeviceError::Unsupported`].

use std::future::Future;
use std::time::Duration;

use linkbridge_domain::command::Signal;
use linkbridge_domain::device::{DeviceHandle, Motion};
use linkbridge_domain::error::DeviceError;
use linkbridge_domain::metric::MetricKind;

/// Operations on one connected device.
///
/// Methods take `&self`: pollers and the router call into the same device
/// concurrently, so implementations must serialise access to the wire
/// themselves when the hardware requires it.
pub trait DeviceTransport: Send + Sync {
    /// Perform the authentication handshake.
    fn authenticate(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Transmit a previously captured IR/RF signal.
    fn send_signal(&self, _signal: &Signal) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("send_signal")) }
    }

    /// Put the device into IR learning mode.
    fn enter_learning(&self) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("enter_learning")) }
    }

    /// Fetch a captured signal, if the device has one.
    fn capture_signal(&self) -> impl Future<Output = Result<Option<Signal>, DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("capture_signal")) }
    }

    /// Start sweeping for an RF carrier frequency.
    fn sweep_frequency(&self) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("sweep_frequency")) }
    }

    /// Whether the sweep has locked onto a frequency.
    fn check_frequency(&self) -> impl Future<Output = Result<bool, DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("check_frequency")) }
    }

    /// After a frequency lock, start listening for the RF packet itself.
    fn find_rf_packet(&self) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("find_rf_packet")) }
    }

    /// Abort a running frequency sweep.
    fn cancel_sweep(&self) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("cancel_sweep")) }
    }

    /// Read one metric. Scalars come back as JSON numbers, structured
    /// readings as JSON objects.
    fn read_metric(
        &self,
        _kind: MetricKind,
    ) -> impl Future<Output = Result<serde_json::Value, DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("read_metric")) }
    }

    /// Switch power. `socket` is `None` for single-relay devices and the
    /// 1-based socket index for strips.
    fn set_power(
        &self,
        _socket: Option<u8>,
        _on: bool,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("set_power")) }
    }

    /// Write named state fields (e.g. `{"pwr1": 1}`).
    fn set_state(
        &self,
        _fields: serde_json::Map<String, serde_json::Value>,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("set_state")) }
    }

    /// Start or stop an actuator motion.
    fn actuate(&self, _motion: Motion) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("actuate")) }
    }

    /// Move an actuator to `percentage` and resolve once it has arrived.
    fn move_to(&self, _percentage: u8) -> impl Future<Output = Result<(), DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("move_to")) }
    }

    /// Current actuator position in percent.
    fn position(&self) -> impl Future<Output = Result<u8, DeviceError>> + Send {
        async { Err(DeviceError::Unsupported("position")) }
    }
}

/// Source of device transports: discovery on the local network, or opening
/// a device whose identity is already known from configuration.
pub trait DeviceProvider: Send + Sync {
    /// The transport type this provider hands out.
    type Device: DeviceTransport + 'static;

    /// Broadcast a discovery probe and collect every device that answers
    /// within `timeout`.
    fn discover(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<(DeviceHandle, Self::Device)>, DeviceError>> + Send;

    /// Open a transport to a configured device. Does not authenticate.
    ///
    /// # Errors
    ///
    /// Returns a device error if the transport cannot be created.
    fn open(&self, handle: &DeviceHandle) -> Result<Self::Device, DeviceError>;
}
