//! # linkbridge-adapter-virtual
//!
//! Virtual device transport that simulates devices for testing and
//! demonstration purposes.
//!
//! ## Simulated behaviour
//!
//! | Family | Behaviour |
//! |--------|-----------|
//! | `rm`, `rm4`, `rm_mini` | Learning yields `AABBCCDDEE`; RF sweeps lock on the second check; sent signals are recorded |
//! | `sp1`, `sp2`, `sp3s` | Relay on/off; energy reads `12.5` while on |
//! | `mp1` | Four sockets, state reported as `s1`..`s4` |
//! | `bg1` | State fields (`pwr`, `pwr1`, `pwr2`, ...) merged on write |
//! | `a1` | Fixed environment readings |
//! | `dooya` | Position in percent, starts at 33 |
//!
//! ## Dependency rule
//!
//! Depends on `linkbridge-app` (port traits) and `linkbridge-domain` only.

mod device;

use std::time::Duration;

use linkbridge_app::ports::DeviceProvider;
use linkbridge_domain::device::{DeviceHandle, DeviceKind, MacAddress};
use linkbridge_domain::error::DeviceError;

pub use device::{LEARNED_SIGNAL, VirtualDevice};

/// Provider of simulated devices.
///
/// Discovery returns a fresh device for every handle on the simulated
/// network; opening works for any handle, on the network or not.
#[derive(Debug, Clone)]
pub struct VirtualProvider {
    network: Vec<DeviceHandle>,
}

impl VirtualProvider {
    /// Provider whose discovery answers with `network`.
    #[must_use]
    pub fn new(network: Vec<DeviceHandle>) -> Self {
        Self { network }
    }

    /// Devices answering discovery.
    #[must_use]
    pub fn network(&self) -> &[DeviceHandle] {
        &self.network
    }
}

impl Default for VirtualProvider {
    /// A single IR/RF remote, like a bench setup with one device.
    fn default() -> Self {
        Self::new(vec![DeviceHandle::new(
            DeviceKind::Rm,
            "virtual",
            MacAddress::new([1, 2, 3, 4, 5, 6]),
        )])
    }
}

impl DeviceProvider for VirtualProvider {
    type Device = VirtualDevice;

    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<Vec<(DeviceHandle, VirtualDevice)>, DeviceError> {
        tracing::debug!(
            timeout_secs = timeout.as_secs(),
            found = self.network.len(),
            "virtual discovery"
        );
        Ok(self
            .network
            .iter()
            .map(|handle| (handle.clone(), VirtualDevice::new(handle.kind)))
            .collect())
    }

    fn open(&self, handle: &DeviceHandle) -> Result<VirtualDevice, DeviceError> {
        Ok(VirtualDevice::new(handle.kind))
    }
}

#[cfg(test)]
mod tests {
    use linkbridge_app::ports::DeviceTransport;

    use super::*;

    fn handle(kind: DeviceKind, last: u8) -> DeviceHandle {
        DeviceHandle::new(kind, format!("10.0.0.{last}"), MacAddress::new([0, 0, 0, 0, 0, last]))
    }

    #[tokio::test]
    async fn should_discover_every_device_on_network() {
        let provider = VirtualProvider::new(vec![
            handle(DeviceKind::Rm4, 1),
            handle(DeviceKind::Sp2, 2),
        ]);

        let found = provider.discover(Duration::from_secs(5)).await.unwrap();

        let kinds: Vec<_> = found.iter().map(|(h, d)| (h.kind, d.kind())).collect();
        assert_eq!(
            kinds,
            vec![(DeviceKind::Rm4, DeviceKind::Rm4), (DeviceKind::Sp2, DeviceKind::Sp2)]
        );
    }

    #[tokio::test]
    async fn should_discover_default_bench_remote() {
        let provider = VirtualProvider::default();

        let found = provider.discover(Duration::from_secs(1)).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.kind, DeviceKind::Rm);
        assert_eq!(found[0].0.mac.to_string(), "01:02:03:04:05:06");
    }

    #[tokio::test]
    async fn should_open_configured_device() {
        let provider = VirtualProvider::new(Vec::new());

        let device = provider.open(&handle(DeviceKind::Dooya, 9)).unwrap();

        device.authenticate().await.unwrap();
        assert_eq!(device.kind(), DeviceKind::Dooya);
        assert_eq!(device.position().await.unwrap(), 33);
    }
}
