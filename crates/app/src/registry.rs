//! Device registry: maps inbound topic suffixes onto managed devices.
//!
//! In single-device mode every topic belongs to the one device. In
//! multi-device mode each device owns a subprefix (`rm_abcdef/`), and the
//! reserved broadcast prefix (`all/` by default) addresses every device.

use std::sync::Arc;

use linkbridge_domain::command::CommandName;
use linkbridge_domain::device::DeviceHandle;
use linkbridge_domain::error::{NotFoundError, ValidationError};

/// One device owned by the registry, with the topic and storage scope
/// derived from its registration.
pub struct ManagedDevice<D> {
    handle: DeviceHandle,
    subprefix: String,
    topic_base: String,
    namespace: Option<CommandName>,
    transport: Arc<D>,
}

impl<D> Clone for ManagedDevice<D> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            subprefix: self.subprefix.clone(),
            topic_base: self.topic_base.clone(),
            namespace: self.namespace.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<D> ManagedDevice<D> {
    /// Identity of the device.
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Subprefix selecting this device (empty in single-device mode).
    pub fn subprefix(&self) -> &str {
        &self.subprefix
    }

    /// Full topic prefix for this device's outbound messages.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.topic_base)
    }

    /// Command store namespace of this device.
    pub fn namespace(&self) -> Option<&CommandName> {
        self.namespace.as_ref()
    }

    /// The transport used to talk to the device.
    pub fn transport(&self) -> &D {
        &self.transport
    }
}

/// Result of resolving a topic suffix.
pub enum Resolved<'a, D> {
    /// Exactly one device is addressed.
    One(&'a ManagedDevice<D>),
    /// The broadcast prefix addresses every device, in registration order.
    All(&'a [ManagedDevice<D>]),
}

enum Topology<D> {
    Single(ManagedDevice<D>),
    Multiple {
        devices: Vec<ManagedDevice<D>>,
        broadcast_prefix: String,
    },
}

/// Registry of every device the bridge manages.
pub struct DeviceRegistry<D> {
    prefix: String,
    topology: Topology<D>,
}

impl<D> DeviceRegistry<D> {
    /// Registry for a single device that answers every topic under `prefix`.
    pub fn single(prefix: impl Into<String>, handle: DeviceHandle, transport: D) -> Self {
        let prefix = prefix.into();
        let device = ManagedDevice {
            handle,
            subprefix: String::new(),
            topic_base: prefix.clone(),
            namespace: None,
            transport: Arc::new(transport),
        };
        Self {
            prefix,
            topology: Topology::Single(device),
        }
    }

    /// Empty multi-device registry.
    pub fn multiple(prefix: impl Into<String>, broadcast_prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            topology: Topology::Multiple {
                devices: Vec::new(),
                broadcast_prefix: broadcast_prefix.into(),
            },
        }
    }

    /// Add a device under `subprefix` (multi-device mode only).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSubprefix`] for empty subprefixes,
    /// subprefixes not ending in `/`, the broadcast prefix itself, or any use
    /// in single-device mode, and [`ValidationError::DuplicateSubprefix`]
    /// when another device already owns it.
    pub fn register(
        &mut self,
        subprefix: impl Into<String>,
        handle: DeviceHandle,
        transport: D,
    ) -> Result<(), ValidationError> {
        let subprefix = subprefix.into();
        let Topology::Multiple {
            devices,
            broadcast_prefix,
        } = &mut self.topology
        else {
            return Err(ValidationError::InvalidSubprefix(subprefix));
        };

        if subprefix.len() < 2 || !subprefix.ends_with('/') || subprefix == *broadcast_prefix {
            return Err(ValidationError::InvalidSubprefix(subprefix));
        }
        if devices.iter().any(|d| d.subprefix == subprefix) {
            return Err(ValidationError::DuplicateSubprefix(subprefix));
        }
        let namespace = CommandName::new(subprefix.trim_end_matches('/'))?;

        tracing::info!(device = %handle, subprefix = %subprefix, "device registered");
        devices.push(ManagedDevice {
            topic_base: format!("{}{subprefix}", self.prefix),
            handle,
            subprefix,
            namespace: Some(namespace),
            transport: Arc::new(transport),
        });
        Ok(())
    }

    /// Topic prefix shared by every device.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All devices in registration order.
    pub fn devices(&self) -> &[ManagedDevice<D>] {
        match &self.topology {
            Topology::Single(device) => std::slice::from_ref(device),
            Topology::Multiple { devices, .. } => devices,
        }
    }

    /// Number of managed devices.
    pub fn len(&self) -> usize {
        self.devices().len()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices().is_empty()
    }

    /// Resolve a topic suffix (the topic with the global prefix removed).
    ///
    /// Returns the addressed device(s) and the remaining command segment.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when no subprefix matches.
    pub fn resolve<'a>(
        &'a self,
        suffix: &'a str,
    ) -> Result<(Resolved<'a, D>, &'a str), NotFoundError> {
        match &self.topology {
            Topology::Single(device) => Ok((Resolved::One(device), suffix)),
            Topology::Multiple {
                devices,
                broadcast_prefix,
            } => {
                let best = devices
                    .iter()
                    .filter(|d| suffix.starts_with(d.subprefix.as_str()))
                    .max_by_key(|d| d.subprefix.len());
                if let Some(device) = best {
                    if device.subprefix.len() >= broadcast_prefix.len()
                        || !suffix.starts_with(broadcast_prefix.as_str())
                    {
                        return Ok((Resolved::One(device), &suffix[device.subprefix.len()..]));
                    }
                }
                if let Some(rest) = suffix.strip_prefix(broadcast_prefix.as_str()) {
                    return Ok((Resolved::All(devices), rest));
                }
                Err(NotFoundError {
                    entity: "Device",
                    id: suffix.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkbridge_domain::device::{DeviceKind, MacAddress};

    fn handle(kind: DeviceKind, last: u8) -> DeviceHandle {
        DeviceHandle::new(kind, "10.0.0.1", MacAddress::new([0, 0, 0, 0, 0, last]))
    }

    fn two_devices() -> DeviceRegistry<&'static str> {
        let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
        registry
            .register("rm/", handle(DeviceKind::Rm, 1), "remote")
            .unwrap();
        registry
            .register("sp/", handle(DeviceKind::Sp2, 2), "plug")
            .unwrap();
        registry
    }

    fn resolve_one<'a>(
        registry: &'a DeviceRegistry<&'static str>,
        suffix: &'a str,
    ) -> (&'static str, &'a str) {
        match registry.resolve(suffix).unwrap() {
            (Resolved::One(device), rest) => (*device.transport(), rest),
            (Resolved::All(_), _) => panic!("expected a single device"),
        }
    }

    #[test]
    fn should_resolve_everything_to_single_device() {
        let registry = DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), "only");
        let (device, rest) = resolve_one(&registry, "tv/power");
        assert_eq!(device, "only");
        assert_eq!(rest, "tv/power");
        assert_eq!(registry.devices()[0].topic("temperature"), "broadlink/temperature");
        assert!(registry.devices()[0].namespace().is_none());
    }

    #[test]
    fn should_strip_matching_subprefix() {
        let registry = two_devices();
        assert_eq!(resolve_one(&registry, "rm/power"), ("remote", "power"));
        assert_eq!(resolve_one(&registry, "sp/power"), ("plug", "power"));
    }

    #[test]
    fn should_prefer_longest_subprefix() {
        let mut registry = two_devices();
        registry
            .register("rm/kitchen/", handle(DeviceKind::Rm4, 3), "kitchen")
            .unwrap();
        assert_eq!(resolve_one(&registry, "rm/kitchen/tv"), ("kitchen", "tv"));
        assert_eq!(resolve_one(&registry, "rm/tv"), ("remote", "tv"));
    }

    #[test]
    fn should_resolve_broadcast_to_all_devices_in_order() {
        let registry = two_devices();
        let (resolved, rest) = registry.resolve("all/power").unwrap();
        assert_eq!(rest, "power");
        let Resolved::All(devices) = resolved else {
            panic!("expected broadcast");
        };
        let names: Vec<_> = devices.iter().map(|d| *d.transport()).collect();
        assert_eq!(names, vec!["remote", "plug"]);
    }

    #[test]
    fn should_report_unknown_device_reference() {
        let registry = two_devices();
        let err = registry.resolve("tv/power").err().unwrap();
        assert_eq!(err.entity, "Device");
        assert_eq!(err.id, "tv/power");
    }

    #[test]
    fn should_reject_duplicate_subprefix() {
        let mut registry = two_devices();
        let err = registry
            .register("rm/", handle(DeviceKind::Rm4, 9), "dup")
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateSubprefix("rm/".into()));
    }

    #[test]
    fn should_reject_malformed_subprefixes() {
        let mut registry = two_devices();
        for bad in ["", "/", "rm", "all/"] {
            assert!(
                registry
                    .register(bad, handle(DeviceKind::Rm, 7), "bad")
                    .is_err(),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn should_reject_registration_in_single_mode() {
        let mut registry =
            DeviceRegistry::single("broadlink/", handle(DeviceKind::Rm, 1), "only");
        assert!(
            registry
                .register("sp/", handle(DeviceKind::Sp1, 2), "plug")
                .is_err()
        );
    }

    #[test]
    fn should_derive_topic_base_and_namespace() {
        let registry = two_devices();
        let device = &registry.devices()[0];
        assert_eq!(device.topic("temperature"), "broadlink/rm/temperature");
        assert_eq!(device.namespace().unwrap().as_str(), "rm");
        assert_eq!(registry.len(), 2);
    }
}
