//! End-to-end tests for the full linkbridged stack.
//!
//! Each test wires the real router, command service, filesystem command
//! store and pollers around simulated devices. The bus is replaced by a
//! publisher that records every message, so no broker is needed.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use linkbridge_adapter_storage_fs::FsCommandStore;
use linkbridge_adapter_virtual::{LEARNED_SIGNAL, VirtualDevice};
use linkbridge_app::poller::{PollPlan, PollerSet};
use linkbridge_app::ports::{BusPublisher, DeviceTransport};
use linkbridge_app::registry::DeviceRegistry;
use linkbridge_app::router::{Dispatch, Routed, Router};
use linkbridge_app::services::command_service::{CommandService, LearningConfig, MacroPolicy};
use linkbridge_domain::command::Signal;
use linkbridge_domain::device::{DeviceHandle, DeviceKind, MacAddress};
use linkbridge_domain::error::BridgeError;
use linkbridge_domain::metric::MetricKind;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct Recorder {
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl Recorder {
    fn messages(&self) -> Vec<(String, String)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BusPublisher for Recorder {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BridgeError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), payload));
        Ok(())
    }
}

type Bridge = Router<VirtualDevice, FsCommandStore, Recorder>;
type Wired = (Bridge, Arc<DeviceRegistry<VirtualDevice>>, Recorder);

fn handle(kind: DeviceKind, last: u8) -> DeviceHandle {
    DeviceHandle::new(
        kind,
        format!("192.168.1.{last}"),
        MacAddress::new([0x34, 0xea, 0x34, 0, 0, last]),
    )
}

async fn ready(kind: DeviceKind) -> VirtualDevice {
    let device = VirtualDevice::new(kind);
    device.authenticate().await.unwrap();
    device
}

fn bridge(registry: DeviceRegistry<VirtualDevice>, root: &Path) -> Wired {
    let registry = Arc::new(registry);
    let commands = CommandService::new(
        FsCommandStore::new(root),
        LearningConfig::default(),
        MacroPolicy::Abort,
    );
    let recorder = Recorder::default();
    let router = Router::new(Arc::clone(&registry), Arc::new(commands), recorder.clone());
    (router, registry, recorder)
}

async fn single(kind: DeviceKind, root: &Path) -> Wired {
    bridge(
        DeviceRegistry::single("broadlink/", handle(kind, 10), ready(kind).await),
        root,
    )
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

// ---------------------------------------------------------------------------
// Record / replay
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_learn_unknown_command_then_replay_it() {
    let dir = TempDir::new().unwrap();
    let (router, registry, _) = single(DeviceKind::Rm, dir.path()).await;

    router.route("broadlink/tv/power", b"").await.join().await;

    let stored = std::fs::read_to_string(dir.path().join("commands/tv/power")).unwrap();
    assert_eq!(stored, "aabbccddee");
    assert!(registry.devices()[0].transport().sent().is_empty());

    router.route("broadlink/tv/power", b"").await.join().await;

    assert_eq!(
        registry.devices()[0].transport().sent(),
        vec![Signal::new(LEARNED_SIGNAL.to_vec())]
    );
}

#[tokio::test]
async fn should_replay_value_handler_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "commands/amplifier/input/hdmi", "0a0b");
    let (router, registry, _) = single(DeviceKind::RmMini, dir.path()).await;

    let routed = router.route("broadlink/amplifier/input", b"hdmi").await;

    assert!(matches!(routed, Routed::Dispatched(ref d) if matches!(d[..], [Dispatch::Done])));
    assert_eq!(
        registry.devices()[0].transport().sent(),
        vec![Signal::new(vec![0x0a, 0x0b])]
    );
}

#[tokio::test(start_paused = true)]
async fn should_run_stored_macro_in_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "commands/tv/power", "0102");
    write(dir.path(), "commands/light", "0304");
    write(dir.path(), "macros/evening", "# scene\ntv/power\npause 500\nlight\n");
    let (router, registry, _) = single(DeviceKind::Rm, dir.path()).await;

    router.route("broadlink/macro", b"evening").await.join().await;

    assert_eq!(
        registry.devices()[0].transport().sent(),
        vec![Signal::new(vec![1, 2]), Signal::new(vec![3, 4])]
    );
}

// ---------------------------------------------------------------------------
// Multi-device routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_broadcast_to_every_device() {
    let dir = TempDir::new().unwrap();
    let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
    registry
        .register("heater/", handle(DeviceKind::Sp2, 1), ready(DeviceKind::Sp2).await)
        .unwrap();
    registry
        .register("fan/", handle(DeviceKind::Sp1, 2), ready(DeviceKind::Sp1).await)
        .unwrap();
    let (router, registry, _) = bridge(registry, dir.path());

    router.route("broadlink/all/power", b"on").await;

    assert!(registry.devices().iter().all(|d| d.transport().is_on()));
}

#[tokio::test]
async fn should_keep_device_commands_in_their_namespace() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "commands/tv/power", "01");
    write(dir.path(), "commands/bedroom/tv/power", "02");
    let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
    registry
        .register("bedroom/", handle(DeviceKind::Rm, 1), ready(DeviceKind::Rm).await)
        .unwrap();
    registry
        .register("lounge/", handle(DeviceKind::Rm, 2), ready(DeviceKind::Rm).await)
        .unwrap();
    let (router, registry, _) = bridge(registry, dir.path());

    router.route("broadlink/bedroom/tv/power", b"replay").await;
    router.route("broadlink/lounge/tv/power", b"replay").await;

    assert_eq!(registry.devices()[0].transport().sent(), vec![Signal::new(vec![2])]);
    assert_eq!(registry.devices()[1].transport().sent(), vec![Signal::new(vec![1])]);
}

#[tokio::test]
async fn should_drop_message_for_unknown_device() {
    let dir = TempDir::new().unwrap();
    let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
    registry
        .register("heater/", handle(DeviceKind::Sp2, 1), ready(DeviceKind::Sp2).await)
        .unwrap();
    let (router, registry, _) = bridge(registry, dir.path());

    let routed = router.route("broadlink/garage/power", b"on").await;

    assert!(matches!(routed, Routed::Unresolved));
    assert!(!registry.devices()[0].transport().is_on());
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn should_publish_polled_readings_under_device_topic() {
    let dir = TempDir::new().unwrap();
    let mut registry = DeviceRegistry::multiple("broadlink/", "all/");
    registry
        .register("lounge/", handle(DeviceKind::Rm4, 1), ready(DeviceKind::Rm4).await)
        .unwrap();
    registry
        .register("strip/", handle(DeviceKind::Mp1, 2), ready(DeviceKind::Mp1).await)
        .unwrap();
    let (router, registry, recorder) = bridge(registry, dir.path());
    let plan = PollPlan::default()
        .every(MetricKind::Temperature, Duration::from_secs(60))
        .every(MetricKind::State, Duration::from_secs(60));
    router.route("broadlink/strip/power/3", b"on").await;

    let pollers = PollerSet::start(plan.jobs(&registry), &recorder);
    tokio::time::sleep(Duration::from_secs(61)).await;
    pollers.shutdown();

    let messages = recorder.messages();
    for expected in [
        ("broadlink/lounge/temperature", "23.5"),
        ("broadlink/strip/state/s1", "off"),
        ("broadlink/strip/state/s3", "on"),
    ] {
        assert!(
            messages
                .iter()
                .any(|(topic, payload)| topic == expected.0 && payload == expected.1),
            "missing {expected:?} in {messages:?}"
        );
    }
}

#[tokio::test]
async fn should_publish_curtain_position_after_move() {
    let dir = TempDir::new().unwrap();
    let (router, _, recorder) = single(DeviceKind::Dooya, dir.path()).await;

    router.route("broadlink/set", b"40").await.join().await;

    assert_eq!(
        recorder.messages(),
        vec![("broadlink/position".to_string(), "40".to_string())]
    );
}

#[tokio::test]
async fn should_ignore_own_telemetry_topics() {
    let dir = TempDir::new().unwrap();
    let (router, registry, _) = single(DeviceKind::Rm, dir.path()).await;

    let routed = router.route("broadlink/temperature", b"23.5").await;

    assert!(matches!(routed, Routed::Ignored));
    assert!(!dir.path().join("commands").exists());
    assert!(registry.devices()[0].transport().sent().is_empty());
}
