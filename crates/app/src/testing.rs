//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use linkbridge_domain::command::{CommandKey, Signal};
use linkbridge_domain::device::Motion;
use linkbridge_domain::error::{BridgeError, DeviceError};
use linkbridge_domain::metric::MetricKind;
use serde_json::{Map, Value};

use crate::ports::{BusPublisher, CommandStore, DeviceTransport};

// ── Device ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Authenticate,
    Send(Vec<u8>),
    EnterLearning,
    Capture,
    Sweep,
    CheckFrequency,
    FindRfPacket,
    CancelSweep,
    ReadMetric(MetricKind),
    SetPower(Option<u8>, bool),
    SetState(Map<String, Value>),
    Actuate(Motion),
    MoveTo(u8),
    Position,
}

/// Scriptable device that records every call it receives.
#[derive(Default)]
pub(crate) struct FakeDevice {
    calls: Mutex<Vec<Call>>,
    captures: Mutex<VecDeque<Result<Option<Signal>, ()>>>,
    frequency_lock_after: Option<usize>,
    frequency_checks: Mutex<usize>,
    failing: bool,
    position: Mutex<u8>,
}

impl FakeDevice {
    /// A device whose every operation fails with an I/O error.
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Queue the results of successive `capture_signal` calls. Once the
    /// queue is empty the device reports "nothing captured".
    pub(crate) fn with_captures(captures: Vec<Result<Option<Signal>, ()>>) -> Self {
        Self {
            captures: Mutex::new(captures.into()),
            ..Self::default()
        }
    }

    /// Lock onto an RF frequency after `checks` frequency checks.
    pub(crate) fn locking_frequency_after(mut self, checks: usize) -> Self {
        self.frequency_lock_after = Some(checks);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), DeviceError> {
        lock(&self.calls).push(call);
        if self.failing {
            return Err(DeviceError::Io("fake device failure".into()));
        }
        Ok(())
    }
}

impl DeviceTransport for FakeDevice {
    async fn authenticate(&self) -> Result<(), DeviceError> {
        self.record(Call::Authenticate)
    }

    async fn send_signal(&self, signal: &Signal) -> Result<(), DeviceError> {
        self.record(Call::Send(signal.as_bytes().to_vec()))
    }

    async fn enter_learning(&self) -> Result<(), DeviceError> {
        self.record(Call::EnterLearning)
    }

    async fn capture_signal(&self) -> Result<Option<Signal>, DeviceError> {
        self.record(Call::Capture)?;
        match lock(&self.captures).pop_front() {
            Some(Ok(signal)) => Ok(signal),
            Some(Err(())) => Err(DeviceError::Timeout),
            None => Ok(None),
        }
    }

    async fn sweep_frequency(&self) -> Result<(), DeviceError> {
        self.record(Call::Sweep)
    }

    async fn check_frequency(&self) -> Result<bool, DeviceError> {
        self.record(Call::CheckFrequency)?;
        let mut checks = lock(&self.frequency_checks);
        *checks += 1;
        Ok(self.frequency_lock_after.is_some_and(|after| *checks >= after))
    }

    async fn find_rf_packet(&self) -> Result<(), DeviceError> {
        self.record(Call::FindRfPacket)
    }

    async fn cancel_sweep(&self) -> Result<(), DeviceError> {
        self.record(Call::CancelSweep)
    }

    async fn read_metric(&self, kind: MetricKind) -> Result<Value, DeviceError> {
        self.record(Call::ReadMetric(kind))?;
        Ok(match kind {
            MetricKind::Sensors => serde_json::json!({"humidity": 36, "light": "dim"}),
            MetricKind::State => serde_json::json!({"s1": true, "s2": false}),
            MetricKind::Position => serde_json::json!(*lock(&self.position)),
            _ => serde_json::json!(23.5),
        })
    }

    async fn set_power(&self, socket: Option<u8>, on: bool) -> Result<(), DeviceError> {
        self.record(Call::SetPower(socket, on))
    }

    async fn set_state(&self, fields: Map<String, Value>) -> Result<(), DeviceError> {
        self.record(Call::SetState(fields))
    }

    async fn actuate(&self, motion: Motion) -> Result<(), DeviceError> {
        self.record(Call::Actuate(motion))
    }

    async fn move_to(&self, percentage: u8) -> Result<(), DeviceError> {
        self.record(Call::MoveTo(percentage))?;
        *lock(&self.position) = percentage;
        Ok(())
    }

    async fn position(&self) -> Result<u8, DeviceError> {
        self.record(Call::Position)?;
        Ok(*lock(&self.position))
    }
}

// ── Command store ──────────────────────────────────────────────

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    signals: Arc<Mutex<HashMap<CommandKey, Signal>>>,
    macros: Arc<Mutex<HashMap<CommandKey, String>>>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, key: CommandKey, signal: Signal) {
        lock(&self.signals).insert(key, signal);
    }

    pub(crate) fn insert_macro(&self, key: CommandKey, text: &str) {
        lock(&self.macros).insert(key, text.to_string());
    }

    pub(crate) fn get(&self, key: &CommandKey) -> Option<Signal> {
        lock(&self.signals).get(key).cloned()
    }

    fn lookup<T: Clone>(map: &Mutex<HashMap<CommandKey, T>>, key: &CommandKey) -> Option<T> {
        let map = lock(map);
        map.get(key).or_else(|| map.get(&key.shared())).cloned()
    }
}

impl CommandStore for MemoryStore {
    async fn contains(&self, key: &CommandKey) -> bool {
        Self::lookup(&self.signals, key).is_some()
    }

    async fn load(&self, key: &CommandKey) -> Result<Option<Signal>, BridgeError> {
        Ok(Self::lookup(&self.signals, key))
    }

    async fn save(&self, key: &CommandKey, signal: &Signal) -> Result<(), BridgeError> {
        lock(&self.signals).insert(key.clone(), signal.clone());
        Ok(())
    }

    async fn load_macro(&self, key: &CommandKey) -> Result<Option<String>, BridgeError> {
        Ok(Self::lookup(&self.macros, key))
    }
}

// ── Bus ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub(crate) struct RecordingPublisher {
    messages: Arc<Mutex<Vec<(String, String)>>>,
    disconnected: bool,
}

impl RecordingPublisher {
    /// A publisher that rejects every message, like a bus that is down.
    pub(crate) fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    pub(crate) fn messages(&self) -> Vec<(String, String)> {
        lock(&self.messages).clone()
    }
}

impl BusPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BridgeError> {
        if self.disconnected {
            return Err(BridgeError::Bus(
                std::io::Error::other(format!("bus is down, dropping {topic}")).into(),
            ));
        }
        lock(&self.messages).push((topic.to_string(), payload));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
