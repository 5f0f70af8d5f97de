//! Simulated device: answers like real hardware of its kind would.
//!
//! Operations outside the kind's capabilities fail with
//! [`DeviceError::Unsupported`], and every operation except
//! `authenticate` fails with [`DeviceError::Auth`] until the handshake has
//! been done.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};

use linkbridge_app::ports::DeviceTransport;
use linkbridge_domain::command::Signal;
use linkbridge_domain::device::{Capabilities, DeviceKind, Motion, PowerControl};
use linkbridge_domain::error::DeviceError;
use linkbridge_domain::metric::MetricKind;

/// Signal every simulated remote "captures" while learning.
pub const LEARNED_SIGNAL: [u8; 5] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

/// Frequency checks a sweep needs before it locks.
const CHECKS_UNTIL_LOCK: u32 = 2;

#[derive(Debug)]
struct State {
    authenticated: bool,
    learning: bool,
    sweep_checks: Option<u32>,
    sent: Vec<Signal>,
    power: bool,
    sockets: Vec<bool>,
    fields: Map<String, Value>,
    position: u8,
}

/// A simulated device of one family.
#[derive(Debug)]
pub struct VirtualDevice {
    kind: DeviceKind,
    state: Mutex<State>,
}

impl VirtualDevice {
    /// Create a device in its power-on state.
    #[must_use]
    pub fn new(kind: DeviceKind) -> Self {
        let sockets = match kind.capabilities().power {
            PowerControl::MultiSocket { sockets } => vec![false; usize::from(sockets)],
            _ => Vec::new(),
        };
        let fields = if kind == DeviceKind::Bg1 {
            [("pwr", 1), ("pwr1", 1), ("pwr2", 0), ("maxworktime", 60), ("idcbrightness", 50)]
                .into_iter()
                .map(|(name, value)| (name.to_string(), Value::from(value)))
                .collect()
        } else {
            Map::new()
        };
        Self {
            kind,
            state: Mutex::new(State {
                authenticated: false,
                learning: false,
                sweep_checks: None,
                sent: Vec::new(),
                power: false,
                sockets,
                fields,
                position: 33,
            }),
        }
    }

    /// Device family.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Every signal transmitted so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Signal> {
        self.lock().sent.clone()
    }

    /// Relay state of a single-relay device.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.lock().power
    }

    /// Relay state of every socket of a strip.
    #[must_use]
    pub fn sockets(&self) -> Vec<bool> {
        self.lock().sockets.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state after checking authentication and `supported`.
    fn session(
        &self,
        operation: &'static str,
        supported: bool,
    ) -> Result<MutexGuard<'_, State>, DeviceError> {
        if !supported {
            return Err(DeviceError::Unsupported(operation));
        }
        let state = self.lock();
        if !state.authenticated {
            return Err(DeviceError::Auth);
        }
        Ok(state)
    }

    fn has_transceiver(&self) -> bool {
        self.capabilities().transceiver.is_some()
    }

    fn has_rf(&self) -> bool {
        self.capabilities()
            .transceiver
            .is_some_and(|transceiver| transceiver.supports_rf())
    }
}

impl DeviceTransport for VirtualDevice {
    async fn authenticate(&self) -> Result<(), DeviceError> {
        self.lock().authenticated = true;
        tracing::debug!(kind = %self.kind, "virtual device authenticated");
        Ok(())
    }

    async fn send_signal(&self, signal: &Signal) -> Result<(), DeviceError> {
        let mut state = self.session("send_signal", self.has_transceiver())?;
        state.sent.push(signal.clone());
        Ok(())
    }

    async fn enter_learning(&self) -> Result<(), DeviceError> {
        self.session("enter_learning", self.has_transceiver())?.learning = true;
        Ok(())
    }

    async fn capture_signal(&self) -> Result<Option<Signal>, DeviceError> {
        let mut state = self.session("capture_signal", self.has_transceiver())?;
        if !state.learning {
            return Ok(None);
        }
        state.learning = false;
        Ok(Some(Signal::new(LEARNED_SIGNAL.to_vec())))
    }

    async fn sweep_frequency(&self) -> Result<(), DeviceError> {
        self.session("sweep_frequency", self.has_rf())?.sweep_checks = Some(0);
        Ok(())
    }

    async fn check_frequency(&self) -> Result<bool, DeviceError> {
        let mut state = self.session("check_frequency", self.has_rf())?;
        let Some(checks) = state.sweep_checks.as_mut() else {
            return Ok(false);
        };
        *checks += 1;
        Ok(*checks >= CHECKS_UNTIL_LOCK)
    }

    async fn find_rf_packet(&self) -> Result<(), DeviceError> {
        let mut state = self.session("find_rf_packet", self.has_rf())?;
        state.sweep_checks = None;
        state.learning = true;
        Ok(())
    }

    async fn cancel_sweep(&self) -> Result<(), DeviceError> {
        self.session("cancel_sweep", self.has_rf())?.sweep_checks = None;
        Ok(())
    }

    async fn read_metric(&self, kind: MetricKind) -> Result<Value, DeviceError> {
        let state = self.session("read_metric", self.capabilities().metrics.contains(&kind))?;
        Ok(match kind {
            MetricKind::Temperature => json!(23.5),
            MetricKind::Humidity => json!(56),
            MetricKind::Energy => json!(if state.power { 12.5 } else { 0.0 }),
            MetricKind::Sensors => json!({
                "temperature": 23.5,
                "humidity": 36,
                "light": "dim",
                "air_quality": "normal",
                "noise": "noisy",
            }),
            MetricKind::State if self.kind == DeviceKind::Bg1 => Value::Object(state.fields.clone()),
            MetricKind::State => Value::Object(
                state
                    .sockets
                    .iter()
                    .enumerate()
                    .map(|(index, on)| (format!("s{}", index + 1), Value::Bool(*on)))
                    .collect(),
            ),
            MetricKind::Position => json!(state.position),
        })
    }

    async fn set_power(&self, socket: Option<u8>, on: bool) -> Result<(), DeviceError> {
        let power = self.capabilities().power;
        let supported = matches!(
            (power, socket),
            (PowerControl::Single, None) | (PowerControl::MultiSocket { .. }, Some(_))
        );
        let mut state = self.session("set_power", supported)?;
        match socket {
            None => state.power = on,
            Some(index) => {
                let slot = usize::from(index)
                    .checked_sub(1)
                    .and_then(|i| state.sockets.get_mut(i))
                    .ok_or_else(|| DeviceError::Io(format!("no socket {index}").into()))?;
                *slot = on;
            }
        }
        Ok(())
    }

    async fn set_state(&self, fields: Map<String, Value>) -> Result<(), DeviceError> {
        let supported = self.capabilities().power == PowerControl::Fields;
        self.session("set_state", supported)?.fields.extend(fields);
        Ok(())
    }

    async fn actuate(&self, motion: Motion) -> Result<(), DeviceError> {
        let mut state = self.session("actuate", self.capabilities().actuator)?;
        match motion {
            Motion::Open => state.position = 100,
            Motion::Close => state.position = 0,
            Motion::Stop => {}
        }
        Ok(())
    }

    async fn move_to(&self, percentage: u8) -> Result<(), DeviceError> {
        self.session("move_to", self.capabilities().actuator)?.position = percentage.min(100);
        Ok(())
    }

    async fn position(&self) -> Result<u8, DeviceError> {
        Ok(self.session("position", self.capabilities().actuator)?.position)
    }
}
