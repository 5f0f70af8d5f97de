//! Command service: record/replay of IR/RF signals and macro execution.
//!
//! Learning follows `Idle → Learning → (Captured | TimedOut)`: the device is
//! put into learning mode, then sampled at a fixed period until a deadline.
//! Read errors while sampling are expected (the device answers "no data
//! yet" with an error on some firmware) and do not end the session.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use linkbridge_domain::command::{CommandKey, CommandName, Signal};
use linkbridge_domain::error::{BridgeError, NotFoundError};
use linkbridge_domain::macro_script::{self, MacroStep};

use crate::ports::{CommandStore, DeviceTransport};

/// Timing of learning sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearningConfig {
    /// How many times the device is sampled for a captured signal.
    pub capture_attempts: u32,
    /// Delay before each sample.
    pub capture_period: Duration,
    /// How long to wait for an RF frequency lock.
    pub rf_sweep_timeout: Duration,
    /// Delay between frequency checks.
    pub rf_sweep_poll: Duration,
    /// Pause between the frequency lock and packet capture, giving the user
    /// time to release the button.
    pub rf_settle: Duration,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            capture_attempts: 6,
            capture_period: Duration::from_secs(5),
            rf_sweep_timeout: Duration::from_secs(20),
            rf_sweep_poll: Duration::from_secs(1),
            rf_settle: Duration::from_secs(5),
        }
    }
}

/// What to do with the rest of a macro when one of its commands fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroPolicy {
    /// Stop at the first failing line.
    #[default]
    Abort,
    /// Log the failure and carry on with the next line.
    Continue,
}

/// Signal band to learn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Ir,
    Rf,
}

/// Result of a learning or auto operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// A stored signal was sent; nothing was learned.
    Replayed,
    /// A signal of this many bytes was captured and stored.
    Captured(usize),
    /// Nothing was captured before the deadline; nothing was stored.
    TimedOut,
}

/// Counts of a finished macro run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacroReport {
    /// Commands sent successfully.
    pub replayed: usize,
    /// Commands that failed (only non-zero with [`MacroPolicy::Continue`]).
    pub failed: usize,
}

/// Application service for stored commands.
pub struct CommandService<S> {
    store: S,
    learning: LearningConfig,
    macro_policy: MacroPolicy,
}

impl<S: CommandStore> CommandService<S> {
    /// Create a new service backed by the given store.
    pub fn new(store: S, learning: LearningConfig, macro_policy: MacroPolicy) -> Self {
        Self {
            store,
            learning,
            macro_policy,
        }
    }

    /// Whether a signal is stored under `key`.
    pub async fn contains(&self, key: &CommandKey) -> bool {
        self.store.contains(key).await
    }

    /// Send the signal stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when nothing is stored under `key`,
    /// or the store or device error.
    #[tracing::instrument(skip(self, device, key), fields(command = %key))]
    pub async fn replay<D: DeviceTransport>(
        &self,
        device: &D,
        key: &CommandKey,
    ) -> Result<(), BridgeError> {
        let signal = self.store.load(key).await?.ok_or_else(|| NotFoundError {
            entity: "Command",
            id: key.to_string(),
        })?;
        device.send_signal(&signal).await?;
        tracing::debug!(bytes = signal.len(), "command replayed");
        Ok(())
    }

    /// Learn an IR signal and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns the device error if learning mode cannot be entered, or the
    /// store error if the captured signal cannot be written. Running out of
    /// time is not an error.
    #[tracing::instrument(skip(self, device, key), fields(command = %key))]
    pub async fn record<D: DeviceTransport>(
        &self,
        device: &D,
        key: &CommandKey,
    ) -> Result<LearnOutcome, BridgeError> {
        device.enter_learning().await?;
        tracing::info!("learning mode entered, waiting for a signal");
        self.capture_and_store(device, key).await
    }

    /// Learn an RF signal: lock onto the carrier frequency, then capture.
    ///
    /// # Errors
    ///
    /// Same as [`record`](Self::record).
    #[tracing::instrument(skip(self, device, key), fields(command = %key))]
    pub async fn record_rf<D: DeviceTransport>(
        &self,
        device: &D,
        key: &CommandKey,
    ) -> Result<LearnOutcome, BridgeError> {
        device.sweep_frequency().await?;
        tracing::info!("detecting RF frequency, press and hold the button to learn");

        if !self.wait_for_frequency(device).await {
            tracing::warn!("RF frequency not found");
            device.cancel_sweep().await?;
            return Ok(LearnOutcome::TimedOut);
        }

        tracing::info!("RF frequency found, release the button and press it once more");
        tokio::time::sleep(self.learning.rf_settle).await;
        device.find_rf_packet().await?;
        self.capture_and_store(device, key).await
    }

    /// Replay `key` if it is stored, learn it otherwise.
    ///
    /// # Errors
    ///
    /// Propagates replay or learning errors.
    pub async fn record_or_replay<D: DeviceTransport>(
        &self,
        device: &D,
        key: &CommandKey,
        band: Band,
    ) -> Result<LearnOutcome, BridgeError> {
        if self.store.contains(key).await {
            self.replay(device, key).await?;
            return Ok(LearnOutcome::Replayed);
        }
        match band {
            Band::Ir => self.record(device, key).await,
            Band::Rf => self.record_rf(device, key).await,
        }
    }

    /// Run the macro `name`, replaying its commands in the same namespace.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] for a missing macro, a validation
    /// error for a malformed one, and, under [`MacroPolicy::Abort`], the
    /// first failing replay.
    #[tracing::instrument(skip(self, device, namespace))]
    pub async fn run_macro<D: DeviceTransport>(
        &self,
        device: &D,
        namespace: Option<&CommandName>,
        name: &CommandName,
    ) -> Result<MacroReport, BridgeError> {
        let key = CommandKey::new(namespace.cloned(), name.clone());
        let text = self
            .store
            .load_macro(&key)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Macro",
                id: key.to_string(),
            })?;
        let steps = macro_script::parse(&text)?;

        let mut report = MacroReport::default();
        for step in steps {
            match step {
                MacroStep::Pause(duration) => tokio::time::sleep(duration).await,
                MacroStep::Replay(command) => {
                    let key = CommandKey::new(namespace.cloned(), command);
                    match self.replay(device, &key).await {
                        Ok(()) => report.replayed += 1,
                        Err(err) if self.macro_policy == MacroPolicy::Continue => {
                            tracing::warn!(command = %key, error = ?err, "macro step failed");
                            report.failed += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        tracing::info!(replayed = report.replayed, failed = report.failed, "macro finished");
        Ok(report)
    }

    async fn wait_for_frequency<D: DeviceTransport>(&self, device: &D) -> bool {
        let started = Instant::now();
        loop {
            match device.check_frequency().await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => tracing::debug!(%err, "frequency check failed"),
            }
            if started.elapsed() >= self.learning.rf_sweep_timeout {
                return false;
            }
            tokio::time::sleep(self.learning.rf_sweep_poll).await;
        }
    }

    async fn capture<D: DeviceTransport>(&self, device: &D) -> Option<Signal> {
        for _ in 0..self.learning.capture_attempts {
            tokio::time::sleep(self.learning.capture_period).await;
            match device.capture_signal().await {
                Ok(Some(signal)) => return Some(signal),
                Ok(None) => {}
                Err(err) => tracing::debug!(%err, "no signal read yet"),
            }
        }
        None
    }

    async fn capture_and_store<D: DeviceTransport>(
        &self,
        device: &D,
        key: &CommandKey,
    ) -> Result<LearnOutcome, BridgeError> {
        let Some(signal) = self.capture(device).await else {
            tracing::warn!("no signal received, nothing stored");
            return Ok(LearnOutcome::TimedOut);
        };
        self.store.save(key, &signal).await?;
        tracing::info!(bytes = signal.len(), "command recorded");
        Ok(LearnOutcome::Captured(signal.len()))
    }
}
