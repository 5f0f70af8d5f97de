//! Command store port: persistence for captured signals and macro scripts.

use std::future::Future;

use linkbridge_domain::command::{CommandKey, Signal};
use linkbridge_domain::error::BridgeError;

/// Keyed storage of raw signals and macro definitions.
///
/// Implementations guarantee one payload per key and atomic replacement:
/// a concurrent reader sees the previous or the new signal, never a
/// partial write. Lookups of a namespaced key fall back to the shared root.
pub trait CommandStore: Send + Sync + 'static {
    /// Whether a signal is stored under `key`.
    fn contains(&self, key: &CommandKey) -> impl Future<Output = bool> + Send;

    /// Load the signal stored under `key`.
    fn load(
        &self,
        key: &CommandKey,
    ) -> impl Future<Output = Result<Option<Signal>, BridgeError>> + Send;

    /// Store `signal` under `key`, replacing any previous one.
    fn save(
        &self,
        key: &CommandKey,
        signal: &Signal,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Load the text of the macro named by `key`.
    fn load_macro(
        &self,
        key: &CommandKey,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send;
}
