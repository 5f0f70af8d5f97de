//! # linkbridge-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceTransport` / `DeviceProvider`: talk to and discover devices
//!   - `CommandStore`: keyed storage of captured signals and macros
//!   - `BusPublisher`: publish telemetry on the message bus
//! - Own the **device registry** that maps topic subprefixes onto devices
//! - Provide the **router** that turns inbound bus messages into device calls
//! - Provide the **command service** (record/replay, macros) and the
//!   **metric pollers**
//!
//! ## Dependency rule
//! Depends on `linkbridge-domain` only (plus `tokio` for timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod poller;
pub mod ports;
pub mod registry;
pub mod router;
pub mod services;

#[cfg(test)]
mod testing;
