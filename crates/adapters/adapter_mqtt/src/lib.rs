//! # linkbridge-adapter-mqtt
//!
//! MQTT adapter: connects the bridge to the message bus.
//!
//! ## Responsibilities
//! - Build the `rumqttc` connection options (credentials, TLS, keep-alive,
//!   last will) from [`MqttConfig`]
//! - Drive the event loop: subscribe and announce on every (re)connect,
//!   hand inbound publishes to the router, back off on connection errors
//! - Provide [`MqttPublisher`], the [`BusPublisher`](linkbridge_app::ports::BusPublisher)
//!   shared by the router and the pollers
//!
//! ## Dependency rule
//! Same as other adapters: depends on `linkbridge-app` and `linkbridge-domain`.

pub mod config;
pub mod error;
pub mod publisher;
pub mod session;

pub use config::MqttConfig;
pub use error::MqttError;
pub use publisher::MqttPublisher;
pub use session::{MqttLink, MqttSession, SessionState};
