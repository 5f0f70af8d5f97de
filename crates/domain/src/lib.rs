//! # linkbridge-domain
//!
//! Pure domain model for the linkbridge MQTT-to-device bridge.
//!
//! ## Responsibilities
//! - Foundational types: error taxonomy, validated names
//! - Define **device kinds** and the **capabilities** derived from them
//! - Define **commands**, **signals** and **macro scripts**
//! - Define **metrics** and how readings render onto topics
//! - Parse inbound topics and payloads
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;

pub mod command;
pub mod device;
pub mod macro_script;
pub mod metric;
pub mod topic;
