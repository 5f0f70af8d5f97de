//! Use-case services.

pub mod command_service;
