//! # linkbridged: MQTT bridge daemon
//!
//! Composition root that wires all adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialise logging
//! - Discover or open the configured devices and authenticate them
//! - Construct the command store, the command service, the router and the
//!   metric pollers, injecting the shared bus publisher
//! - Run the MQTT session until SIGTERM/SIGINT
//!
//! ## Exit status
//! `0` after a clean shutdown, `2` when configuration or startup fails.
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod startup;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use linkbridge_adapter_mqtt::MqttLink;
use linkbridge_adapter_storage_fs::FsCommandStore;
use linkbridge_adapter_virtual::VirtualProvider;
use linkbridge_app::poller::PollerSet;
use linkbridge_app::ports::DeviceProvider;
use linkbridge_app::router::Router;
use linkbridge_app::services::command_service::CommandService;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, TransportKind};
use crate::startup::StartupError;

const EXIT_MISCONFIGURED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("linkbridged: {}", chain(&err));
            return ExitCode::from(EXIT_MISCONFIGURED);
        }
    };

    let filter = match EnvFilter::try_new(&config.logging.filter) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!(
                "linkbridged: invalid log filter {:?}: {err}",
                config.logging.filter
            );
            return ExitCode::from(EXIT_MISCONFIGURED);
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match config.devices.transport {
        TransportKind::Virtual => run(&config, &VirtualProvider::default()).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %chain(&err), "startup failed");
            ExitCode::from(EXIT_MISCONFIGURED)
        }
    }
}

async fn run<P: DeviceProvider>(config: &Config, provider: &P) -> Result<(), StartupError> {
    let registry = Arc::new(startup::build_registry(provider, config).await?);

    // Command store and services
    let store = FsCommandStore::new(&config.commands.root);
    let commands = Arc::new(CommandService::new(
        store,
        config.learning.to_learning_config(),
        config.commands.macro_policy,
    ));

    // Bus
    let link = MqttLink::new(&config.mqtt)?;
    let publisher = link.publisher();

    let router = Router::new(Arc::clone(&registry), commands, publisher.clone());
    let pollers = PollerSet::start(config.polling.plan().jobs(&registry), &publisher);

    tracing::info!(
        broker = %format_args!("{}:{}", config.mqtt.broker_host, config.mqtt.broker_port),
        prefix = %config.mqtt.topic_prefix,
        devices = registry.len(),
        pollers = pollers.len(),
        commands = %config.commands.root.display(),
        "bridge started"
    );

    link.into_session(router, pollers)
        .run(shutdown_signal())
        .await;
    tracing::info!("bridge stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// Render an error with its whole source chain on one line.
fn chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
