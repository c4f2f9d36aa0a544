//! # hkhubd: hkhub daemon
//!
//! Composition root that wires the accessory protocol, the pairing
//! coordinator and the controllers together, then runs until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Install the `tracing` subscriber
//! - Construct the protocol adapter and the application services
//! - Start discovery and react to lifecycle events
//! - Release every subscription on shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod supervisor;

use std::sync::Arc;

use hkhub_adapter_virtual::VirtualProtocol;
use hkhub_app::capability::CapabilityRegistry;
use hkhub_app::pairing::PairingCoordinator;
use hkhub_app::roster::{DEFAULT_EVENT_CAPACITY, DeviceRoster};
use hkhub_app::services::AccessoryCatalog;
use hkhub_app::value_bus::ValueChangeBus;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Protocol
    let protocol = if config.integrations.virtual_enabled {
        Arc::new(VirtualProtocol::with_demo_fleet(&config.virtual_setup_code()?))
    } else {
        tracing::warn!("no accessory integration enabled, nothing will be discovered");
        Arc::new(VirtualProtocol::new())
    };

    // Services
    let roster = Arc::new(DeviceRoster::new(DEFAULT_EVENT_CAPACITY));
    let coordinator = PairingCoordinator::new(
        Arc::clone(&protocol),
        Arc::clone(&roster),
        config.pairing_timeout(),
    );
    let bus = Arc::new(ValueChangeBus::new());
    let registry = CapabilityRegistry::new(Arc::clone(&protocol), bus);
    let catalog = AccessoryCatalog::new(coordinator.clone(), registry);
    let mut supervisor = Supervisor::new(coordinator.clone(), catalog, config.auto_pair_code()?);

    // subscribe before discovery so the first announcements are seen
    let mut events = roster.subscribe();
    let discovery = coordinator.start_discovery().await?;
    tracing::info!("hkhubd started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                tracing::info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => supervisor.handle(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "lifecycle events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.shutdown().await;
    discovery.abort();
    Ok(())
}
