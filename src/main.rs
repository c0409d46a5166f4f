//! coap-broker-bridge entry point.
//!
//! Connects the in-memory node controller to the configured broker and
//! keeps the dead-node sweep running until Ctrl-C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use coap_broker_bridge::bridge::{Bridge, Outbox};
use coap_broker_bridge::config::BridgeConfig;
use coap_broker_bridge::controller::{DeviceController, InMemoryController};
use coap_broker_bridge::transport::{Connector, WsConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = BridgeConfig::from_env()?;

    // Initialize tracing
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let url = config.broker_url();
    tracing::info!(broker = %url, origin = %config.origin, "starting coap-broker-bridge");

    // Build controller and transport
    let (outbox, outbox_rx) = Outbox::channel();
    let controller: Arc<dyn DeviceController> = Arc::new(InMemoryController::new(
        outbox,
        config.origin.clone(),
        config.node_max_time(),
    ));
    let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(config.connect_timeout()));

    // Constructing the bridge starts the liveness sweep
    let bridge = Bridge::new(controller, connector, outbox_rx, config.bridge_settings());
    tracing::info!("bridge application started");

    let session = tokio::spawn(async move {
        if let Err(e) = bridge.run(&url).await {
            tracing::error!(error = %e, "broker bridge stopped");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    session.abort();

    Ok(())
}
