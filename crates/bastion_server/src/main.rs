//! Bastion minigame host - main entry point
//!
//! Boots one container: configuration, logging, fleet messaging, the shared
//! map directory, and the initial lobby instance, then waits for a shutdown
//! signal and tears everything down gracefully.

use anyhow::Result;
use bastion_core::{DimensionSpec, GeneratedWorldProvider, InstanceConfig, InstanceDirectory, WorldState};
use bastion_event_system::EventBus;
use bastion_messaging::{BrokerLink, LocalBroker, MessagingBus, TcpBrokerLink};
use bastion_server::{
    config::{self, Args, Config},
    logging, shutdown, ChatScopeModule, InstanceHost, ServicesContext,
};
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = Instant::now();

    let args = Args::parse();
    let config = config::load_config(&args).await?;
    logging::setup_logging(&args, &config)?;

    info!("Starting Bastion minigame host");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let container_id = args
        .container_id
        .clone()
        .unwrap_or_else(|| config.server.container_id.clone());
    let listen_addr = args
        .listen
        .clone()
        .unwrap_or_else(|| config.server.listen_addr.clone());
    info!("Container '{}', engine bridge on {}", container_id, listen_addr);

    let messaging = build_messaging(&args, &config, &container_id);
    let context = ServicesContext::new(
        EventBus::new_root(),
        Arc::new(InstanceDirectory::new()),
        messaging.clone(),
    );
    let host = InstanceHost::new(context, &config.maps.directory);
    host.register_rpc();

    if let Some(bus) = &messaging {
        let heartbeat_host = Arc::clone(&host);
        bus.start_heartbeat(
            Duration::from_millis(config.server.heartbeat_interval),
            move || {
                HashMap::from([(
                    "instances".to_string(),
                    heartbeat_host.instance_count().to_string(),
                )])
            },
        );
    }

    // Every container runs a lobby round players land in before being
    // routed to a minigame.
    let lobby = host
        .spawn(
            InstanceConfig {
                name: "lobby".to_string(),
                game_type: "lobby".to_string(),
                auto_remove: false,
                ..Default::default()
            },
            |game| {
                game.attach(GeneratedWorldProvider::new(
                    DimensionSpec {
                        name: "lobby".to_string(),
                        seed: 0,
                    },
                    flat_lobby_generator,
                ))?;
                game.attach(ChatScopeModule)?;
                Ok(())
            },
        )
        .await?;
    info!("Lobby instance {} ready", lobby.id());

    let shutdown_receiver = shutdown::shutdown_signal().await;
    info!("Startup complete in {:.2?}", startup_start.elapsed());

    let _ = shutdown_receiver.await;

    let shutdown_start = Instant::now();
    host.shutdown_all().await;
    info!("Host shutdown completed in {:.2?}", shutdown_start.elapsed());

    Ok(())
}

/// Connects the fleet messaging bus, or degrades to local-only mode when no
/// broker is configured. A configured-but-unreachable broker still yields a
/// bus: the link reconnects in the background and publishes queue locally
/// until it comes up.
fn build_messaging(args: &Args, config: &Config, container_id: &str) -> Option<Arc<MessagingBus>> {
    let broker_addr = args
        .broker
        .clone()
        .or_else(|| config.server.broker_addr.clone());

    let link: Arc<dyn BrokerLink> = match broker_addr {
        Some(addr) => {
            info!("Connecting to broker at {}", addr);
            TcpBrokerLink::connect(addr)
        }
        None => {
            warn!("No broker configured, running local-only (no fleet announcements)");
            LocalBroker::new().link()
        }
    };

    let bus = MessagingBus::new(container_id, link);
    bus.start();
    Some(bus)
}

/// Empty superflat chunks around spawn; the engine bridge fills in real
/// geometry for anything gameplay touches.
fn flat_lobby_generator(_spec: &DimensionSpec) -> WorldState {
    let mut state = WorldState::default();
    for x in -2..=2 {
        for z in -2..=2 {
            state.insert_chunk((x, z), serde_json::json!({"superflat": true}));
        }
    }
    state
}
