//! Minimal simulation stand-in for running agents by hand.
//!
//! Usage:
//!   cargo run -p agent_tests --bin sim_stub -- [--bind 127.0.0.1:7777]
//!
//! Every accepted agent gets its own entity, the full open world and
//! authority over the entity; pings are echoed back as pongs.

use std::net::SocketAddr;

use agent_shared::{component::EntityId, coords::MapGeometry};
use agent_tests::{first_free_entity_id, SimStub};
use anyhow::Context;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<SocketAddr> {
    let args: Vec<String> = std::env::args().collect();
    let mut bind = "127.0.0.1:7777".to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" if i + 1 < args.len() => {
                bind = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    bind.parse().with_context(|| format!("invalid bind address {bind:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = parse_args()?;
    let map = MapGeometry::default();
    let mut stub = SimStub::bind(addr).await?;
    info!(link = %stub.link()?, "Simulation stub listening");

    let mut next_agent = first_free_entity_id(&map);
    loop {
        let mut peer = match stub.accept().await {
            Ok(peer) => peer,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Handshake failed");
                continue;
            }
        };
        let agent = next_agent;
        next_agent = EntityId(next_agent.0 + 1);

        tokio::spawn(async move {
            match peer.serve(&map, agent, usize::MAX).await {
                Ok(report) => info!(
                    worker_id = %peer.worker_id,
                    positions = report.positions.len(),
                    pings = report.pings,
                    "Agent session ended"
                ),
                Err(e) => warn!(worker_id = %peer.worker_id, error = %format!("{e:#}"), "Agent session failed"),
            }
        });
    }
}
