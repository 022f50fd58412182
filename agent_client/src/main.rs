//! Standalone agent binary.
//!
//! Usage:
//!   cargo run -p agent_client -- [--link agent://127.0.0.1:7777] [--worker-id bot-1]
//!
//! See [`agent_client::args`] for the full flag list. The process exits with
//! a failure status when it can't connect within the configured retries.

use agent_client::{args::parse_args, Session, TcpConnector};
use anyhow::Context;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args().context("parse arguments")?;
    info!(
        worker_type = %cfg.worker_type,
        worker_id = %cfg.worker_id,
        endpoint = %cfg.endpoint()?,
        "Starting agent"
    );

    let mut connector = TcpConnector::from_config(&cfg)?;
    let session = Session::establish(&mut connector, cfg)
        .await
        .context("establish session")?;
    session.run().await?;

    info!("Agent stopped");
    Ok(())
}
