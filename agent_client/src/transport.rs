//! Transports between the agent and the simulation.
//!
//! The session only sees [`Transport`]: a non-blocking drain of inbound
//! events plus a way to send actions. Delivery may happen on other tasks, but
//! events are queued and only handed over when the session polls on its tick.

use std::collections::VecDeque;

use agent_shared::{
    config::AgentConfig,
    net::{read_frame, write_frame, InboundEvent, NetMsg, OutboundAction, ReliableConn, PROTOCOL_VERSION},
};
use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Connection to the simulation as seen by the session.
#[async_trait]
pub trait Transport: Send {
    /// Returns every event that has arrived since the last poll without waiting.
    fn poll_events(&mut self) -> Vec<InboundEvent>;

    async fn send(&mut self, action: OutboundAction) -> anyhow::Result<()>;
}

/// Opens transports; one call is one connection attempt.
#[async_trait]
pub trait Connector: Send {
    type Transport: Transport;

    async fn connect(&mut self) -> anyhow::Result<Self::Transport>;
}

/// Length-prefixed JSON over TCP. A reader task decodes frames and queues
/// the events for the session.
pub struct TcpTransport {
    writer: OwnedWriteHalf,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    reader: JoinHandle<()>,
    session: u64,
}

impl TcpTransport {
    /// Connects and performs the handshake.
    pub async fn connect(endpoint: &str, worker_type: &str, worker_id: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .with_context(|| format!("tcp connect {endpoint}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        let mut conn = ReliableConn::new(stream);

        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
            worker_type: worker_type.to_string(),
            worker_id: worker_id.to_string(),
        })
        .await?;

        let session = match conn.recv().await? {
            NetMsg::Welcome { session } => session,
            NetMsg::Rejected { reason } => anyhow::bail!("connection rejected: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        let (mut read_half, writer) = conn.into_split();
        let (tx, inbound) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(NetMsg::Event(event)) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(other) => debug!(?other, "Unexpected message on event stream"),
                    Err(e) => {
                        let _ = tx.send(InboundEvent::Disconnected {
                            reason: format!("{e:#}"),
                        });
                        break;
                    }
                }
            }
        });

        info!(%endpoint, session, "Transport connected");
        Ok(Self {
            writer,
            inbound,
            reader,
            session,
        })
    }

    pub fn session(&self) -> u64 {
        self.session
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn poll_events(&mut self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbound.try_recv() {
            events.push(event);
        }
        events
    }

    async fn send(&mut self, action: OutboundAction) -> anyhow::Result<()> {
        write_frame(&mut self.writer, &NetMsg::Action(action)).await
    }
}

/// Connects [`TcpTransport`]s using the session configuration.
pub struct TcpConnector {
    endpoint: String,
    worker_type: String,
    worker_id: String,
}

impl TcpConnector {
    pub fn from_config(cfg: &AgentConfig) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: cfg.endpoint()?,
            worker_type: cfg.worker_type.clone(),
            worker_id: cfg.worker_id.clone(),
        })
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&mut self) -> anyhow::Result<TcpTransport> {
        TcpTransport::connect(&self.endpoint, &self.worker_type, &self.worker_id).await
    }
}

/// In-memory transport useful for headless tests and dry runs: events are
/// pushed by hand and sent actions are recorded.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<InboundEvent>,
    sent: Vec<OutboundAction>,
    fail_sends: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: InboundEvent) {
        self.inbound.push_back(event);
    }

    pub fn sent(&self) -> &[OutboundAction] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.sent)
    }

    /// Makes every following send fail, as a dropped connection would.
    pub fn fail_sends(&mut self) {
        self.fail_sends = true;
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn poll_events(&mut self) -> Vec<InboundEvent> {
        self.inbound.drain(..).collect()
    }

    async fn send(&mut self, action: OutboundAction) -> anyhow::Result<()> {
        if self.fail_sends {
            warn!(?action, "Loopback send refused");
            anyhow::bail!("loopback transport closed");
        }
        self.sent.push(action);
        Ok(())
    }
}
