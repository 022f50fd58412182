//! Networking primitives.
//!
//! Goals:
//! - Describe the view-delta events the simulation streams to an agent and
//!   the actions an agent sends back.
//! - Provide a reliable (TCP) channel with length-prefixed JSON frames.
//! - Keep serialization explicit and versionable.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::component::{Authority, ComponentData, ComponentKind, EntityId};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound for a single frame; tile payloads are a few hundred bytes.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Correlates a command request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Chunk rectangle an agent asks to be spawned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRegion {
    pub min_x: i32,
    pub min_z: i32,
    pub size_x: i32,
    pub size_z: i32,
}

/// Commands an agent can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Ask the bootstrap entity to create this session's agent entity.
    CreateAgentEntity {
        starting_region: Option<ChunkRegion>,
    },
}

/// View deltas delivered by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundEvent {
    EntityAdded {
        id: EntityId,
    },
    EntityRemoved {
        id: EntityId,
    },
    /// Component added or updated; the payload replaces what was cached.
    ComponentUpdated {
        id: EntityId,
        data: ComponentData,
    },
    ComponentRemoved {
        id: EntityId,
        kind: ComponentKind,
    },
    AuthorityChanged {
        id: EntityId,
        kind: ComponentKind,
        authority: Authority,
    },
    CommandResponse {
        request_id: RequestId,
        status_code: i32,
    },
    Disconnected {
        reason: String,
    },
}

/// Requests produced by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundAction {
    ComponentUpdate {
        id: EntityId,
        data: ComponentData,
    },
    CommandRequest {
        request_id: RequestId,
        target: EntityId,
        command: Command,
    },
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
        worker_type: String,
        worker_id: String,
    },
    Welcome {
        session: u64,
    },
    Rejected {
        reason: String,
    },

    // ─── Session traffic ───
    /// Simulation -> agent.
    Event(InboundEvent),
    /// Agent -> simulation.
    Action(OutboundAction),
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, msg: &NetMsg) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    anyhow::ensure!(
        payload.len() <= MAX_FRAME_LEN,
        "frame of {} bytes exceeds limit",
        payload.len()
    );
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> anyhow::Result<NetMsg>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds limit");
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    decode_from_bytes(&payload)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    /// Splits into independently owned halves so reads can run on their own task.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// TCP listener; used by simulation stand-ins in tests and tools.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Heartbeat, TileData};

    #[test]
    fn tile_update_survives_codec() {
        let msg = NetMsg::Event(InboundEvent::ComponentUpdated {
            id: EntityId(12),
            data: ComponentData::TilemapTiles(TileData::uniform(100, 1, 0, 3)),
        });
        let back = decode_from_bytes(&encode_to_bytes(&msg).unwrap()).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn unknown_component_in_event_decodes_as_unsupported() {
        let json = br#"{"Event":{"ComponentUpdated":{"id":44,"data":{"kind":"Canvas","layers":[]}}}}"#;
        let msg = decode_from_bytes(json).unwrap();
        assert_eq!(
            msg,
            NetMsg::Event(InboundEvent::ComponentUpdated {
                id: EntityId(44),
                data: ComponentData::Unsupported,
            })
        );
    }

    #[tokio::test]
    async fn frames_roundtrip_over_a_pipe() -> anyhow::Result<()> {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let ping = NetMsg::Action(OutboundAction::ComponentUpdate {
            id: EntityId(99),
            data: ComponentData::HeartbeatPing(Heartbeat {
                last_updated_time: Some(1_234),
            }),
        });

        write_frame(&mut a, &ping).await?;
        assert_eq!(read_frame(&mut b).await?, ping);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        assert!(read_frame(&mut b).await.is_err());
    }

    #[tokio::test]
    async fn oversized_message_is_not_written() {
        // Three arrays of a million "1," entries serialize to about 6 MiB.
        let huge = NetMsg::Event(InboundEvent::ComponentUpdated {
            id: EntityId(12),
            data: ComponentData::TilemapTiles(TileData::uniform(1_000_000, 1, 1, 1)),
        });
        let mut sink: Vec<u8> = Vec::new();

        let err = write_frame(&mut sink, &huge).await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"), "{err}");
        assert!(sink.is_empty());
    }
}
