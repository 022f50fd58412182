//! `agent_tests`
//!
//! Fixtures shared by the scenario and socket tests, plus [`SimStub`], a
//! minimal simulation stand-in that speaks the agent wire protocol. The
//! `sim_stub` binary serves it for running an agent by hand.

use std::net::SocketAddr;

use agent_client::LoopbackTransport;
use agent_shared::{
    component::{Authority, ComponentData, ComponentKind, EntityId, TileData},
    coords::{ChunkAddress, MapGeometry, TileAddress, ENTITIES_PER_CHUNK},
    math::Vec3,
    net::{
        ChunkRegion, Command, InboundEvent, NetMsg, OutboundAction, ReliableConn,
        ReliableListener, PROTOCOL_VERSION,
    },
};
use tracing::{debug, info, warn};

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Tileset column used for open ground.
pub const OPEN: u8 = 0;
/// Tileset column used for walls.
pub const WALL: u8 = 5;

/// Seeds every chunk with open ground.
pub fn seed_world(map: &MapGeometry) -> Vec<InboundEvent> {
    seed_world_with(map, |_, _, _| OPEN)
}

/// Seeds every chunk's three entities and the background tiles, asking
/// `column` for the tileset column of each `(chunk, tile_x, tile_z)`.
pub fn seed_world_with<F>(map: &MapGeometry, column: F) -> Vec<InboundEvent>
where
    F: Fn(ChunkAddress, i32, i32) -> u8,
{
    let mut events = Vec::new();
    for chunk in map.chunks() {
        let Some(entities) = map.chunk_entities(chunk) else {
            continue;
        };
        for id in [entities.background, entities.foreground, entities.container] {
            events.push(InboundEvent::EntityAdded { id });
        }

        let mut tiles = TileData::uniform(map.tiles_per_chunk(), OPEN, 0, 3);
        for tile_z in 0..map.chunk_size {
            for tile_x in 0..map.chunk_size {
                let index = map.tile_index(TileAddress {
                    chunk,
                    tile_x,
                    tile_z,
                });
                tiles.set_column(index, column(chunk, tile_x, tile_z));
            }
        }
        events.push(InboundEvent::ComponentUpdated {
            id: entities.background,
            data: ComponentData::TilemapTiles(tiles),
        });
    }
    events
}

/// Events that hand a freshly created agent entity to its session.
pub fn grant_agent(id: EntityId, position: Vec3) -> Vec<InboundEvent> {
    vec![
        InboundEvent::EntityAdded { id },
        InboundEvent::ComponentUpdated {
            id,
            data: ComponentData::Position(position),
        },
        InboundEvent::ComponentUpdated {
            id,
            data: ComponentData::Agent,
        },
        InboundEvent::AuthorityChanged {
            id,
            kind: ComponentKind::Position,
            authority: Authority::Authoritative,
        },
        InboundEvent::AuthorityChanged {
            id,
            kind: ComponentKind::Agent,
            authority: Authority::Authoritative,
        },
    ]
}

pub fn feed<I>(transport: &mut LoopbackTransport, events: I)
where
    I: IntoIterator<Item = InboundEvent>,
{
    for event in events {
        transport.push_event(event);
    }
}

/// First entity id after the ones reserved for chunks.
pub fn first_free_entity_id(map: &MapGeometry) -> EntityId {
    let chunks = i64::from(map.num_chunk_columns()) * i64::from(map.num_chunk_rows());
    EntityId(map.first_chunk_entity_id.0 + ENTITIES_PER_CHUNK * chunks)
}

/// Where a new agent appears: the centre tile of the region's first chunk,
/// or the world origin without a region.
pub fn spawn_point(map: &MapGeometry, region: Option<ChunkRegion>) -> Vec3 {
    let Some(region) = region else {
        return Vec3::ZERO;
    };
    let chunk = ChunkAddress::new(region.min_x, region.min_z);
    if !map.contains_chunk(chunk) {
        warn!(?region, "Starting region is outside the map, spawning at origin");
        return Vec3::ZERO;
    }
    let (x, z) = map.tile_to_world(TileAddress {
        chunk,
        tile_x: map.chunk_size / 2,
        tile_z: map.chunk_size / 2,
    });
    Vec3::new(x as f32 + 0.5, z as f32 + 0.5, 0.0)
}

/// Accepts agent connections and performs the server side of the handshake.
pub struct SimStub {
    listener: ReliableListener,
    next_session: u64,
}

impl SimStub {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        Ok(Self {
            listener: ReliableListener::bind(addr).await?,
            next_session: 1,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Discovery link an agent can be started with.
    pub fn link(&self) -> anyhow::Result<String> {
        Ok(format!("agent://{}", self.local_addr()?))
    }

    pub async fn accept(&mut self) -> anyhow::Result<StubPeer> {
        let (mut conn, addr) = self.listener.accept().await?;
        let (worker_type, worker_id) = match conn.recv().await? {
            NetMsg::Hello {
                protocol,
                worker_type,
                worker_id,
            } => {
                if protocol != PROTOCOL_VERSION {
                    conn.send(&NetMsg::Rejected {
                        reason: format!("unsupported protocol {protocol}"),
                    })
                    .await?;
                    anyhow::bail!("{addr} requested protocol {protocol}");
                }
                (worker_type, worker_id)
            }
            other => anyhow::bail!("expected Hello from {addr}, got {other:?}"),
        };

        let session = self.next_session;
        self.next_session += 1;
        conn.send(&NetMsg::Welcome { session }).await?;
        info!(%addr, %worker_type, %worker_id, session, "Agent connected");

        Ok(StubPeer {
            conn,
            worker_id,
            session,
        })
    }
}

/// What a served agent did.
#[derive(Debug, Default)]
pub struct ServeReport {
    pub agent: Option<EntityId>,
    pub positions: Vec<Vec3>,
    pub host_positions: Vec<Vec3>,
    pub pings: usize,
}

/// One connected agent, seen from the simulation side.
pub struct StubPeer {
    conn: ReliableConn,
    pub worker_id: String,
    pub session: u64,
}

impl StubPeer {
    pub async fn send_event(&mut self, event: InboundEvent) -> anyhow::Result<()> {
        self.conn.send(&NetMsg::Event(event)).await
    }

    pub async fn send_events<I>(&mut self, events: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = InboundEvent>,
    {
        for event in events {
            self.send_event(event).await?;
        }
        Ok(())
    }

    pub async fn recv_action(&mut self) -> anyhow::Result<OutboundAction> {
        match self.conn.recv().await? {
            NetMsg::Action(action) => Ok(action),
            other => anyhow::bail!("expected Action, got {other:?}"),
        }
    }

    /// Plays the simulation for one agent: creates its entity on request,
    /// streams the world, grants authority and echoes pings. Stops after
    /// `max_actions` actions or when the agent goes away.
    pub async fn serve(
        &mut self,
        map: &MapGeometry,
        agent: EntityId,
        max_actions: usize,
    ) -> anyhow::Result<ServeReport> {
        let mut report = ServeReport::default();

        for _ in 0..max_actions {
            let action = match self.recv_action().await {
                Ok(action) => action,
                Err(e) => {
                    info!(session = self.session, error = %format!("{e:#}"), "Agent went away");
                    break;
                }
            };

            match action {
                OutboundAction::CommandRequest {
                    request_id,
                    command: Command::CreateAgentEntity { starting_region },
                    ..
                } => {
                    self.send_event(InboundEvent::CommandResponse {
                        request_id,
                        status_code: 0,
                    })
                    .await?;
                    self.send_events(seed_world(map)).await?;
                    self.send_events(grant_agent(agent, spawn_point(map, starting_region)))
                        .await?;
                    info!(session = self.session, agent = agent.0, "Created agent entity");
                    report.agent = Some(agent);
                }
                OutboundAction::ComponentUpdate {
                    id,
                    data: ComponentData::HeartbeatPing(ping),
                } => {
                    report.pings += 1;
                    self.send_event(InboundEvent::ComponentUpdated {
                        id,
                        data: ComponentData::HeartbeatPong(ping),
                    })
                    .await?;
                }
                OutboundAction::ComponentUpdate {
                    data: ComponentData::Position(p),
                    ..
                } => report.positions.push(p),
                OutboundAction::ComponentUpdate {
                    data: ComponentData::HostPosition(p),
                    ..
                } => report.host_positions.push(p),
                other => debug!(?other, "Ignoring action"),
            }
        }

        Ok(report)
    }
}
