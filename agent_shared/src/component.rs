//! Entity and component types observed through the view.
//!
//! The simulation schema is richer than what the agent tracks. Kinds the
//! agent does not understand decode to [`ComponentKind::Unknown`] /
//! [`ComponentData::Unsupported`] and are dropped by the session.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Opaque entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    pub const INVALID: EntityId = EntityId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component kinds the agent tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Canonical tile-world position.
    Position,
    /// Secondary position used by the host system for load balancing.
    HostPosition,
    /// Marks the entity as an agent and gates control over it.
    Agent,
    HeartbeatPing,
    HeartbeatPong,
    TilemapTiles,
    #[serde(other)]
    Unknown,
}

/// Per-component authority as reported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Authority {
    Authoritative,
    NotAuthoritative,
    /// No authority flag has been observed.
    #[default]
    Unassigned,
}

/// Heartbeat payload. The pong echoes the ping's timestamp back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Heartbeat {
    /// Monotonic send time in microseconds, if the update carried one.
    #[serde(default)]
    pub last_updated_time: Option<i64>,
}

/// Highest tileset column still counted as grass.
pub const MAX_TRAVERSABLE_COLUMN: u8 = 2;

/// Tile layer of one chunk. All arrays are row-major, `chunk_size²` long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TileData {
    pub tileset_columns: Vec<u8>,
    pub tileset_rows: Vec<u8>,
    pub tileset_ids: Vec<u8>,
}

impl TileData {
    /// A chunk where every tile uses the same tileset cell.
    pub fn uniform(tiles: usize, column: u8, row: u8, tileset: u8) -> Self {
        Self {
            tileset_columns: vec![column; tiles],
            tileset_rows: vec![row; tiles],
            tileset_ids: vec![tileset; tiles],
        }
    }

    pub fn len(&self) -> usize {
        self.tileset_columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tileset_columns.is_empty()
    }

    /// Tileset column of a tile, used as its terrain category.
    pub fn column(&self, index: usize) -> Option<u8> {
        self.tileset_columns.get(index).copied()
    }

    /// Whether the agent may stand on the tile. Missing tiles block.
    pub fn is_traversable(&self, index: usize) -> bool {
        self.column(index)
            .is_some_and(|column| column <= MAX_TRAVERSABLE_COLUMN)
    }

    pub fn set_column(&mut self, index: usize, column: u8) {
        if let Some(slot) = self.tileset_columns.get_mut(index) {
            *slot = column;
        }
    }
}

/// Component payloads, tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ComponentData {
    Position(Vec3),
    HostPosition(Vec3),
    Agent,
    HeartbeatPing(Heartbeat),
    HeartbeatPong(Heartbeat),
    TilemapTiles(TileData),
    #[serde(other)]
    Unsupported,
}

impl ComponentData {
    /// Kind this payload is stored under, `None` for unsupported payloads.
    pub fn kind(&self) -> Option<ComponentKind> {
        match self {
            ComponentData::Position(_) => Some(ComponentKind::Position),
            ComponentData::HostPosition(_) => Some(ComponentKind::HostPosition),
            ComponentData::Agent => Some(ComponentKind::Agent),
            ComponentData::HeartbeatPing(_) => Some(ComponentKind::HeartbeatPing),
            ComponentData::HeartbeatPong(_) => Some(ComponentKind::HeartbeatPong),
            ComponentData::TilemapTiles(_) => Some(ComponentKind::TilemapTiles),
            ComponentData::Unsupported => None,
        }
    }
}
