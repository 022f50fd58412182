//! Spatial addressing for the tile world.
//!
//! The world is a `2·half_map_width × 2·half_map_height` plane centred on the
//! origin, split into square chunks of `chunk_size` tiles. Every chunk is
//! backed by three consecutive entities (background, foreground, container)
//! whose ids are derived from the chunk address. Whatever seeds the world and
//! whatever reads it must agree on [`MapGeometry::chunk_entities`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::EntityId;

/// Entities reserved per chunk: background, foreground, container.
pub const ENTITIES_PER_CHUNK: i64 = 3;

/// Discrete chunk address. May be out of range for a given map; check with
/// [`MapGeometry::contains_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkAddress {
    pub x: i32,
    pub z: i32,
}

impl ChunkAddress {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// A tile inside a chunk. Always produced together with its chunk so the two
/// never disagree on rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub chunk: ChunkAddress,
    pub tile_x: i32,
    pub tile_z: i32,
}

/// Entity ids backing one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntities {
    pub background: EntityId,
    pub foreground: EntityId,
    pub container: EntityId,
}

/// Fixed layout of the tile world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapGeometry {
    pub half_map_width: i32,
    pub half_map_height: i32,
    pub chunk_size: i32,
    pub first_chunk_entity_id: EntityId,
}

impl Default for MapGeometry {
    fn default() -> Self {
        Self {
            half_map_width: 100,
            half_map_height: 100,
            chunk_size: 10,
            first_chunk_entity_id: EntityId(12),
        }
    }
}

impl MapGeometry {
    /// Rejects layouts the chunk arithmetic cannot address: the extents must
    /// be positive and split into whole chunks.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.chunk_size > 0,
            "chunk_size must be positive, got {}",
            self.chunk_size
        );
        for (name, half) in [
            ("half_map_width", self.half_map_width),
            ("half_map_height", self.half_map_height),
        ] {
            anyhow::ensure!(half > 0, "{name} must be positive, got {half}");
            anyhow::ensure!(
                half % self.chunk_size == 0,
                "{name} {half} is not a multiple of chunk_size {}",
                self.chunk_size
            );
        }
        Ok(())
    }

    pub fn num_chunk_columns(&self) -> i32 {
        2 * self.half_map_width / self.chunk_size
    }

    pub fn num_chunk_rows(&self) -> i32 {
        2 * self.half_map_height / self.chunk_size
    }

    /// Number of tiles in one chunk's tile arrays.
    pub fn tiles_per_chunk(&self) -> usize {
        (self.chunk_size * self.chunk_size) as usize
    }

    pub fn contains_chunk(&self, chunk: ChunkAddress) -> bool {
        (0..self.num_chunk_columns()).contains(&chunk.x)
            && (0..self.num_chunk_rows()).contains(&chunk.z)
    }

    /// True if both the chunk and the tile offset are in range.
    pub fn contains_tile(&self, tile: TileAddress) -> bool {
        self.contains_chunk(tile.chunk)
            && (0..self.chunk_size).contains(&tile.tile_x)
            && (0..self.chunk_size).contains(&tile.tile_z)
    }

    /// Maps a planar world position to its chunk and tile.
    ///
    /// Uses floor division, so positions left of / below the map origin land
    /// in negative chunks instead of being truncated into chunk 0.
    pub fn world_to_tile(&self, x: f64, z: f64) -> TileAddress {
        let size = f64::from(self.chunk_size);
        let diff_x = x + f64::from(self.half_map_width);
        let diff_z = z + f64::from(self.half_map_height);

        let chunk_x = (diff_x / size).floor() as i32;
        let chunk_z = (diff_z / size).floor() as i32;

        TileAddress {
            chunk: ChunkAddress::new(chunk_x, chunk_z),
            tile_x: (diff_x - f64::from(chunk_x) * size).floor() as i32,
            tile_z: (diff_z - f64::from(chunk_z) * size).floor() as i32,
        }
    }

    /// Reference (minimum) corner of a tile in world coordinates.
    pub fn tile_to_world(&self, tile: TileAddress) -> (i32, i32) {
        (
            -self.half_map_width + tile.chunk.x * self.chunk_size + tile.tile_x,
            -self.half_map_height + tile.chunk.z * self.chunk_size + tile.tile_z,
        )
    }

    /// Row-major index of a tile inside its chunk's tile arrays.
    pub fn tile_index(&self, tile: TileAddress) -> usize {
        (tile.tile_z * self.chunk_size + tile.tile_x) as usize
    }

    /// Entity holding the background tile data of `chunk`, or
    /// [`EntityId::INVALID`] if the chunk is outside the map.
    pub fn chunk_background_entity_id(&self, chunk: ChunkAddress) -> EntityId {
        match self.chunk_entities(chunk) {
            Some(entities) => entities.background,
            None => {
                warn!(
                    chunk_x = chunk.x,
                    chunk_z = chunk.z,
                    "Cannot resolve chunk background entity id for out of range chunk"
                );
                EntityId::INVALID
            }
        }
    }

    /// All three entity ids of a chunk.
    pub fn chunk_entities(&self, chunk: ChunkAddress) -> Option<ChunkEntities> {
        if !self.contains_chunk(chunk) {
            return None;
        }

        let background = self.first_chunk_entity_id.0
            + ENTITIES_PER_CHUNK * i64::from(chunk.x) * i64::from(self.num_chunk_columns())
            + ENTITIES_PER_CHUNK * i64::from(chunk.z);

        Some(ChunkEntities {
            background: EntityId(background),
            foreground: EntityId(background + 1),
            container: EntityId(background + 2),
        })
    }

    /// Every valid chunk, in the order the world seeder allocates ids.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkAddress> {
        let rows = self.num_chunk_rows();
        (0..self.num_chunk_columns())
            .flat_map(move |x| (0..rows).map(move |z| ChunkAddress::new(x, z)))
    }
}
