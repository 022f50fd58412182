//! Agent motion and movement validation.
//!
//! A candidate position is only published if the agent's whole square
//! footprint lands on cached, traversable tiles. Each corner of the footprint
//! is checked independently, so the agent can't clip diagonally through a
//! blocking tile. Anything the view has not observed yet counts as blocked.

use agent_shared::{
    component::EntityId,
    coords::{MapGeometry, TileAddress},
    math::Vec3,
    view::View,
};
use rand::Rng;
use tracing::trace;

/// Cardinal movement direction on the planar axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// The three directions that differ from `self`.
    pub fn others(self) -> [Direction; 3] {
        match self {
            Direction::Up => [Direction::Down, Direction::Left, Direction::Right],
            Direction::Down => [Direction::Up, Direction::Left, Direction::Right],
            Direction::Left => [Direction::Up, Direction::Down, Direction::Right],
            Direction::Right => [Direction::Up, Direction::Down, Direction::Left],
        }
    }

    /// Picks one of the other three directions uniformly.
    pub fn pick_other<R: Rng + ?Sized>(self, rng: &mut R) -> Direction {
        self.others()[rng.gen_range(0..3)]
    }

    /// Unit offset on the planar axes.
    pub fn offset(self) -> (f32, f32) {
        match self {
            Direction::Up => (0.0, 1.0),
            Direction::Down => (0.0, -1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }
}

/// Position one tick of movement away from `position`.
pub fn propose_step(position: Vec3, direction: Direction, tick_period_ms: u64, velocity: f32) -> Vec3 {
    let s = 0.001 * tick_period_ms as f32 * velocity;
    let (dx, dy) = direction.offset();
    Vec3::new(position.x + dx * s, position.y + dy * s, position.z)
}

/// Why a footprint corner was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfBounds(TileAddress),
    TilesUnknown(EntityId),
    Blocked(TileAddress),
}

/// Checks candidate positions against the tiles cached in a [`View`].
pub struct MovementValidator<'a> {
    map: &'a MapGeometry,
    view: &'a View,
    half_extent: f32,
}

impl<'a> MovementValidator<'a> {
    pub fn new(map: &'a MapGeometry, view: &'a View, character_size: f32) -> Self {
        Self {
            map,
            view,
            half_extent: 0.5 * character_size,
        }
    }

    /// Accepts `position` only if all four footprint corners pass.
    pub fn validate_candidate(&self, position: Vec3) -> bool {
        match self.check(position) {
            Ok(()) => true,
            Err(reason) => {
                trace!(x = position.x, y = position.y, z = position.z, ?reason, "Position rejected");
                false
            }
        }
    }

    /// Like [`Self::validate_candidate`], reporting the first failing corner.
    pub fn check(&self, position: Vec3) -> Result<(), Rejection> {
        let h = self.half_extent;
        let corners = [(h, h), (-h, h), (h, -h), (-h, -h)];
        for (dx, dy) in corners {
            self.check_point(position.x + dx, position.y + dy)?;
        }
        Ok(())
    }

    fn check_point(&self, x: f32, z: f32) -> Result<(), Rejection> {
        let tile = self.map.world_to_tile(f64::from(x), f64::from(z));
        if !self.map.contains_tile(tile) {
            return Err(Rejection::OutOfBounds(tile));
        }

        let background = self.map.chunk_background_entity_id(tile.chunk);
        let tiles = self
            .view
            .tiles(background)
            .ok_or(Rejection::TilesUnknown(background))?;

        if !tiles.is_traversable(self.map.tile_index(tile)) {
            return Err(Rejection::Blocked(tile));
        }
        Ok(())
    }
}
