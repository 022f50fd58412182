//! Math types.
//!
//! This module intentionally stays small and deterministic.

use serde::{Deserialize, Serialize};

/// 3D vector. `x`/`y` are the planar world axes, `z` points up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn distance_sq(self, to: Self) -> f32 {
        Self::new(to.x - self.x, to.y - self.y, to.z - self.z).len_sq()
    }

    /// Swaps the second and third axis.
    ///
    /// The host simulation stores positions y-up, while the tile world keeps
    /// its planar axes in `x`/`y`.
    pub fn swap_yz(self) -> Self {
        Self::new(self.x, self.z, self.y)
    }
}
