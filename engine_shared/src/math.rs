//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use serde::{Deserialize, Serialize};

/// 3D vector.
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

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

/// Unit quaternion (conceptually). Kept minimal for now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// 4x4 matrix (column-major). Placeholder for transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4 {
    pub m: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// Integer 2D grid position. Used for all world/map coordinates.
///
/// Components are `i16` so that movement deltas and map dimensions never
/// need to reason about 32-bit overflow; the map itself is always far
/// smaller than `i16::MAX` tiles on a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i16,
    pub y: i16,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: Self) -> i32 {
        (self.x as i32 - other.x as i32).abs() + (self.y as i32 - other.y as i32).abs()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_add(rhs.x), self.y.wrapping_add(rhs.y))
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_sub(rhs.x), self.y.wrapping_sub(rhs.y))
    }
}

bitflags::bitflags! {
    /// Cardinal movement direction, combinable (e.g. up + left for a diagonal step).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Direction: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

impl Direction {
    pub const fn up() -> Self {
        Self::UP
    }
    pub const fn down() -> Self {
        Self::DOWN
    }
    pub const fn left() -> Self {
        Self::LEFT
    }
    pub const fn right() -> Self {
        Self::RIGHT
    }

    pub fn has_up(self) -> bool {
        self.contains(Self::UP)
    }
    pub fn has_down(self) -> bool {
        self.contains(Self::DOWN)
    }
    pub fn has_left(self) -> bool {
        self.contains(Self::LEFT)
    }
    pub fn has_right(self) -> bool {
        self.contains(Self::RIGHT)
    }

    /// Direction of travel from `from` to an adjacent (8-connected) cell `to`.
    pub fn between(from: Vec2, to: Vec2) -> Self {
        let mut dir = Self::empty();
        if to.y < from.y {
            dir |= Self::UP;
        } else if to.y > from.y {
            dir |= Self::DOWN;
        }
        if to.x < from.x {
            dir |= Self::LEFT;
        } else if to.x > from.x {
            dir |= Self::RIGHT;
        }
        dir
    }
}

/// Team affiliation. Spawn rooms, respawn visualizers and collision rules
/// are all keyed off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Team {
    #[default]
    Red,
    Blue,
}

impl Team {
    pub fn opposite(self) -> Self {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn vec2_manhattan_distance() {
        assert_eq!(Vec2::new(0, 0).manhattan_distance(Vec2::new(3, -4)), 7);
    }

    #[test]
    fn direction_between_diagonal() {
        let dir = Direction::between(Vec2::new(5, 5), Vec2::new(4, 4));
        assert_eq!(dir, Direction::UP | Direction::LEFT);
    }
}
