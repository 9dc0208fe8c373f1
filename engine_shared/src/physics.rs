//! Physics abstraction.
//!
//! Placeholder for a deterministic physics step. `World`'s own movement and
//! collision rules (see `engine_server::world`) do not go through this trait
//! today; it is kept as the seam a continuous-physics game-rules layer would
//! plug into above the grid-based simulation.

use crate::math::Vec3;

/// Physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -9.81),
        }
    }
}

/// Physics stepper trait, generic over whatever world representation a
/// caller supplies.
pub trait PhysicsBackend<W>: Send + Sync {
    fn step(&mut self, world: &mut W, dt_sec: f32);
}

/// No-op physics.
#[derive(Default)]
pub struct NullPhysics;

impl<W> PhysicsBackend<W> for NullPhysics {
    fn step(&mut self, _world: &mut W, _dt_sec: f32) {}
}
