//! Input handling.
//!
//! In a real client this would integrate with windowing, raw mouse/keyboard,
//! and action bindings. This scaffold focuses on producing deterministic
//! per-tick `PlayerCommand` messages from a grid-aligned wish direction.

use engine_shared::math::Vec2;
use engine_shared::net::ChannelMessage;

/// Sampled input for one tick. `forward`/`right` are clamped to `{-1, 0, 1}`
/// since movement on the tile grid is always a single step.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub forward: i16,
    pub right: i16,
    pub jump: bool,
}

impl InputState {
    pub fn wish_move(self) -> Vec2 {
        Vec2::new(self.right.clamp(-1, 1), self.forward.clamp(-1, 1))
    }
}

/// Turns sampled input into a `PlayerCommand` for a tick.
pub fn build_command(tick: u32, input: InputState) -> ChannelMessage {
    ChannelMessage::PlayerCommand {
        tick,
        r#move: input.wish_move(),
        wish_jump: input.jump,
    }
}
