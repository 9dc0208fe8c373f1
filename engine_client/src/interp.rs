//! Interpolation.
//!
//! The server sends discrete snapshots at tick boundaries. The client
//! renders at its own rate and interpolates entity positions between the
//! two most recent snapshots to smooth out the tick-to-tick stepping.

use std::collections::VecDeque;

use engine_server::world::WorldSnapshot;

/// Buffered snapshot history for interpolation.
#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<WorldSnapshot>,
    max: usize,
}

impl SnapshotBuffer {
    pub fn new(max: usize) -> Self {
        Self { history: VecDeque::new(), max }
    }

    pub fn push(&mut self, snapshot: WorldSnapshot) {
        self.history.push_back(snapshot);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_snapshot(&self) -> Option<&WorldSnapshot> {
        self.history.back()
    }

    /// Interpolated `(x, y)` for player `id`, between the two most recent
    /// snapshots. `alpha` in `[0, 1]`: 0 = older snapshot, 1 = newer.
    pub fn interp_player(&self, id: u32, alpha: f32) -> Option<(f32, f32)> {
        if self.history.len() < 2 {
            return None;
        }
        let a = &self.history[self.history.len() - 2];
        let b = &self.history[self.history.len() - 1];

        let pa = a.players.iter().find(|p| p.id == id).map(|p| p.position);
        let pb = b.players.iter().find(|p| p.id == id).map(|p| p.position);
        match (pa, pb) {
            (Some(pa), Some(pb)) => {
                let alpha = alpha.clamp(0.0, 1.0);
                let x = pa.x as f32 + (pb.x as f32 - pa.x as f32) * alpha;
                let y = pa.y as f32 + (pb.y as f32 - pa.y as f32) * alpha;
                Some((x, y))
            }
            _ => None,
        }
    }
}
