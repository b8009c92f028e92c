//! Virtual clock for discrete-time simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when the engine steps. This keeps runs deterministic and
//! replayable regardless of host machine speed or driver cadence.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time in milliseconds.
    current_ms: u64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Current time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.current_ms
    }

    /// Advance the clock by a duration in milliseconds.
    pub fn advance_by_ms(&mut self, delta_ms: u64) {
        self.current_ms = self.current_ms.saturating_add(delta_ms);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
