//! Accumulator-based fixed stepping around the match state.
//!
//! The room tick runs on wall-clock time (30 Hz, jittery); the simulation
//! contract is a fixed slice. The engine buffers real elapsed time and
//! consumes it in exact [`SIM_STEP`] slices so physics never sees a
//! variable dt.

use crate::util::time::{MAX_TICK_DELTA, SIM_STEP};
use crate::ws::protocol::{ArenaPhysics, StateSnapshot};

use super::snapshot::project;
use super::state::{MatchState, Rules};
use super::step::step;

pub struct SimulationEngine {
    state: MatchState,
    accumulator: f32,
}

impl SimulationEngine {
    pub fn new(seed: u64, rules: Rules, physics: ArenaPhysics) -> Self {
        Self {
            state: MatchState::new(seed, rules, physics),
            accumulator: 0.0,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    /// Feed `dt` seconds of wall-clock time; runs zero or more fixed
    /// steps. Large stalls are clamped rather than replayed as a burst.
    pub fn advance(&mut self, dt: f32) {
        self.accumulator = (self.accumulator + dt.max(0.0)).min(MAX_TICK_DELTA);
        while self.accumulator >= SIM_STEP {
            step(&mut self.state, SIM_STEP);
            self.accumulator -= SIM_STEP;
        }
    }

    /// Renderable projection of the current state.
    pub fn snapshot(&self, t: u64) -> StateSnapshot {
        project(&self.state, t)
    }
}
