//! Game simulation modules

pub mod ai;
pub mod engine;
pub mod snapshot;
pub mod state;
pub mod step;

pub use ai::{ActorController, Personality};
pub use engine::SimulationEngine;
pub use state::MatchState;
