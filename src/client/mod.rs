//! Client-side library: prediction, reconciliation, and snapshot
//! interpolation.
//!
//! These modules are pure and I/O-free so any Rust client (native renderer,
//! headless bot harness) can drive them from its own loop. They share the
//! skater integration routine with the server, which is what makes
//! reconciliation a no-op on a perfectly predicted client.

pub mod interpolator;
pub mod predictor;

pub use interpolator::{InputPacer, SnapshotInterpolator};
pub use predictor::ClientPredictor;
