//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Room tick loop rate (wall-clock driver for the simulation)
pub const ROOM_TICK_HZ: u32 = 30;
/// Snapshot broadcast rate, decoupled from both sim step and room tick
pub const SNAPSHOT_HZ: u32 = 20;
/// Fixed simulation step in seconds. The engine accumulates room-tick
/// deltas and consumes them in slices of exactly this size.
pub const SIM_STEP: f32 = 1.0 / 60.0;
/// Largest wall-clock delta a single room tick will consume. Stalls longer
/// than this are dropped instead of replayed as a burst of catch-up steps.
pub const MAX_TICK_DELTA: f32 = 0.25;

pub const ROOM_TICK_MICROS: u64 = 1_000_000 / ROOM_TICK_HZ as u64;

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Seconds since the last reset, clamped to [`MAX_TICK_DELTA`].
    pub fn bounded_delta(&mut self) -> f32 {
        let dt = self.start.elapsed().as_secs_f32();
        self.start = Instant::now();
        dt.min(MAX_TICK_DELTA)
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
