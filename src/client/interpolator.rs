//! Snapshot interpolation and input pacing.
//!
//! Remote entities render a short interval in the past, interpolated between
//! the two buffered snapshots bracketing the render time. The delay adapts
//! to measured round-trip time so a jittery link buys more buffer and a
//! clean one stays responsive.

use std::collections::VecDeque;

use crate::ws::protocol::{ActorSnapshot, InputSample, StateSnapshot};

/// Lower bound on interpolation delay (roughly one snapshot interval)
pub const INTERP_DELAY_MIN: f32 = 0.06;
/// Upper bound; past this the game feels like replay, not play
pub const INTERP_DELAY_MAX: f32 = 0.30;
/// Extra padding over the RTT-derived delay, absorbs send jitter
const DELAY_PADDING: f32 = 0.04;
/// EMA weight for new RTT samples
const RTT_ALPHA: f32 = 0.1;
/// Buffered snapshot cap (~1.6 s at 20 Hz)
const BUFFER_MAX: usize = 32;

pub struct SnapshotInterpolator {
    /// (local arrival time in seconds, snapshot), oldest first
    buffer: VecDeque<(f64, StateSnapshot)>,
    delay: f32,
    rtt_secs: Option<f32>,
}

impl Default for SnapshotInterpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotInterpolator {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            delay: 0.1,
            rtt_secs: None,
        }
    }

    /// Current interpolation delay in seconds
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Record a pong round trip and adapt the delay
    pub fn observe_rtt(&mut self, rtt_secs: f32) {
        let smoothed = match self.rtt_secs {
            Some(prev) => prev + RTT_ALPHA * (rtt_secs - prev),
            None => rtt_secs,
        };
        self.rtt_secs = Some(smoothed);
        self.delay = (smoothed * 1.5 + DELAY_PADDING).clamp(INTERP_DELAY_MIN, INTERP_DELAY_MAX);
    }

    /// Buffer an incoming snapshot, stamped with local arrival time
    pub fn push(&mut self, now_secs: f64, snapshot: StateSnapshot) {
        // Out-of-order delivery would corrupt the bracketing search; the
        // transport is ordered, so just guard against clock weirdness.
        if self
            .buffer
            .back()
            .is_some_and(|(t, _)| now_secs < *t)
        {
            return;
        }
        if self.buffer.len() >= BUFFER_MAX {
            self.buffer.pop_front();
        }
        self.buffer.push_back((now_secs, snapshot));
    }

    /// Sample the interpolated state for rendering at `now_secs`.
    /// Returns `None` until the first snapshot arrives.
    pub fn sample(&self, now_secs: f64) -> Option<StateSnapshot> {
        let target = now_secs - self.delay as f64;

        let (first_t, first) = self.buffer.front()?;
        if target <= *first_t {
            return Some(first.clone());
        }
        let (last_t, last) = self.buffer.back()?;
        if target >= *last_t {
            // Buffer ran dry; hold the latest rather than extrapolate
            return Some(last.clone());
        }

        for pair in self.buffer.iter().zip(self.buffer.iter().skip(1)) {
            let ((t0, a), (t1, b)) = pair;
            if target >= *t0 && target <= *t1 {
                let span = (t1 - t0).max(1e-6);
                let alpha = ((target - t0) / span) as f32;
                return Some(blend(a, b, alpha));
            }
        }
        Some(last.clone())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Interpolate continuous fields between two snapshots; discrete fields
/// (events, scores, phase, possession) come from the newer one.
fn blend(a: &StateSnapshot, b: &StateSnapshot, alpha: f32) -> StateSnapshot {
    let mut out = b.clone();
    out.players = b
        .players
        .iter()
        .map(|pb| match a.players.iter().find(|pa| pa.id == pb.id) {
            Some(pa) => blend_actor(pa, pb, alpha),
            None => *pb,
        })
        .collect();
    out.puck.x = lerp(a.puck.x, b.puck.x, alpha);
    out.puck.y = lerp(a.puck.y, b.puck.y, alpha);
    out.puck.vx = lerp(a.puck.vx, b.puck.vx, alpha);
    out.puck.vy = lerp(a.puck.vy, b.puck.vy, alpha);
    out.goalies = b
        .goalies
        .iter()
        .map(|gb| {
            let mut g = *gb;
            if let Some(ga) = a.goalies.iter().find(|ga| ga.team == gb.team) {
                g.x = lerp(ga.x, gb.x, alpha);
                g.y = lerp(ga.y, gb.y, alpha);
            }
            g
        })
        .collect();
    out
}

fn blend_actor(a: &ActorSnapshot, b: &ActorSnapshot, alpha: f32) -> ActorSnapshot {
    let mut p = *b;
    p.x = lerp(a.x, b.x, alpha);
    p.y = lerp(a.y, b.y, alpha);
    p.vx = lerp(a.vx, b.vx, alpha);
    p.vy = lerp(a.vy, b.vy, alpha);
    p.dir_x = lerp(a.dir_x, b.dir_x, alpha);
    p.dir_y = lerp(a.dir_y, b.dir_y, alpha);
    p.shoot_charge = lerp(a.shoot_charge, b.shoot_charge, alpha);
    p.stamina = lerp(a.stamina, b.stamina, alpha);
    p
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Decides which sampled inputs are worth a network send.
///
/// Sends on any button press, a change in held buttons, movement beyond a
/// small deadband, or a periodic heartbeat so the server keeps fresh input
/// even while the stick is parked.
pub struct InputPacer {
    last_sent: Option<InputSample>,
    since_send: f32,
    heartbeat: f32,
    deadband: f32,
}

impl Default for InputPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputPacer {
    pub fn new() -> Self {
        Self {
            last_sent: None,
            since_send: 0.0,
            heartbeat: 0.25,
            deadband: 0.05,
        }
    }

    pub fn should_send(&mut self, sample: &InputSample, dt: f32) -> bool {
        self.since_send += dt;
        let send = match &self.last_sent {
            None => true,
            Some(prev) => {
                sample.buttons != 0
                    || sample.held != prev.held
                    || (sample.x - prev.x).abs() > self.deadband
                    || (sample.y - prev.y).abs() > self.deadband
                    || self.since_send >= self.heartbeat
            }
        };
        if send {
            self.last_sent = Some(*sample);
            self.since_send = 0.0;
        }
        send
    }
}
