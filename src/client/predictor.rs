//! Client-side prediction and reconciliation for the local skater.
//!
//! Local input is applied immediately to a speculative copy of the local
//! actor and buffered with its sequence number. When an authoritative
//! snapshot acknowledges a sequence, everything at or below it is dropped
//! and the newer inputs are replayed on top of the server state. Small
//! divergence blends away over frames; large divergence snaps.

use std::collections::VecDeque;

use crate::game::state::{
    attack_direction, kickoff_position, Vec2, SKATER_BASE_ACCEL, SKATER_BASE_SPEED, SPRINT_DRAIN,
    SPRINT_MULT, STAMINA_MAX, STAMINA_REGEN,
};
use crate::game::step::{integrate_skater, SkaterKinematics};
use crate::util::time::SIM_STEP;
use crate::ws::protocol::{ActorSnapshot, InputSample, StateSnapshot, Team};

/// Divergence above which we snap to authoritative and drop the buffer
pub const SNAP_THRESHOLD: f32 = 48.0;
/// Divergence above which we blend instead of silently accepting
pub const BLEND_THRESHOLD: f32 = 2.0;
/// Fraction of the error corrected per reconcile when blending
pub const BLEND_RATE: f32 = 0.35;
/// Pending-input cap (~2 s at 60 Hz)
const MAX_PENDING: usize = 128;

#[derive(Debug, Clone, Copy)]
struct PendingInput {
    seq: u32,
    sample: InputSample,
}

pub struct ClientPredictor {
    actor_id: u8,
    kin: SkaterKinematics,
    /// Local stamina estimate, driving the same sprint gate the server uses
    stamina: f32,
    pending: VecDeque<PendingInput>,
    next_seq: u32,
}

impl ClientPredictor {
    pub fn new(actor_id: u8) -> Self {
        Self {
            actor_id,
            kin: SkaterKinematics {
                pos: kickoff_position(actor_id),
                vel: Vec2::ZERO,
                facing: attack_direction(Team::for_slot(actor_id)),
            },
            stamina: STAMINA_MAX,
            pending: VecDeque::new(),
            next_seq: 1,
        }
    }

    pub fn actor_id(&self) -> u8 {
        self.actor_id
    }

    /// Current predicted position of the local skater
    pub fn predicted(&self) -> SkaterKinematics {
        self.kin
    }

    pub fn stamina(&self) -> f32 {
        self.stamina
    }

    /// Apply a locally captured input immediately and buffer it. Returns
    /// the sequence number to send to the server.
    pub fn predict(&mut self, sample: InputSample) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        apply_input(&mut self.kin, &mut self.stamina, &sample);
        if self.pending.len() >= MAX_PENDING {
            self.pending.pop_front();
        }
        self.pending.push_back(PendingInput { seq, sample });
        seq
    }

    /// Client-local actor switch: retarget prediction onto another skater,
    /// seeding from the latest snapshot. Never sent to the server as a
    /// simulation action.
    pub fn switch_actor(&mut self, new_id: u8, snapshot: &StateSnapshot) {
        self.actor_id = new_id;
        if let Some(actor) = find_actor(snapshot, new_id) {
            self.kin = kin_from(actor);
            self.stamina = actor.stamina;
        }
        self.pending.clear();
    }

    /// Reconcile against an authoritative snapshot.
    pub fn reconcile(&mut self, snapshot: &StateSnapshot) {
        let Some(actor) = find_actor(snapshot, self.actor_id) else {
            return;
        };

        // Drop everything the server already applied
        while self
            .pending
            .front()
            .is_some_and(|p| p.seq <= actor.seq)
        {
            self.pending.pop_front();
        }

        // Replay the unacknowledged suffix on top of authoritative state,
        // reseeding the stamina estimate from the server's value
        let authoritative = kin_from(actor);
        let mut corrected = authoritative;
        let mut stamina = actor.stamina;
        for p in &self.pending {
            apply_input(&mut corrected, &mut stamina, &p.sample);
        }

        let error = self.kin.pos.dist(corrected.pos);
        if error > SNAP_THRESHOLD {
            // Desync: hard snap and start over
            self.kin = authoritative;
            self.stamina = actor.stamina;
            self.pending.clear();
        } else if error > BLEND_THRESHOLD {
            // Soft correction, no visible teleport
            self.kin.pos = self.kin.pos.lerp(corrected.pos, BLEND_RATE);
            self.kin.vel = corrected.vel;
            self.kin.facing = corrected.facing;
            self.stamina = stamina;
        } else {
            self.kin = corrected;
            self.stamina = stamina;
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// One fixed slice of the same integration and sprint model the server runs
/// for a league-average skater. Full-tilt intent sprints while stamina
/// lasts, exactly as in the server's movement phase; stun and attribute
/// multipliers are server-side state and get absorbed by reconciliation.
fn apply_input(kin: &mut SkaterKinematics, stamina: &mut f32, sample: &InputSample) {
    let intent = Vec2::new(sample.x.clamp(-1.0, 1.0), sample.y.clamp(-1.0, 1.0));
    let sprinting = intent.length() > 0.95 && *stamina > 0.0;
    if sprinting {
        *stamina -= SPRINT_DRAIN * SIM_STEP;
    } else {
        *stamina += STAMINA_REGEN * SIM_STEP;
    }
    *stamina = stamina.clamp(0.0, STAMINA_MAX);

    let max_speed = if sprinting {
        SKATER_BASE_SPEED * SPRINT_MULT
    } else {
        SKATER_BASE_SPEED
    };
    integrate_skater(kin, intent, max_speed, SKATER_BASE_ACCEL, SIM_STEP);
}

fn find_actor(snapshot: &StateSnapshot, id: u8) -> Option<&ActorSnapshot> {
    snapshot.players.iter().find(|p| p.id == id)
}

fn kin_from(actor: &ActorSnapshot) -> SkaterKinematics {
    SkaterKinematics {
        pos: Vec2::new(actor.x, actor.y),
        vel: Vec2::new(actor.vx, actor.vy),
        facing: Vec2::new(actor.dir_x, actor.dir_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::project;
    use crate::game::state::{MatchState, Rules};
    use crate::ws::protocol::ArenaPhysics;

    fn sample(x: f32, y: f32) -> InputSample {
        InputSample {
            x,
            y,
            buttons: 0,
            held: 0,
        }
    }

    /// Build a snapshot whose actor 0 reflects `kin` with ack `seq`
    fn snapshot_with(kin: SkaterKinematics, stamina: f32, seq: u32) -> StateSnapshot {
        let mut state = MatchState::new(0, Rules::default(), ArenaPhysics::default());
        state.actors[0].pos = kin.pos;
        state.actors[0].vel = kin.vel;
        state.actors[0].facing = kin.facing;
        state.actors[0].stamina = stamina;
        state.actors[0].input_seq = seq;
        project(&state, 0)
    }

    #[test]
    fn reconcile_is_a_noop_on_a_perfect_prediction() {
        let mut predictor = ClientPredictor::new(0);

        // Server-side mirror of the same integration
        let mut server = predictor.predicted();
        let mut server_stamina = predictor.stamina();
        let inputs: Vec<InputSample> = (0..10).map(|i| sample(0.5, (i as f32) * 0.1 - 0.4)).collect();

        for input in &inputs {
            predictor.predict(*input);
        }
        // Server has applied the first six (seqs 1..=6)
        for input in &inputs[..6] {
            apply_input(&mut server, &mut server_stamina, input);
        }

        let before = predictor.predicted();
        predictor.reconcile(&snapshot_with(server, server_stamina, 6));
        let after = predictor.predicted();

        assert!(before.pos.dist(after.pos) < 1e-3);
        assert_eq!(predictor.pending_len(), 4);
    }

    #[test]
    fn acknowledged_inputs_are_discarded() {
        let mut predictor = ClientPredictor::new(0);
        for _ in 0..8 {
            predictor.predict(sample(1.0, 0.0));
        }
        let auth = predictor.predicted();
        predictor.reconcile(&snapshot_with(auth, predictor.stamina(), 5));
        assert_eq!(predictor.pending_len(), 3);
    }

    #[test]
    fn full_stick_sprint_prediction_tracks_the_server() {
        use crate::game::step::step;

        let mut state = MatchState::new(0, Rules::default(), ArenaPhysics::default());
        let mut predictor = ClientPredictor::new(0);
        // Two seconds of fully deflected stick, the normal way to skate
        for _ in 0..120 {
            state.actors[0].move_intent = Vec2::new(1.0, 0.0);
            step(&mut state, SIM_STEP);
            predictor.predict(sample(1.0, 0.0));
        }
        let divergence = predictor.predicted().pos.dist(state.actors[0].pos);
        assert!(
            divergence < 1.0,
            "sprinting prediction drifted {divergence}px from the server"
        );
        assert!((predictor.stamina() - state.actors[0].stamina).abs() < 1.0);
    }

    #[test]
    fn large_divergence_snaps_to_authoritative() {
        let mut predictor = ClientPredictor::new(0);
        for _ in 0..5 {
            predictor.predict(sample(1.0, 0.0));
        }
        // Server says we are somewhere else entirely
        let far = SkaterKinematics {
            pos: Vec2::new(50.0, 50.0),
            vel: Vec2::ZERO,
            facing: Vec2::new(1.0, 0.0),
        };
        predictor.reconcile(&snapshot_with(far, STAMINA_MAX, 5));
        assert_eq!(predictor.predicted().pos, far.pos);
        assert_eq!(predictor.pending_len(), 0);
    }

    #[test]
    fn moderate_divergence_blends_without_teleporting() {
        let mut predictor = ClientPredictor::new(0);
        predictor.predict(sample(0.0, 0.0));
        let predicted = predictor.predicted();
        // Authoritative position a dozen pixels off
        let off = SkaterKinematics {
            pos: predicted.pos + Vec2::new(12.0, 0.0),
            vel: predicted.vel,
            facing: predicted.facing,
        };
        predictor.reconcile(&snapshot_with(off, predictor.stamina(), 1));
        let corrected = predictor.predicted();
        let moved = predicted.pos.dist(corrected.pos);
        assert!(moved > 0.0, "some correction must happen");
        assert!(moved < 12.0, "but not a full teleport");
    }

    #[test]
    fn switch_actor_reseeds_from_snapshot_and_clears_buffer() {
        let mut predictor = ClientPredictor::new(0);
        predictor.predict(sample(1.0, 1.0));
        let mut state = MatchState::new(0, Rules::default(), ArenaPhysics::default());
        state.actors[2].pos = Vec2::new(123.0, 231.0);
        let snap = project(&state, 0);
        predictor.switch_actor(2, &snap);
        assert_eq!(predictor.actor_id(), 2);
        assert_eq!(predictor.predicted().pos, Vec2::new(123.0, 231.0));
        assert_eq!(predictor.pending_len(), 0);
    }
}
