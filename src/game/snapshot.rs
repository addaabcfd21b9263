//! Snapshot projection and send cadence.
//!
//! Snapshot rate is decoupled from the simulation rate so bandwidth can be
//! tuned without touching physics fidelity.

use crate::ws::protocol::{
    ActorSnapshot, GoalieSnapshot, PuckSnapshot, ShotEventSnapshot, StateSnapshot,
};

use super::state::MatchState;

/// Project the authoritative state into its wire form. Pure: does not
/// drain events (the builder does that once a snapshot actually ships).
pub fn project(state: &MatchState, t: u64) -> StateSnapshot {
    StateSnapshot {
        t,
        players: state
            .actors
            .iter()
            .map(|a| ActorSnapshot {
                id: a.id,
                team: a.team,
                x: a.pos.x,
                y: a.pos.y,
                vx: a.vel.x,
                vy: a.vel.y,
                dir_x: a.facing.x,
                dir_y: a.facing.y,
                seq: a.input_seq,
                shoot_charge: a.shoot_charge,
                stamina: a.stamina,
                stunned: a.stunned(),
            })
            .collect(),
        puck: PuckSnapshot {
            x: state.puck.pos.x,
            y: state.puck.pos.y,
            vx: state.puck.vel.x,
            vy: state.puck.vel.y,
            owner_id: state.puck.owner,
        },
        goalies: state
            .goalies
            .iter()
            .map(|g| GoalieSnapshot {
                team: g.team,
                x: g.pos.x,
                y: g.pos.y,
                stance: g.stance,
            })
            .collect(),
        events: state.events.clone(),
        physics: state.physics,
        shot_event: state.shot_event.map(|s| ShotEventSnapshot {
            team: s.team,
            quality: s.quality,
            intercept_y: s.intercept_y,
            deke: s.deke,
        }),
        scores: state.scores,
        phase: state.phase,
    }
}

/// Paces snapshot broadcasts in wall-clock time. Room ticks and snapshot
/// sends run at different rates, so pacing in whole ticks would round the
/// cadence away.
pub struct SnapshotBuilder {
    elapsed: f32,
    interval: f32,
}

impl SnapshotBuilder {
    pub fn new(hz: u32) -> Self {
        Self {
            elapsed: 0.0,
            interval: 1.0 / hz.max(1) as f32,
        }
    }

    /// Accumulate `dt` and report whether a snapshot is due. The remainder
    /// carries over so the long-run rate stays exact.
    pub fn should_send(&mut self, dt: f32) -> bool {
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.interval {
            self.elapsed = (self.elapsed - self.interval).min(self.interval);
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for phase transitions)
    pub fn force_next(&mut self) {
        self.elapsed = self.interval;
    }

    /// Build the wire snapshot and drain accumulated events.
    pub fn build(&mut self, state: &mut MatchState, t: u64) -> StateSnapshot {
        let snapshot = project(state, t);
        state.events.clear();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Rules;
    use crate::ws::protocol::{ArenaPhysics, GameEvent, Team};

    #[test]
    fn twenty_hz_cadence_from_thirty_hz_ticks() {
        let mut b = SnapshotBuilder::new(20);
        let dt = 1.0 / 30.0;
        let sent = (0..300).filter(|_| b.should_send(dt)).count();
        // 10 s of ticking at 30 Hz yields ~200 snapshots at 20 Hz
        assert!((195..=200).contains(&sent), "sent {sent}");
    }

    #[test]
    fn force_next_overrides_cadence() {
        let mut b = SnapshotBuilder::new(20);
        b.force_next();
        assert!(b.should_send(0.0));
        assert!(!b.should_send(0.0));
    }

    #[test]
    fn build_drains_events() {
        let mut state = MatchState::new(1, Rules::default(), ArenaPhysics::default());
        state.events.push(GameEvent::Goal { team: Team::Home });
        let mut b = SnapshotBuilder::new(1);
        let snap = b.build(&mut state, 99);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.t, 99);
        assert!(state.events.is_empty());
    }
}
