//! One authoritative match room: six fixed slots, a tick loop, and the
//! channels that connect sessions to it.
//!
//! All mutation of a room's state happens inside its own task; sessions
//! talk to it through an mpsc command channel and listen on a broadcast
//! channel. A slow or dead client only lags its own broadcast receiver.

pub mod registry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::ai::{ActorController, Personality};
use crate::game::snapshot::SnapshotBuilder;
use crate::game::state::{GoalieAttributes, Rules, SkaterAttributes, Vec2, ACTOR_COUNT};
use crate::game::SimulationEngine;
use crate::util::time::{unix_millis, Timer, ROOM_TICK_MICROS, SNAPSHOT_HZ};
use crate::ws::protocol::{
    ArenaPhysics, InputSample, LobbySlot, Phase, ServerMsg, Team, BTN_CHECK, BTN_PASS, BTN_SHOOT,
};

/// Errors surfaced to clients as explicit `error` replies
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room not found")]
    NotFound,
    #[error("room is full")]
    RoomFull,
    #[error("room code must be a 5-digit number")]
    BadCodeFormat,
}

/// Options fixed at room creation
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub allow_bots: bool,
    pub auto_start_bots: bool,
    pub personality: Personality,
    pub rules: Rules,
    pub physics: ArenaPhysics,
    /// Per-slot skater multipliers from the external attribute source
    pub skaters: Option<Vec<SkaterAttributes>>,
    /// Per-team goalie parameters from the external attribute source
    pub goalies: Option<Vec<GoalieAttributes>>,
    /// Seconds a fully-disconnected room survives before reaping itself
    pub idle_timeout: f32,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            allow_bots: false,
            auto_start_bots: false,
            personality: Personality::PRO,
            rules: Rules::default(),
            physics: ArenaPhysics::default(),
            skaters: None,
            goalies: None,
            idle_timeout: 120.0,
        }
    }
}

/// What a successful join hands back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    pub code: String,
    pub slot: u8,
    pub team: Team,
    pub token: Uuid,
    pub host: bool,
}

/// Commands a session can send to a room task
#[derive(Debug)]
pub enum RoomCmd {
    Join {
        token: Option<Uuid>,
        reply: oneshot::Sender<Result<JoinGrant, RoomError>>,
    },
    StartMatch {
        slot: u8,
    },
    Input {
        slot: u8,
        seq: u32,
        sample: InputSample,
    },
    Disconnect {
        slot: u8,
    },
}

/// Cheap handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub code: String,
    pub cmd_tx: mpsc::Sender<RoomCmd>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    connected: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn connected_players(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }
}

/// One player slot. Tokens outlive disconnects so the same client can
/// reclaim its slot.
#[derive(Debug, Clone, Default)]
struct Slot {
    token: Option<Uuid>,
    connected: bool,
    last_input_seq: u32,
}

/// Outcome of one room tick
#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Shutdown,
}

pub struct Room {
    code: String,
    engine: SimulationEngine,
    slots: [Slot; ACTOR_COUNT],
    host_slot: Option<u8>,
    started: bool,
    options: RoomOptions,
    bots: ActorController,
    snapshots: SnapshotBuilder,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    connected: Arc<AtomicUsize>,
    idle_secs: f32,
}

impl Room {
    pub fn new(code: String, seed: u64, options: RoomOptions) -> (Self, RoomHandle, mpsc::Receiver<RoomCmd>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let connected = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            code: code.clone(),
            cmd_tx,
            broadcast_tx: broadcast_tx.clone(),
            connected: connected.clone(),
        };

        let mut engine = SimulationEngine::new(seed, options.rules, options.physics);
        // Pre-start rooms report the lobby phase; begin_match flips to play
        engine.state_mut().phase = Phase::Lobby;
        if let Some(skaters) = &options.skaters {
            for (actor, attrs) in engine.state_mut().actors.iter_mut().zip(skaters) {
                actor.attrs = *attrs;
            }
        }
        if let Some(goalies) = &options.goalies {
            for (goalie, attrs) in engine.state_mut().goalies.iter_mut().zip(goalies) {
                goalie.attrs = *attrs;
            }
        }

        let room = Self {
            code,
            engine,
            slots: Default::default(),
            host_slot: None,
            started: false,
            bots: ActorController::new(options.personality),
            snapshots: SnapshotBuilder::new(SNAPSHOT_HZ),
            options,
            broadcast_tx,
            connected,
            idle_secs: 0.0,
        };
        (room, handle, cmd_rx)
    }

    /// Run the authoritative tick loop until the room reaps itself.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<RoomCmd>) {
        info!(room_code = %self.code, "Room started");

        let mut tick_interval = interval(Duration::from_micros(ROOM_TICK_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut clock = Timer::new();

        loop {
            tick_interval.tick().await;

            // Drain pending session commands before stepping
            while let Ok(cmd) = cmd_rx.try_recv() {
                self.handle_cmd(cmd);
            }

            let dt = clock.bounded_delta();
            if self.tick(dt) == TickOutcome::Shutdown {
                break;
            }
        }

        info!(room_code = %self.code, "Room shut down");
    }

    fn handle_cmd(&mut self, cmd: RoomCmd) {
        match cmd {
            RoomCmd::Join { token, reply } => {
                let result = self.join(token);
                let _ = reply.send(result);
            }
            RoomCmd::StartMatch { slot } => self.start_match(slot),
            RoomCmd::Input { slot, seq, sample } => self.handle_input(slot, seq, sample),
            RoomCmd::Disconnect { slot } => self.disconnect(slot),
        }
    }

    /// Assign a slot: a matching reconnection token reclaims its old slot,
    /// otherwise the first never-bound slot is used.
    fn join(&mut self, token: Option<Uuid>) -> Result<JoinGrant, RoomError> {
        let slot = if let Some(idx) = token.and_then(|t| {
            self.slots
                .iter()
                .position(|s| s.token == Some(t) && !s.connected)
        }) {
            idx
        } else if let Some(idx) = self.slots.iter().position(|s| s.token.is_none()) {
            idx
        } else {
            return Err(RoomError::RoomFull);
        };

        let token = *self.slots[slot].token.get_or_insert_with(Uuid::new_v4);
        self.slots[slot].connected = true;
        self.sync_connected_count();

        if self.host_slot.is_none() {
            self.host_slot = Some(slot as u8);
        }
        self.engine.state_mut().actors[slot].is_bot = false;

        info!(room_code = %self.code, slot, "Player joined room");

        // Start conditions: bot rooms on first connect, full rooms always
        if !self.started {
            let all_connected = self.slots.iter().all(|s| s.connected);
            if all_connected || (self.options.allow_bots && self.options.auto_start_bots) {
                self.begin_match();
            }
        }
        self.broadcast_lobby();

        Ok(JoinGrant {
            code: self.code.clone(),
            slot: slot as u8,
            team: Team::for_slot(slot as u8),
            token,
            host: self.host_slot == Some(slot as u8),
        })
    }

    fn start_match(&mut self, slot: u8) {
        if self.started || self.host_slot != Some(slot) {
            return;
        }
        self.begin_match();
        self.broadcast_lobby();
    }

    fn begin_match(&mut self) {
        self.started = true;
        if self.options.allow_bots {
            for (i, s) in self.slots.iter().enumerate() {
                self.engine.state_mut().actors[i].is_bot = !s.connected;
            }
            self.bots.apply_attributes(self.engine.state_mut());
        }
        self.engine.state_mut().phase = Phase::Playing;
        self.engine.state_mut().reset_positions();
        self.snapshots.force_next();
        info!(room_code = %self.code, "Match started");
    }

    /// Apply input if its sequence strictly advances the slot's last
    /// accepted one. Stale and duplicate inputs are silently dropped.
    fn handle_input(&mut self, slot: u8, seq: u32, sample: InputSample) {
        let Some(slot_state) = self.slots.get_mut(slot as usize) else {
            return;
        };
        if !slot_state.connected || seq <= slot_state.last_input_seq {
            return;
        }
        slot_state.last_input_seq = seq;

        let actor = &mut self.engine.state_mut().actors[slot as usize];
        actor.input_seq = seq;
        actor.move_intent = Vec2::new(sample.x.clamp(-1.0, 1.0), sample.y.clamp(-1.0, 1.0));
        actor.hold_shoot = sample.held & BTN_SHOOT != 0;
        actor.pending.shoot |= sample.buttons & BTN_SHOOT != 0;
        actor.pending.pass |= sample.buttons & BTN_PASS != 0;
        actor.pending.check |= sample.buttons & BTN_CHECK != 0;
        // BTN_SWITCH is client-local and deliberately ignored here
    }

    /// Mark a slot disconnected but keep its token for reclaiming. In bot
    /// rooms the slot's skater falls back to bot control.
    fn disconnect(&mut self, slot: u8) {
        let Some(slot_state) = self.slots.get_mut(slot as usize) else {
            return;
        };
        if !slot_state.connected {
            return;
        }
        slot_state.connected = false;
        self.sync_connected_count();
        if self.options.allow_bots && self.started {
            self.engine.state_mut().actors[slot as usize].is_bot = true;
            self.bots.apply_attributes(self.engine.state_mut());
        } else {
            self.engine.state_mut().actors[slot as usize].move_intent = Vec2::ZERO;
        }
        debug!(room_code = %self.code, slot, "Player disconnected");
        self.broadcast_lobby();
    }

    /// One wall-clock tick: advance bots and simulation, broadcast at the
    /// snapshot cadence, track idleness.
    fn tick(&mut self, dt: f32) -> TickOutcome {
        if self.started && self.engine.state().phase != Phase::Finished {
            if self.options.allow_bots {
                self.bots.drive(self.engine.state_mut());
            }
            self.engine.advance(dt);
        }

        if self.snapshots.should_send(dt) {
            let snapshot = self.snapshots.build(self.engine.state_mut(), unix_millis());
            let _ = self.broadcast_tx.send(ServerMsg::State(snapshot));
            self.broadcast_lobby();
        }

        if self.connected.load(Ordering::Relaxed) == 0 {
            self.idle_secs += dt;
            if self.idle_secs >= self.options.idle_timeout {
                info!(room_code = %self.code, "Room idle past timeout, reaping");
                return TickOutcome::Shutdown;
            }
        } else {
            self.idle_secs = 0.0;
        }
        TickOutcome::Continue
    }

    fn broadcast_lobby(&self) {
        let players = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| LobbySlot {
                slot: i as u8,
                team: Team::for_slot(i as u8),
                connected: s.connected,
            })
            .collect();
        let _ = self.broadcast_tx.send(ServerMsg::Lobby {
            players,
            started: self.started,
        });
    }

    fn sync_connected_count(&self) {
        let n = self.slots.iter().filter(|s| s.connected).count();
        self.connected.store(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(options: RoomOptions) -> Room {
        let (room, _handle, _rx) = Room::new("00042".to_string(), 7, options);
        room
    }

    #[test]
    fn first_join_is_host_in_slot_zero() {
        let mut r = room(RoomOptions::default());
        let grant = r.join(None).unwrap();
        assert_eq!(grant.slot, 0);
        assert!(grant.host);
        assert_eq!(grant.team, Team::Home);
        let second = r.join(None).unwrap();
        assert_eq!(second.slot, 1);
        assert!(!second.host);
    }

    #[test]
    fn seventh_join_is_rejected_room_full() {
        let mut r = room(RoomOptions::default());
        for _ in 0..6 {
            r.join(None).unwrap();
        }
        assert_eq!(r.join(None), Err(RoomError::RoomFull));
    }

    #[test]
    fn token_reclaims_the_same_slot_after_disconnect() {
        let mut r = room(RoomOptions::default());
        let a = r.join(None).unwrap();
        let b = r.join(None).unwrap();
        r.disconnect(b.slot);
        // A stranger without the token gets a fresh slot
        let stranger = r.join(None).unwrap();
        assert_eq!(stranger.slot, 2);
        // The original token reclaims slot 1 with the same team
        let back = r.join(Some(b.token)).unwrap();
        assert_eq!(back.slot, b.slot);
        assert_eq!(back.team, b.team);
        assert_eq!(back.token, b.token);
        let _ = a;
    }

    #[test]
    fn stale_and_duplicate_input_is_dropped() {
        let mut r = room(RoomOptions::default());
        r.join(None).unwrap();
        let sample = |x: f32| InputSample {
            x,
            y: 0.0,
            buttons: 0,
            held: 0,
        };
        r.handle_input(0, 4, sample(0.1));
        r.handle_input(0, 5, sample(0.5));
        // Older seq after newer: ignored
        r.handle_input(0, 3, sample(-1.0));
        assert_eq!(r.engine.state().actors[0].move_intent.x, 0.5);
        // Exact duplicate: ignored
        r.handle_input(0, 5, sample(-1.0));
        assert_eq!(r.engine.state().actors[0].move_intent.x, 0.5);
        assert_eq!(r.slots[0].last_input_seq, 5);
    }

    #[test]
    fn one_shot_buttons_accumulate_until_consumed() {
        let mut r = room(RoomOptions::default());
        r.join(None).unwrap();
        r.handle_input(
            0,
            1,
            InputSample {
                x: 0.0,
                y: 0.0,
                buttons: BTN_PASS,
                held: 0,
            },
        );
        r.handle_input(
            0,
            2,
            InputSample {
                x: 0.0,
                y: 0.0,
                buttons: BTN_CHECK,
                held: 0,
            },
        );
        let pending = r.engine.state().actors[0].pending;
        assert!(pending.pass && pending.check);
    }

    #[test]
    fn input_for_disconnected_slot_is_ignored() {
        let mut r = room(RoomOptions::default());
        let g = r.join(None).unwrap();
        r.disconnect(g.slot);
        r.handle_input(
            g.slot,
            1,
            InputSample {
                x: 1.0,
                y: 0.0,
                buttons: 0,
                held: 0,
            },
        );
        assert_eq!(r.engine.state().actors[0].move_intent, Vec2::ZERO);
    }

    #[test]
    fn five_players_do_not_auto_start_but_the_sixth_does() {
        let mut r = room(RoomOptions::default());
        for _ in 0..5 {
            r.join(None).unwrap();
        }
        assert!(!r.started);
        r.join(None).unwrap();
        assert!(r.started);
    }

    #[test]
    fn bot_room_auto_starts_on_first_join() {
        let mut r = room(RoomOptions {
            allow_bots: true,
            auto_start_bots: true,
            ..Default::default()
        });
        r.join(None).unwrap();
        assert!(r.started);
        // All unoccupied slots are bot-controlled
        let bots = r
            .engine
            .state()
            .actors
            .iter()
            .filter(|a| a.is_bot)
            .count();
        assert_eq!(bots, 5);
    }

    #[test]
    fn non_host_cannot_start_the_match() {
        let mut r = room(RoomOptions::default());
        r.join(None).unwrap();
        let second = r.join(None).unwrap();
        r.start_match(second.slot);
        assert!(!r.started);
        r.start_match(0);
        assert!(r.started);
    }

    #[test]
    fn room_reports_lobby_phase_until_match_starts() {
        let mut r = room(RoomOptions::default());
        r.join(None).unwrap();
        assert_eq!(r.engine.state().phase, Phase::Lobby);
        r.start_match(0);
        assert_eq!(r.engine.state().phase, Phase::Playing);
    }

    #[test]
    fn disconnect_hands_slot_to_bots_in_bot_rooms() {
        let mut r = room(RoomOptions {
            allow_bots: true,
            auto_start_bots: true,
            ..Default::default()
        });
        let g = r.join(None).unwrap();
        assert!(!r.engine.state().actors[g.slot as usize].is_bot);
        r.disconnect(g.slot);
        assert!(r.engine.state().actors[g.slot as usize].is_bot);
    }

    #[test]
    fn idle_room_reaps_after_timeout() {
        let mut r = room(RoomOptions {
            idle_timeout: 1.0,
            ..Default::default()
        });
        let g = r.join(None).unwrap();
        r.disconnect(g.slot);
        assert_eq!(r.tick(0.5), TickOutcome::Continue);
        assert_eq!(r.tick(0.6), TickOutcome::Shutdown);
    }

    #[test]
    fn occupied_room_never_reaps() {
        let mut r = room(RoomOptions {
            idle_timeout: 1.0,
            ..Default::default()
        });
        r.join(None).unwrap();
        for _ in 0..100 {
            assert_eq!(r.tick(0.5), TickOutcome::Continue);
        }
    }

    #[test]
    fn started_room_advances_simulation_on_tick() {
        let mut r = room(RoomOptions {
            allow_bots: true,
            auto_start_bots: true,
            ..Default::default()
        });
        r.join(None).unwrap();
        let before = r.engine.state().tick;
        r.tick(0.1);
        assert!(r.engine.state().tick > before);
    }
}
