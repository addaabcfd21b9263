//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Team a skater slot belongs to. Slots 0..3 are home, 3..6 away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Home,
    Away,
}

impl Team {
    pub fn opponent(self) -> Self {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Team::Home => 0,
            Team::Away => 1,
        }
    }

    pub fn for_slot(slot: u8) -> Self {
        if slot < 3 {
            Team::Home
        } else {
            Team::Away
        }
    }
}

/// Match phase as exposed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    Playing,
    Goal,
    Finished,
}

/// Button bits in [`InputSample::buttons`] / `held`
pub const BTN_SHOOT: u8 = 1;
pub const BTN_PASS: u8 = 2;
pub const BTN_CHECK: u8 = 4;
/// Client-local actor switch; carried for wire completeness, never applied
/// by the server.
pub const BTN_SWITCH: u8 = 8;

/// One sampled frame of player input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    /// Desired movement, each axis in [-1, 1]
    pub x: f32,
    pub y: f32,
    /// One-shot action bitmask. Shoot fires on release: keep [`BTN_SHOOT`]
    /// in `held` while charging, then set it here on the release sample.
    /// Pass and check fire on press.
    pub buttons: u8,
    /// Level-triggered button bitmask (currently held)
    pub held: u8,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a new room; the creator becomes host in slot 0
    CreateRoom {
        #[serde(default)]
        allow_bots: bool,
        #[serde(default)]
        auto_start_bots: bool,
    },

    /// Join an existing room by code, optionally reclaiming a slot
    JoinRoom {
        code: String,
        /// Reconnection token from a previous `room_joined`/`room_created`
        token: Option<Uuid>,
    },

    /// Host request to start the match
    StartMatch,

    /// Player input for prediction/reconciliation
    Input {
        /// Strictly increasing per connection; stale values are dropped
        seq: u32,
        /// Client timestamp (millis), for diagnostics only
        time: u64,
        input: InputSample,
    },

    /// Ping for latency measurement
    Ping { time: u64 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Room created; sender is host
    RoomCreated {
        code: String,
        player_id: u8,
        team: Team,
        token: Uuid,
        host: bool,
    },

    /// Joined (or reclaimed a slot in) an existing room
    RoomJoined {
        code: String,
        player_id: u8,
        team: Team,
        token: Uuid,
        host: bool,
    },

    /// Recoverable protocol error (room not found, room full, bad code)
    Error { message: String },

    /// Connection roster, broadcast alongside state
    Lobby {
        players: Vec<LobbySlot>,
        started: bool,
    },

    /// Authoritative state snapshot
    State(StateSnapshot),

    /// Pong response
    Pong { time: u64, server_time: u64 },
}

/// One slot in the lobby roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySlot {
    pub slot: u8,
    pub team: Team,
    pub connected: bool,
}

/// Serialized projection of the authoritative match state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Server timestamp in millis
    pub t: u64,
    pub players: Vec<ActorSnapshot>,
    pub puck: PuckSnapshot,
    pub goalies: Vec<GoalieSnapshot>,
    /// Transient events since the previous snapshot
    pub events: Vec<GameEvent>,
    /// Arena physics tunables, so clients predict with the same constants
    pub physics: ArenaPhysics,
    pub shot_event: Option<ShotEventSnapshot>,
    pub scores: Scores,
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: u8,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    /// Last input sequence the server applied for this slot
    pub seq: u32,
    pub shoot_charge: f32,
    pub stamina: f32,
    pub stunned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PuckSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner_id: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalieSnapshot {
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub stance: GoalieStance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalieStance {
    Square,
    CheatLeft,
    CheatRight,
}

/// Active shot event, consumed by goalie reaction on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShotEventSnapshot {
    pub team: Team,
    /// Shot quality in [0, 1]; degrades goalie reaction as it rises
    pub quality: f32,
    /// Predicted goal-line intercept y
    pub intercept_y: f32,
    pub deke: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub home: u32,
    pub away: u32,
}

/// Arena physics tunables ("twists"), supplied per arena
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaPhysics {
    /// Velocity retained on wall reflection
    pub wall_damping: f32,
    /// Random velocity kick magnitude on wall reflection
    pub wall_jitter: f32,
    /// Goal-mouth band scale (1.0 = regulation)
    pub goal_width_scale: f32,
    /// Constant force applied to the free puck
    pub drift_x: f32,
    pub drift_y: f32,
}

impl Default for ArenaPhysics {
    fn default() -> Self {
        Self {
            wall_damping: 0.82,
            wall_jitter: 0.0,
            goal_width_scale: 1.0,
            drift_x: 0.0,
            drift_y: 0.0,
        }
    }
}

/// Discrete game events carried inside snapshots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Goal scored by `team`
    Goal { team: Team },
    /// Goalie save against `shooter_team`
    Save { shooter_team: Team },
    /// Body check landed
    Check { checker: u8, victim: u8 },
    /// Shot released
    Shot { shooter: u8, quality: f32 },
    /// Pass released toward a teammate
    Pass { from: u8, to: u8 },
    /// Match reached its end condition
    MatchOver { winner: Team },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_round_trips_tagged_json() {
        let json = r#"{"type":"join_room","code":"00042","token":null}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::JoinRoom { code, token } => {
                assert_eq!(code, "00042");
                assert!(token.is_none());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_message_type_fails_to_parse() {
        let json = r#"{"type":"format_disk"}"#;
        assert!(serde_json::from_str::<ClientMsg>(json).is_err());
    }

    #[test]
    fn input_sample_defaults_are_neutral() {
        let s = InputSample::default();
        assert_eq!(s.x, 0.0);
        assert_eq!(s.buttons, 0);
        assert_eq!(s.held, 0);
    }

    #[test]
    fn team_slot_mapping() {
        assert_eq!(Team::for_slot(0), Team::Home);
        assert_eq!(Team::for_slot(2), Team::Home);
        assert_eq!(Team::for_slot(3), Team::Away);
        assert_eq!(Team::for_slot(5), Team::Away);
        assert_eq!(Team::Home.opponent(), Team::Away);
    }
}
