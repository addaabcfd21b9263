//! Authoritative match state: the rink, six skaters, two goalies, one puck.
//!
//! Everything in here is owned by a single room task and mutated only by
//! the step function in `game::step` (plus the bot controller writing
//! intents before a step). All randomness flows through the match RNG so a
//! seeded match replays byte-for-byte.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ws::protocol::{ArenaPhysics, GameEvent, GoalieStance, Phase, Scores, Team};

// Rink geometry. Origin is the top-left corner; home defends the x = 0
// goal line and attacks x = RINK_W.
pub const RINK_W: f32 = 960.0;
pub const RINK_H: f32 = 520.0;
pub const GOAL_MOUTH_HALF: f32 = 70.0;

pub const ACTOR_COUNT: usize = 6;
pub const STAMINA_MAX: f32 = 100.0;
pub const MOMENTUM_MAX: f32 = 25.0;

// Skater tuning
pub const SKATER_BASE_SPEED: f32 = 260.0;
pub const SKATER_BASE_ACCEL: f32 = 1050.0;
pub const SKATER_DAMPING: f32 = 0.965;
pub const SKATER_RADIUS: f32 = 14.0;
pub const SPRINT_MULT: f32 = 1.3;
pub const SPRINT_DRAIN: f32 = 22.0;
pub const STAMINA_REGEN: f32 = 9.0;
pub const STUN_SPEED_MULT: f32 = 0.35;
pub const BURST_MULT: f32 = 1.25;

// Puck tuning
pub const PUCK_DAMPING: f32 = 0.992;
pub const PUCK_MAX_SPEED: f32 = 900.0;
pub const PICKUP_RADIUS: f32 = 26.0;
pub const GLANCE_RADIUS: f32 = 20.0;
pub const CARRY_OFFSET: f32 = 20.0;
pub const PICKUP_MOMENTUM_BIAS: f32 = 0.08;
pub const RELEASE_FREE_TIME: f32 = 0.25;
pub const WALL_PIN_LIMIT: f32 = 1.5;

// Action tuning
pub const CHECK_RANGE: f32 = 42.0;
pub const CHECK_COOLDOWN: f32 = 1.2;
pub const CHECK_STAMINA_COST: f32 = 15.0;
pub const CHECK_STUN: f32 = 0.9;
pub const SNAP_SHOT_SPEED: f32 = 520.0;
pub const POWER_SHOT_SPEED: f32 = 800.0;
pub const SHOT_CHARGE_MAX: f32 = 1.0;
pub const PASS_SPEED: f32 = 430.0;
pub const SHOT_EVENT_TIME: f32 = 0.9;
pub const REBOUND_WINDOW: f32 = 1.5;
pub const PASS_CHAIN_WINDOW: f32 = 3.0;
pub const GIVE_AND_GO_BURST: f32 = 1.2;
pub const GOAL_PAUSE: f32 = 2.5;
pub const MOMENTUM_DECAY: f32 = 1.6;

// Goalie tuning
pub const GOALIE_LANE_DEPTH: f32 = 26.0;
pub const GOALIE_LANE_SLACK: f32 = 18.0;

/// 2D vector with just the surface the step function needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn dist(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector, or zero when the length is degenerate.
    pub fn normalized_or_zero(self) -> Vec2 {
        let len = self.length();
        if len > 1e-6 {
            Vec2::new(self.x / len, self.y / len)
        } else {
            Vec2::ZERO
        }
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        self + (other - self) * t
    }

    pub fn clamp_length(self, max: f32) -> Vec2 {
        let len = self.length();
        if len > max && len > 1e-6 {
            self * (max / len)
        } else {
            self
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Skater role, derived from slot id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Defender,
    Center,
    Wing,
}

impl Role {
    pub fn for_slot(slot: u8) -> Self {
        match slot % 3 {
            0 => Role::Defender,
            1 => Role::Center,
            _ => Role::Wing,
        }
    }
}

/// Per-skater stat multipliers supplied by an external attribute source.
/// All default to 1.0 (league-average skater).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkaterAttributes {
    pub speed: f32,
    pub accel: f32,
    pub shot_power: f32,
    pub shot_accuracy: f32,
    pub pass_speed: f32,
    pub pass_assist: f32,
    pub check_range: f32,
    pub stamina: f32,
}

impl Default for SkaterAttributes {
    fn default() -> Self {
        Self {
            speed: 1.0,
            accel: 1.0,
            shot_power: 1.0,
            shot_accuracy: 1.0,
            pass_speed: 1.0,
            pass_assist: 1.0,
            check_range: 1.0,
            stamina: 1.0,
        }
    }
}

/// Per-goalie parameters from the external attribute source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalieAttributes {
    /// Tracking gain toward the desired lane position (1/s)
    pub reaction: f32,
    /// Lane speed cap (px/s)
    pub speed: f32,
    pub radius: f32,
    /// Scales rebound damping; higher control kills the puck dead
    pub puck_control: f32,
}

impl Default for GoalieAttributes {
    fn default() -> Self {
        Self {
            reaction: 7.0,
            speed: 230.0,
            radius: 16.0,
            puck_control: 1.0,
        }
    }
}

/// One-shot action flags, each consumed and cleared exactly once per step
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingActions {
    pub shoot: bool,
    pub pass: bool,
    pub check: bool,
}

/// A skater. Slots 0..3 home, 3..6 away; role = slot % 3.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: u8,
    pub team: Team,
    pub role: Role,
    pub pos: Vec2,
    pub vel: Vec2,
    pub facing: Vec2,
    pub stamina: f32,
    pub stun_timer: f32,
    pub check_cooldown: f32,
    pub shoot_charge: f32,
    /// Timed give-and-go speed bonus
    pub burst_timer: f32,
    pub attrs: SkaterAttributes,
    /// Current movement intent, persists until replaced by newer input
    pub move_intent: Vec2,
    /// Shoot button currently held (charging)
    pub hold_shoot: bool,
    pub pending: PendingActions,
    /// Last input sequence applied for this slot (echoed in snapshots)
    pub input_seq: u32,
    pub is_bot: bool,
}

impl Actor {
    pub fn new(id: u8, attrs: SkaterAttributes) -> Self {
        let team = Team::for_slot(id);
        Self {
            id,
            team,
            role: Role::for_slot(id),
            pos: kickoff_position(id),
            vel: Vec2::ZERO,
            facing: attack_direction(team),
            stamina: STAMINA_MAX,
            stun_timer: 0.0,
            check_cooldown: 0.0,
            shoot_charge: 0.0,
            burst_timer: 0.0,
            attrs,
            move_intent: Vec2::ZERO,
            hold_shoot: false,
            pending: PendingActions::default(),
            input_seq: 0,
            is_bot: false,
        }
    }

    pub fn stunned(&self) -> bool {
        self.stun_timer > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct Puck {
    pub pos: Vec2,
    pub vel: Vec2,
    /// At most one owner at any time
    pub owner: Option<u8>,
    /// Repossession cooldown after a release
    pub free_timer: f32,
    /// How long the puck has been stalled against a wall
    pub pin_timer: f32,
    pub spin: f32,
}

impl Puck {
    fn at_center() -> Self {
        Self {
            pos: Vec2::new(RINK_W / 2.0, RINK_H / 2.0),
            vel: Vec2::ZERO,
            owner: None,
            free_timer: 0.0,
            pin_timer: 0.0,
            spin: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Goalie {
    pub team: Team,
    pub pos: Vec2,
    pub stance: GoalieStance,
    /// While positive, the goalie is committed toward `commit_y`
    pub commit_timer: f32,
    pub commit_y: f32,
    /// Previous lane movement sign, for reversal detection
    pub last_dir: f32,
    pub attrs: GoalieAttributes,
}

impl Goalie {
    pub fn new(team: Team, attrs: GoalieAttributes) -> Self {
        Self {
            team,
            pos: goalie_home(team),
            stance: GoalieStance::Square,
            commit_timer: 0.0,
            commit_y: RINK_H / 2.0,
            last_dir: 0.0,
            attrs,
        }
    }

    /// Lane x coordinate this goalie is pinned to
    pub fn lane_x(&self) -> f32 {
        match self.team {
            Team::Home => GOALIE_LANE_DEPTH,
            Team::Away => RINK_W - GOALIE_LANE_DEPTH,
        }
    }
}

/// Rule set for a match
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub score_to_win: u32,
    pub mercy_rule: bool,
    pub mercy_margin: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            score_to_win: 5,
            mercy_rule: true,
            mercy_margin: 5,
        }
    }
}

/// Per-team tactical bias, nudged after every goal (leader safer, trailer
/// riskier) and reset to neutral on a tie.
#[derive(Debug, Clone, Copy)]
pub struct TeamTactics {
    pub aggression: f32,
    pub defense_bias: f32,
}

impl Default for TeamTactics {
    fn default() -> Self {
        Self {
            aggression: 1.0,
            defense_bias: 1.0,
        }
    }
}

/// Active shot, consumed by goalie reaction logic
#[derive(Debug, Clone, Copy)]
pub struct ShotEvent {
    pub team: Team,
    pub quality: f32,
    pub intercept_y: f32,
    pub deke: bool,
    pub timer: f32,
}

/// Consecutive-completion pass tracking
#[derive(Debug, Clone, Copy, Default)]
pub struct PassChain {
    pub team: Option<Team>,
    pub count: u32,
    pub timer: f32,
    pub last_passer: Option<u8>,
    /// Intended receiver of the in-flight pass
    pub target: Option<u8>,
}

/// Authoritative state of one match
#[derive(Debug, Clone)]
pub struct MatchState {
    pub tick: u64,
    pub actors: [Actor; ACTOR_COUNT],
    pub puck: Puck,
    pub goalies: [Goalie; 2],
    pub scores: Scores,
    pub phase: Phase,
    pub goal_timer: f32,
    /// Per-team tactical bonus in [-MOMENTUM_MAX, MOMENTUM_MAX]
    pub momentum: [f32; 2],
    pub pass_chain: PassChain,
    pub shot_event: Option<ShotEvent>,
    /// Open rebound-bonus window for (team, remaining seconds)
    pub rebound: Option<(Team, f32)>,
    pub rules: Rules,
    pub physics: ArenaPhysics,
    pub tactics: [TeamTactics; 2],
    /// Events since the last snapshot drain
    pub events: Vec<GameEvent>,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(seed: u64, rules: Rules, physics: ArenaPhysics) -> Self {
        use rand::SeedableRng;
        let actors = std::array::from_fn(|i| Actor::new(i as u8, SkaterAttributes::default()));
        Self {
            tick: 0,
            actors,
            puck: Puck::at_center(),
            goalies: [
                Goalie::new(Team::Home, GoalieAttributes::default()),
                Goalie::new(Team::Away, GoalieAttributes::default()),
            ],
            scores: Scores::default(),
            phase: Phase::Playing,
            goal_timer: 0.0,
            momentum: [0.0; 2],
            pass_chain: PassChain::default(),
            shot_event: None,
            rebound: None,
            rules,
            physics,
            tactics: [TeamTactics::default(); 2],
            events: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Effective goal-mouth half height for this arena
    pub fn goal_mouth_half(&self) -> f32 {
        GOAL_MOUTH_HALF * self.physics.goal_width_scale
    }

    pub fn in_goal_mouth(&self, y: f32) -> bool {
        (y - RINK_H / 2.0).abs() <= self.goal_mouth_half()
    }

    pub fn momentum_of(&self, team: Team) -> f32 {
        self.momentum[team.index()]
    }

    pub fn add_momentum(&mut self, team: Team, amount: f32) {
        let m = &mut self.momentum[team.index()];
        *m = (*m + amount).clamp(-MOMENTUM_MAX, MOMENTUM_MAX);
    }

    pub fn tactics_of(&self, team: Team) -> TeamTactics {
        self.tactics[team.index()]
    }

    pub fn score_of(&self, team: Team) -> u32 {
        match team {
            Team::Home => self.scores.home,
            Team::Away => self.scores.away,
        }
    }

    /// Kickoff layout: everything transient resets, scores/phase/tactics
    /// persist. Called at match start and after every goal.
    pub fn reset_positions(&mut self) {
        for actor in &mut self.actors {
            actor.pos = kickoff_position(actor.id);
            actor.vel = Vec2::ZERO;
            actor.facing = attack_direction(actor.team);
            actor.stun_timer = 0.0;
            actor.check_cooldown = 0.0;
            actor.shoot_charge = 0.0;
            actor.burst_timer = 0.0;
            actor.move_intent = Vec2::ZERO;
            actor.hold_shoot = false;
            actor.pending = PendingActions::default();
        }
        self.puck = Puck::at_center();
        for goalie in &mut self.goalies {
            goalie.pos = goalie_home(goalie.team);
            goalie.stance = GoalieStance::Square;
            goalie.commit_timer = 0.0;
            goalie.last_dir = 0.0;
        }
        self.shot_event = None;
        self.rebound = None;
        self.pass_chain = PassChain::default();
    }

    /// Re-bias tactics after a goal: leader plays safer, trailer riskier.
    pub fn rebias_tactics(&mut self) {
        let (home, away) = (self.scores.home, self.scores.away);
        let bias = |leading: bool, trailing: bool| {
            if leading {
                TeamTactics {
                    aggression: 0.85,
                    defense_bias: 1.2,
                }
            } else if trailing {
                TeamTactics {
                    aggression: 1.2,
                    defense_bias: 0.85,
                }
            } else {
                TeamTactics::default()
            }
        };
        self.tactics[Team::Home.index()] = bias(home > away, home < away);
        self.tactics[Team::Away.index()] = bias(away > home, away < home);
    }

    pub fn teammates_of(&self, id: u8) -> impl Iterator<Item = &Actor> {
        let team = self.actors[id as usize].team;
        self.actors
            .iter()
            .filter(move |a| a.team == team && a.id != id)
    }
}

/// Kickoff position for a slot
pub fn kickoff_position(slot: u8) -> Vec2 {
    let mid = RINK_H / 2.0;
    let home = match Role::for_slot(slot) {
        Role::Defender => Vec2::new(170.0, mid),
        Role::Center => Vec2::new(400.0, mid),
        Role::Wing => Vec2::new(320.0, mid - 140.0),
    };
    if Team::for_slot(slot) == Team::Home {
        home
    } else {
        // Mirror across the center line
        Vec2::new(RINK_W - home.x, home.y)
    }
}

/// Unit vector toward the goal `team` attacks
pub fn attack_direction(team: Team) -> Vec2 {
    match team {
        Team::Home => Vec2::new(1.0, 0.0),
        Team::Away => Vec2::new(-1.0, 0.0),
    }
}

/// Goal line x of the goal `team` attacks
pub fn attacking_goal_x(team: Team) -> f32 {
    match team {
        Team::Home => RINK_W,
        Team::Away => 0.0,
    }
}

fn goalie_home(team: Team) -> Vec2 {
    let x = match team {
        Team::Home => GOALIE_LANE_DEPTH,
        Team::Away => RINK_W - GOALIE_LANE_DEPTH,
    };
    Vec2::new(x, RINK_H / 2.0)
}
