//! Bot skater decisions.
//!
//! Bots write movement intents and one-shot action flags into the match
//! state before a step, through exactly the same fields human input uses;
//! the simulation never knows which is which. All randomness (mistake
//! injection) draws from the match RNG.

use rand::Rng;

use crate::ws::protocol::{Phase, Team};

use super::state::*;

/// Named bundle of bot parameters. `Adaptive` is the attribute-wise mean
/// of the named profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Personality {
    /// Skater attribute multipliers for bot-held slots
    pub speed: f32,
    pub accel: f32,
    /// Chance per decision window to pass when a lane exists
    pub pass_chance: f32,
    /// Distance to goal under which the carrier shoots
    pub shoot_dist: f32,
    /// How deep non-chasers sit toward their own goal
    pub defense_bias: f32,
    pub aggression: f32,
    /// Chance a decision is replaced by a blunder
    pub mistake_rate: f32,
}

impl Personality {
    pub const ROOKIE: Personality = Personality {
        speed: 0.85,
        accel: 0.85,
        pass_chance: 0.25,
        shoot_dist: 240.0,
        defense_bias: 0.9,
        aggression: 0.9,
        mistake_rate: 0.25,
    };

    pub const PRO: Personality = Personality {
        speed: 1.0,
        accel: 1.0,
        pass_chance: 0.45,
        shoot_dist: 300.0,
        defense_bias: 1.0,
        aggression: 1.0,
        mistake_rate: 0.1,
    };

    pub const ALLSTAR: Personality = Personality {
        speed: 1.1,
        accel: 1.1,
        pass_chance: 0.6,
        shoot_dist: 340.0,
        defense_bias: 1.1,
        aggression: 1.15,
        mistake_rate: 0.03,
    };

    /// Attribute-wise average of all named personalities
    pub fn adaptive() -> Personality {
        let all = [Self::ROOKIE, Self::PRO, Self::ALLSTAR];
        let n = all.len() as f32;
        Personality {
            speed: all.iter().map(|p| p.speed).sum::<f32>() / n,
            accel: all.iter().map(|p| p.accel).sum::<f32>() / n,
            pass_chance: all.iter().map(|p| p.pass_chance).sum::<f32>() / n,
            shoot_dist: all.iter().map(|p| p.shoot_dist).sum::<f32>() / n,
            defense_bias: all.iter().map(|p| p.defense_bias).sum::<f32>() / n,
            aggression: all.iter().map(|p| p.aggression).sum::<f32>() / n,
            mistake_rate: all.iter().map(|p| p.mistake_rate).sum::<f32>() / n,
        }
    }

    pub fn by_name(name: &str) -> Option<Personality> {
        match name {
            "rookie" => Some(Self::ROOKIE),
            "pro" => Some(Self::PRO),
            "allstar" => Some(Self::ALLSTAR),
            "adaptive" => Some(Self::adaptive()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BotIntent {
    mv: Vec2,
    shoot: bool,
    pass: bool,
    check: bool,
}

/// Drives every `is_bot` skater. Owns no state beyond its personality;
/// reads only what a player could see in `MatchState`.
#[derive(Debug, Clone)]
pub struct ActorController {
    personality: Personality,
}

impl ActorController {
    pub fn new(personality: Personality) -> Self {
        Self { personality }
    }

    /// Stamp personality attribute multipliers onto bot-held slots.
    /// Called when a slot flips to bot control.
    pub fn apply_attributes(&self, state: &mut MatchState) {
        for actor in state.actors.iter_mut().filter(|a| a.is_bot) {
            actor.attrs.speed = self.personality.speed;
            actor.attrs.accel = self.personality.accel;
        }
    }

    /// Compute and write intents for all bot slots, before a step runs.
    pub fn drive(&self, state: &mut MatchState) {
        if state.phase != Phase::Playing {
            for actor in state.actors.iter_mut().filter(|a| a.is_bot) {
                actor.move_intent = Vec2::ZERO;
                actor.pending = PendingActions::default();
            }
            return;
        }

        let mut intents = [BotIntent::default(); ACTOR_COUNT];
        for i in 0..ACTOR_COUNT {
            if state.actors[i].is_bot {
                intents[i] = self.decide(state, i as u8);
            }
        }
        for (i, intent) in intents.iter().enumerate() {
            let actor = &mut state.actors[i];
            if !actor.is_bot {
                continue;
            }
            actor.move_intent = intent.mv;
            actor.hold_shoot = false;
            actor.pending.shoot |= intent.shoot;
            actor.pending.pass |= intent.pass;
            actor.pending.check |= intent.check;
        }
    }

    fn decide(&self, state: &mut MatchState, id: u8) -> BotIntent {
        let me = state.actors[id as usize].clone();
        let tactics = state.tactics_of(me.team);
        let aggression = self.personality.aggression * tactics.aggression;
        let defense_bias = self.personality.defense_bias * tactics.defense_bias;
        let carrier = state.puck.owner;

        // Carrier: drive at the net, then hold / shoot / pass
        if carrier == Some(id) {
            return self.decide_carrier(state, &me, aggression);
        }

        let puck_pos = state.puck.pos;
        let chaser = team_chaser(state, me.team);

        // Chaser: close on the puck (or its carrier) and look for a check
        if chaser == Some(id) {
            let target = match carrier {
                Some(c) => state.actors[c as usize].pos,
                None => puck_pos + state.puck.vel * 0.15,
            };
            let mv = steer_toward(&me, target);
            let check = match carrier {
                Some(c) if state.actors[c as usize].team != me.team => {
                    me.pos.dist(state.actors[c as usize].pos)
                        < CHECK_RANGE * me.attrs.check_range * 1.1
                }
                _ => false,
            };
            return BotIntent {
                mv,
                check,
                ..Default::default()
            };
        }

        // Everyone else holds a role lane between the puck and our goal
        let own_goal_x = attacking_goal_x(me.team.opponent());
        let lane_y = match me.role {
            Role::Defender => RINK_H / 2.0,
            Role::Center => RINK_H / 2.0 + 110.0,
            Role::Wing => RINK_H / 2.0 - 110.0,
        };
        let depth = match me.role {
            Role::Defender => 0.35,
            Role::Center => 0.55,
            Role::Wing => 0.6,
        } / defense_bias.max(0.1);
        let hold_x = own_goal_x + (puck_pos.x - own_goal_x) * depth.min(0.9);
        let mut target = Vec2::new(hold_x, lane_y);

        // Mistake injection: occasionally wander toward the puck instead
        if state.rng.gen::<f32>() < self.personality.mistake_rate * 0.05 {
            target = puck_pos;
        }
        BotIntent {
            mv: steer_toward(&me, target),
            ..Default::default()
        }
    }

    fn decide_carrier(&self, state: &mut MatchState, me: &Actor, aggression: f32) -> BotIntent {
        let goal = Vec2::new(attacking_goal_x(me.team), RINK_H / 2.0);
        let dist_to_goal = me.pos.dist(goal);
        let mv = steer_toward(me, goal);

        let blunder = state.rng.gen::<f32>() < self.personality.mistake_rate * 0.1;
        if blunder {
            // Panic shot from anywhere
            return BotIntent {
                mv,
                shoot: true,
                ..Default::default()
            };
        }

        if dist_to_goal < self.personality.shoot_dist * aggression {
            return BotIntent {
                mv,
                shoot: true,
                ..Default::default()
            };
        }

        // Mid-ice: sometimes move the puck to a teammate closer to goal
        let has_outlet = state
            .teammates_of(me.id)
            .any(|t| (goal.x - t.pos.x).abs() < (goal.x - me.pos.x).abs());
        let roll: f32 = state.rng.gen();
        if has_outlet && roll < self.personality.pass_chance {
            return BotIntent {
                mv,
                pass: true,
                ..Default::default()
            };
        }
        BotIntent {
            mv,
            ..Default::default()
        }
    }
}

/// Nearest skater on `team` to the puck; it becomes the chaser.
fn team_chaser(state: &MatchState, team: Team) -> Option<u8> {
    state
        .actors
        .iter()
        .filter(|a| a.team == team)
        .min_by(|a, b| {
            let da = a.pos.dist(state.puck.pos);
            let db = b.pos.dist(state.puck.pos);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|a| a.id)
}

/// Movement intent toward a target, sprinting only over long hauls so
/// stamina survives the shift.
fn steer_toward(me: &Actor, target: Vec2) -> Vec2 {
    let delta = target - me.pos;
    let dist = delta.length();
    if dist < 6.0 {
        return Vec2::ZERO;
    }
    let dir = delta * (1.0 / dist);
    let throttle = if dist > 160.0 && me.stamina > 25.0 {
        1.0
    } else {
        0.85
    };
    dir * throttle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::ArenaPhysics;

    fn bot_match(seed: u64) -> MatchState {
        let mut state = MatchState::new(seed, Rules::default(), ArenaPhysics::default());
        for actor in &mut state.actors {
            actor.is_bot = true;
        }
        state
    }

    #[test]
    fn adaptive_is_the_mean_of_named_profiles() {
        let adaptive = Personality::adaptive();
        let expected =
            (Personality::ROOKIE.pass_chance + Personality::PRO.pass_chance + Personality::ALLSTAR.pass_chance) / 3.0;
        assert!((adaptive.pass_chance - expected).abs() < 1e-6);
        assert!(adaptive.speed > Personality::ROOKIE.speed);
        assert!(adaptive.speed < Personality::ALLSTAR.speed);
    }

    #[test]
    fn personality_lookup_by_name() {
        assert_eq!(Personality::by_name("pro"), Some(Personality::PRO));
        assert_eq!(Personality::by_name("adaptive"), Some(Personality::adaptive()));
        assert_eq!(Personality::by_name("galactic"), None);
    }

    #[test]
    fn nearest_teammate_chases_the_puck() {
        let mut state = bot_match(1);
        state.puck.pos = Vec2::new(200.0, 100.0);
        // Make the home wing (2) clearly nearest
        state.actors[2].pos = Vec2::new(210.0, 110.0);
        assert_eq!(team_chaser(&state, Team::Home), Some(2));
    }

    #[test]
    fn carrier_near_goal_shoots() {
        let mut state = bot_match(2);
        let controller = ActorController::new(Personality::ALLSTAR);
        state.puck.owner = Some(1);
        state.actors[1].pos = Vec2::new(RINK_W - 120.0, RINK_H / 2.0);
        controller.drive(&mut state);
        assert!(state.actors[1].pending.shoot || state.actors[1].pending.pass);
    }

    #[test]
    fn bots_idle_outside_playing_phase() {
        let mut state = bot_match(3);
        state.phase = Phase::Goal;
        state.actors[0].move_intent = Vec2::new(1.0, 0.0);
        let controller = ActorController::new(Personality::PRO);
        controller.drive(&mut state);
        assert_eq!(state.actors[0].move_intent, Vec2::ZERO);
        assert!(!state.actors[0].pending.shoot);
    }

    #[test]
    fn bot_decisions_are_deterministic_per_seed() {
        let controller = ActorController::new(Personality::PRO);
        let mut a = bot_match(7);
        let mut b = bot_match(7);
        for _ in 0..60 {
            controller.drive(&mut a);
            crate::game::step::step(&mut a, crate::util::time::SIM_STEP);
            controller.drive(&mut b);
            crate::game::step::step(&mut b, crate::util::time::SIM_STEP);
        }
        assert_eq!(
            crate::game::snapshot::project(&a, 0),
            crate::game::snapshot::project(&b, 0)
        );
    }

    #[test]
    fn full_bot_match_reaches_a_goal() {
        let controller = ActorController::new(Personality::ALLSTAR);
        let mut state = bot_match(11);
        controller.apply_attributes(&mut state);
        let mut scored = false;
        for _ in 0..60 * 120 {
            controller.drive(&mut state);
            crate::game::step::step(&mut state, crate::util::time::SIM_STEP);
            if state.scores.home + state.scores.away > 0 {
                scored = true;
                break;
            }
            if state.phase == Phase::Finished {
                break;
            }
        }
        assert!(scored, "two minutes of bot hockey should produce a goal");
    }
}
