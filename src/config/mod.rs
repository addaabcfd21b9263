//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::game::ai::Personality;
use crate::game::state::{GoalieAttributes, Rules, SkaterAttributes};
use crate::room::{registry::is_valid_code, RoomOptions};
use crate::ws::protocol::ArenaPhysics;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, or "*")
    pub client_origin: String,
    /// Joining this 5-digit code auto-creates a bot-enabled room
    pub admin_code: String,
    /// Seconds before a fully-disconnected room reaps itself
    pub room_idle_timeout_secs: f32,
    pub rules: Rules,
    /// Arena profile ("twist") applied to new rooms
    pub arena: ArenaProfile,
}

/// External arena profile: physics tunables plus AI selection, optionally
/// loaded from a JSON file supplied by the content pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ArenaProfile {
    pub physics: ArenaPhysics,
    /// Bot personality name: rookie, pro, allstar, adaptive
    pub personality: String,
    /// Per-slot skater multipliers (six entries) from the attribute source
    pub skaters: Option<Vec<SkaterAttributes>>,
    /// Per-team goalie parameters (home, away)
    pub goalies: Option<Vec<GoalieAttributes>>,
}

impl Default for ArenaProfile {
    fn default() -> Self {
        Self {
            physics: ArenaPhysics::default(),
            personality: "pro".to_string(),
            skaters: None,
            goalies: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let admin_code = env::var("ADMIN_ROOM_CODE").unwrap_or_else(|_| "00777".to_string());
        if !is_valid_code(&admin_code) {
            return Err(ConfigError::InvalidAdminCode(admin_code));
        }

        let rules = Rules {
            score_to_win: parse_env("SCORE_TO_WIN", 5)?,
            mercy_rule: parse_env("MERCY_RULE", true)?,
            mercy_margin: parse_env("MERCY_MARGIN", 5)?,
        };

        let arena = match env::var("ARENA_PROFILE_FILE") {
            Ok(path) => ArenaProfile::from_file(Path::new(&path))?,
            Err(_) => ArenaProfile::default(),
        };
        if Personality::by_name(&arena.personality).is_none() {
            return Err(ConfigError::UnknownPersonality(arena.personality));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            admin_code,
            room_idle_timeout_secs: parse_env("ROOM_IDLE_TIMEOUT_SECS", 120.0)?,
            rules,
            arena,
        })
    }

    /// Room options derived from this configuration
    pub fn room_defaults(&self) -> RoomOptions {
        RoomOptions {
            allow_bots: false,
            auto_start_bots: false,
            personality: Personality::by_name(&self.arena.personality)
                .unwrap_or(Personality::PRO),
            rules: self.rules,
            physics: self.arena.physics,
            skaters: self.arena.skaters.clone(),
            goalies: self.arena.goalies.clone(),
            idle_timeout: self.room_idle_timeout_secs,
        }
    }
}

impl ArenaProfile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ProfileRead(path.display().to_string(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ProfileParse(path.display().to_string(), e))
    }
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("ADMIN_ROOM_CODE must be a 5-digit number, got: {0}")]
    InvalidAdminCode(String),

    #[error("Unknown bot personality: {0}")]
    UnknownPersonality(String),

    #[error("Failed to read arena profile {0}: {1}")]
    ProfileRead(String, #[source] std::io::Error),

    #[error("Failed to parse arena profile {0}: {1}")]
    ProfileParse(String, #[source] serde_json::Error),
}
