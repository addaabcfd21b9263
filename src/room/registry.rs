//! Process-wide table of active rooms, keyed by 5-digit room code.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use super::{Room, RoomError, RoomHandle, RoomOptions};

/// Registry of all active rooms. Shared by reference from server startup;
/// rooms remove themselves from it when their tick loop exits.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    /// RNG for code and seed generation. Guarded because handler tasks
    /// create rooms concurrently.
    rng: Mutex<ChaCha8Rng>,
    /// Joining this code when no such room exists auto-creates a
    /// bot-enabled room.
    admin_code: String,
    defaults: RoomOptions,
}

impl RoomRegistry {
    pub fn new(admin_code: String, defaults: RoomOptions) -> Self {
        Self {
            rooms: DashMap::new(),
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
            admin_code,
            defaults,
        }
    }

    #[cfg(test)]
    pub fn with_seeded_rng(admin_code: String, defaults: RoomOptions, seed: u64) -> Self {
        Self {
            rooms: DashMap::new(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            admin_code,
            defaults,
        }
    }

    /// Create a room under a fresh unique code and spawn its tick loop.
    pub fn create(self: Arc<Self>, options: RoomOptions) -> RoomHandle {
        let code = self.generate_code();
        self.spawn_room(code, options)
    }

    /// Look up a room for joining. The admin code auto-creates a
    /// bot-enabled room when absent; any other unknown code is an error.
    pub fn lookup_for_join(self: Arc<Self>, code: &str) -> Result<RoomHandle, RoomError> {
        if !is_valid_code(code) {
            return Err(RoomError::BadCodeFormat);
        }
        if let Some(handle) = self.get(code) {
            return Ok(handle);
        }
        if code == self.admin_code {
            let options = RoomOptions {
                allow_bots: true,
                auto_start_bots: true,
                ..self.defaults.clone()
            };
            return Ok(self.spawn_room(code.to_string(), options));
        }
        Err(RoomError::NotFound)
    }

    pub fn get(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|r| r.value().clone())
    }

    pub fn remove(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.remove(code).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().connected_players()).sum()
    }

    pub fn default_options(&self) -> RoomOptions {
        self.defaults.clone()
    }

    fn spawn_room(self: Arc<Self>, code: String, options: RoomOptions) -> RoomHandle {
        let seed = self.rng.lock().gen();
        let (room, handle, cmd_rx) = Room::new(code.clone(), seed, options);
        self.rooms.insert(code.clone(), handle.clone());

        let registry = self;
        tokio::spawn(async move {
            room.run(cmd_rx).await;
            registry.remove(&code);
        });

        info!(room_code = %handle.code, "Room registered");
        handle
    }

    /// Generate an unused zero-padded 5-digit code.
    fn generate_code(&self) -> String {
        let mut rng = self.rng.lock();
        loop {
            let code = format!("{:05}", rng.gen_range(0..100_000u32));
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

/// Room codes are always exactly five ASCII digits.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::with_seeded_rng(
            "99999".to_string(),
            RoomOptions::default(),
            1234,
        ))
    }

    #[test]
    fn code_format_validation() {
        assert!(is_valid_code("00042"));
        assert!(is_valid_code("99999"));
        assert!(!is_valid_code("1234"));
        assert!(!is_valid_code("123456"));
        assert!(!is_valid_code("12a45"));
        assert!(!is_valid_code(""));
    }

    #[tokio::test]
    async fn created_rooms_get_unique_five_digit_codes() {
        let registry = registry();
        let a = registry.clone().create(RoomOptions::default());
        let b = registry.clone().create(RoomOptions::default());
        assert!(is_valid_code(&a.code));
        assert!(is_valid_code(&b.code));
        assert_ne!(a.code, b.code);
        assert_eq!(registry.active_rooms(), 2);
        assert!(registry.get(&a.code).is_some());
    }

    #[tokio::test]
    async fn join_unknown_code_is_not_found() {
        let registry = registry();
        assert_eq!(
            registry.clone().lookup_for_join("00001").err(),
            Some(RoomError::NotFound)
        );
        assert_eq!(
            registry.clone().lookup_for_join("abcde").err(),
            Some(RoomError::BadCodeFormat)
        );
    }

    #[tokio::test]
    async fn admin_code_auto_creates_a_bot_room() {
        let registry = registry();
        let handle = registry.clone().lookup_for_join("99999").unwrap();
        assert_eq!(handle.code, "99999");
        assert_eq!(registry.active_rooms(), 1);
        // Second lookup reuses the same room
        let again = registry.clone().lookup_for_join("99999").unwrap();
        assert_eq!(again.code, handle.code);
        assert_eq!(registry.active_rooms(), 1);
    }

    #[tokio::test]
    async fn idle_room_removes_itself_from_the_registry() {
        let registry = registry();
        let handle = registry.clone().create(RoomOptions {
            idle_timeout: 0.01,
            ..Default::default()
        });
        // The room task ticks at 30 Hz; give it a few cycles to reap
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if registry.get(&handle.code).is_none() {
                return;
            }
        }
        panic!("idle room was never reaped");
    }
}
