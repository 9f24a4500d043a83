//! Validated coordinator configuration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{ArenaError, Result};
use crate::setup::Placement;
use crate::MAX_PLAYERS;

pub const DEFAULT_STATE_SHM: &str = "/game_state";
pub const DEFAULT_SYNC_SHM: &str = "/game_sync";
pub const STATE_SHM_ENV: &str = "ARENA_STATE_SHM";
pub const SYNC_SHM_ENV: &str = "ARENA_SYNC_SHM";

/// Names of the two shared segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNames {
    pub state: String,
    pub sync: String,
}

impl Default for SegmentNames {
    fn default() -> Self {
        Self {
            state: DEFAULT_STATE_SHM.to_string(),
            sync: DEFAULT_SYNC_SHM.to_string(),
        }
    }
}

impl SegmentNames {
    pub fn new(state: impl Into<String>, sync: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            sync: sync.into(),
        }
    }

    /// Names no other process or test is using, for parallel test runs.
    pub fn unique(tag: &str) -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        Self {
            state: format!("/arena-{tag}-{pid}-{n}-state"),
            sync: format!("/arena-{tag}-{pid}-{n}-sync"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for name in [&self.state, &self.sync] {
            let valid = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
            if !valid {
                return Err(ArenaError::InvalidName(name.clone()));
            }
        }
        if self.state == self.sync {
            return Err(ArenaError::InvalidName(self.sync.clone()));
        }
        Ok(())
    }

    /// Environment passed to every child so it finds the same segments.
    pub fn env(&self) -> [(&'static str, &str); 2] {
        [(STATE_SHM_ENV, &self.state), (SYNC_SHM_ENV, &self.sync)]
    }
}

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub width: u16,
    pub height: u16,
    /// Pause after each processed move.
    pub move_delay: Duration,
    /// Game ends after this long without a valid move.
    pub stall_timeout: Duration,
    /// Longest wait for the observer to acknowledge a frame.
    pub render_timeout: Duration,
    pub seed: u64,
    pub observer: Option<PathBuf>,
    pub players: Vec<PathBuf>,
    pub segments: SegmentNames,
    pub placement: Placement,
}

impl ArenaConfig {
    pub fn new(players: Vec<PathBuf>) -> Self {
        Self {
            width: 10,
            height: 10,
            move_delay: Duration::from_millis(200),
            stall_timeout: Duration::from_secs(10),
            render_timeout: Duration::from_millis(10_000),
            seed: 0,
            observer: None,
            players,
            segments: SegmentNames::default(),
            placement: Placement::Grid,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.players.is_empty() || self.players.len() > MAX_PLAYERS {
            return Err(ArenaError::PlayerCount(self.players.len()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ArenaError::BoardSize {
                width: self.width,
                height: self.height,
            });
        }
        self.segments.validate()
    }
}
