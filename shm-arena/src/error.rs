//! Error types shared by the coordinator, player, and observer sides.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the arena library.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// A shared-memory system call failed.
    #[error("failed to {op} shared memory segment {name}")]
    Shm {
        /// The operation that failed (`open`, `truncate`, `map`, ...).
        op: &'static str,
        /// Segment name.
        name: String,
        #[source]
        source: io::Error,
    },

    /// Segment names must be `/`-prefixed and contain no further slashes.
    #[error("invalid shared memory name {0:?}")]
    InvalidName(String),

    /// The attached segment is smaller than its header claims.
    #[error("segment {name} holds {actual} bytes, expected at least {expected}")]
    SegmentTooSmall {
        /// Segment name.
        name: String,
        /// Bytes actually mapped.
        actual: usize,
        /// Bytes required by the layout.
        expected: usize,
    },

    /// The segment exists but no coordinator has finished initializing it.
    #[error("segment {0} has not been initialized by a coordinator")]
    NotInitialized(String),

    /// A semaphore operation failed for a reason other than interruption.
    #[error("semaphore {op} failed")]
    Semaphore {
        /// `init`, `wait`, `post`, ...
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The primitive was destroyed by the coordinator.
    #[error("synchronization primitive has been destroyed")]
    Destroyed,

    /// The arena context already released its segments.
    #[error("arena has been torn down")]
    TornDown,

    /// Writes were requested through a read-only attachment.
    #[error("game state is mapped read-only in this process")]
    ReadOnly,

    #[error("player count {0} is outside 1..=9")]
    PlayerCount(usize),

    #[error("invalid board dimensions {width}x{height}")]
    BoardSize {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
    },

    #[error("player slot {0} is out of range")]
    PlayerSlot(usize),

    /// Fixed placement must provide one in-bounds, distinct cell per player.
    #[error("invalid placement: {0}")]
    Placement(String),

    #[error("no player record matches pid {0}")]
    UnknownPid(u32),

    /// Launching a child process or its channel failed.
    #[error("failed to spawn {role} {path}")]
    Spawn {
        /// `player` or `observer`.
        role: &'static str,
        /// Executable that failed to launch.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to the move channel")]
    Channel(#[source] io::Error),

    /// A helper thread (channel reader, signal watcher) could not start.
    #[error("failed to start {what}")]
    Thread {
        /// Thread purpose.
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Result alias used across the crate.
pub type Result<T, E = ArenaError> = std::result::Result<T, E>;

impl ArenaError {
    pub(crate) fn shm(op: &'static str, name: &str, source: io::Error) -> Self {
        Self::Shm {
            op,
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn semaphore(op: &'static str, source: io::Error) -> Self {
        Self::Semaphore { op, source }
    }
}
