//! Turn-based grid arena played by independent processes over shared memory.
//!
//! A coordinator process owns the authoritative game state in a named shared
//! memory segment. Player processes ask for cells by writing one byte per move
//! to a pipe; an optional observer renders each frame. All processes meet in a
//! second segment holding process-shared semaphores.
//!
//! # Architecture
//!
//! - **Coordinator**: creates both segments, spawns the children, and runs the
//!   main loop that multiplexes player pipes against a stall deadline.
//! - **Players**: wait on their turn gate, read the board as readers, and send
//!   exactly one move byte per turn.
//! - **Observer**: woken once per frame, reads as a reader, acknowledges.
//!
//! Inside the coordinator, each pipe is drained by a small reader thread that
//! forwards bytes over a crossbeam channel, and the main loop selects over those
//! channels with a deadline. Game-state mutations happen only in the main loop
//! and only under writer exclusion.
//!
//! # Modules
//!
//! - [`shm`]: named segment creation, attachment, and unlinking
//! - [`primitives`]: process-shared semaphores with typed lock/signal handles
//! - [`sync_block`]: layout of the synchronization segment
//! - [`rwlock`]: writer-priority reader/writer protocol
//! - [`turn`] and [`handshake`]: per-player move permission and observer frames
//! - [`state`]: explicit byte layout of the game-state segment
//! - [`setup`] and [`rules`]: initialization, move validation, liveness
//! - [`arena`]: per-process context owning both segments
//! - [`input`]: pipe readers and the round-robin input multiplexer
//! - [`coordinator`]: the main loop state machine
//! - [`roster`], [`session`], [`shutdown`]: child processes and teardown
//! - [`player`] and [`observer`]: the client sides
//! - [`config`] and [`cli`]: configuration and command-line parsing

pub mod arena;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handshake;
pub mod input;
pub mod observer;
pub mod player;
pub mod primitives;
pub mod roster;
pub mod rules;
pub mod rwlock;
pub mod session;
pub mod setup;
pub mod shm;
pub mod shutdown;
pub mod state;
pub mod sync_block;
pub mod turn;

pub use error::{ArenaError, Result};

/// Largest roster the shared layout has room for.
pub const MAX_PLAYERS: usize = 9;

/// Bytes reserved for a player name, including the terminating NUL.
pub const MAX_NAME_LENGTH: usize = 16;
