//! Player side: locate the own record, then send one move per opened gate.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::arena::Arena;
use crate::error::{ArenaError, Result};
use crate::state::{Direction, GameSnapshot};

/// Picks the next move byte from a snapshot of the board.
pub trait Strategy: Send {
    fn next_move(&mut self, snapshot: &GameSnapshot, me: usize) -> u8;
}

/// Uniformly random direction.
pub struct RandomWalk {
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomWalk {
    fn next_move(&mut self, _snapshot: &GameSnapshot, _me: usize) -> u8 {
        self.rng.gen_range(0..8)
    }
}

/// Highest-reward free neighbour; random when boxed in.
pub struct Greedy {
    fallback: RandomWalk,
}

impl Greedy {
    pub fn new(seed: u64) -> Self {
        Self {
            fallback: RandomWalk::new(seed),
        }
    }
}

impl Strategy for Greedy {
    fn next_move(&mut self, snapshot: &GameSnapshot, me: usize) -> u8 {
        let from = snapshot.players[me].position;
        let best = Direction::ALL
            .iter()
            .filter_map(|&dir| {
                let to = from.step(dir, snapshot.width, snapshot.height)?;
                Some((snapshot.cell(to).points()?, dir))
            })
            // Earliest direction wins ties.
            .fold(None, |best: Option<(u32, Direction)>, (points, dir)| match best {
                Some((top, _)) if top >= points => best,
                _ => Some((points, dir)),
            });
        match best {
            Some((_, dir)) => dir.as_byte(),
            None => self.fallback.next_move(snapshot, me),
        }
    }
}

/// Always the same byte, valid direction or not.
pub struct Fixed(pub u8);

impl Strategy for Fixed {
    fn next_move(&mut self, _snapshot: &GameSnapshot, _me: usize) -> u8 {
        self.0
    }
}

/// Strategy selector as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Random,
    Greedy,
    Fixed(u8),
}

impl StrategyKind {
    pub fn build(self, seed: u64) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Random => Box::new(RandomWalk::new(seed)),
            StrategyKind::Greedy => Box::new(Greedy::new(seed)),
            StrategyKind::Fixed(byte) => Box::new(Fixed(byte)),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(StrategyKind::Random),
            "greedy" => Ok(StrategyKind::Greedy),
            other => match other.strip_prefix("fixed:") {
                Some(byte) => byte
                    .parse()
                    .map(StrategyKind::Fixed)
                    .map_err(|_| format!("fixed move must be a byte, got {byte:?}")),
                None => Err(format!(
                    "unknown strategy {other:?} (expected random, greedy, or fixed:<byte>)"
                )),
            },
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Random => f.write_str("random"),
            StrategyKind::Greedy => f.write_str("greedy"),
            StrategyKind::Fixed(byte) => write!(f, "fixed:{byte}"),
        }
    }
}

/// Finds the record the coordinator registered for `pid`.
pub fn locate_by_pid(arena: &Arena, pid: u32) -> Result<usize> {
    arena
        .read()?
        .find_player_by_pid(pid)
        .ok_or(ArenaError::UnknownPid(pid))
}

/// Why the player loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerExit {
    GameOver,
    Blocked,
    MoveLimit,
    /// The coordinator stopped reading.
    ChannelClosed,
}

pub struct PlayerClient<'a, W> {
    arena: &'a Arena,
    index: usize,
    out: W,
    strategy: Box<dyn Strategy>,
    max_moves: Option<u32>,
}

impl<'a, W: Write> PlayerClient<'a, W> {
    pub fn new(arena: &'a Arena, index: usize, out: W, strategy: Box<dyn Strategy>) -> Self {
        Self {
            arena,
            index,
            out,
            strategy,
            max_moves: None,
        }
    }

    pub fn with_max_moves(mut self, max_moves: Option<u32>) -> Self {
        self.max_moves = max_moves;
        self
    }

    /// Plays until game over, blocked, the move limit, or a closed channel.
    ///
    /// Consumes the client so the move channel closes on return.
    pub fn run(mut self) -> Result<(PlayerExit, u32)> {
        let turns = self.arena.turns()?;
        let mut sent = 0u32;
        let exit = loop {
            if self.max_moves.is_some_and(|max| sent >= max) {
                break PlayerExit::MoveLimit;
            }
            turns.wait_player_turn(self.index)?;

            let snapshot = self.arena.read()?.snapshot();
            if snapshot.game_over {
                break PlayerExit::GameOver;
            }
            if snapshot.players[self.index].blocked {
                break PlayerExit::Blocked;
            }

            let byte = self.strategy.next_move(&snapshot, self.index);
            match self.out.write_all(&[byte]).and_then(|()| self.out.flush()) {
                Ok(()) => sent += 1,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => break PlayerExit::ChannelClosed,
                Err(err) => return Err(ArenaError::Channel(err)),
            }
            debug!(index = self.index, byte, "move sent");
        };
        info!(index = self.index, ?exit, moves = sent, "player finished");
        Ok((exit, sent))
    }
}
