//! The coordinator's main loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! AwaitingInput -> ValidatingMove -> NotifyingParties -> AwaitingInput
//!       |                                   |
//!       +-----------> GameOver <------------+
//! ```
//!
//! Validation, application, and the liveness pass all run under one writer
//! guard, so every move is atomic with respect to readers. The stall deadline
//! is measured from the last *valid* move: a run of invalid moves does not
//! keep the game alive.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arena::Arena;
use crate::error::Result;
use crate::input::{InputMux, MuxEvent, PlayerInput};
use crate::rules::{self, MoveOutcome};
use crate::state::GameSnapshot;

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub move_delay: Duration,
    pub stall_timeout: Duration,
    pub render_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            move_delay: Duration::from_millis(200),
            stall_timeout: Duration::from_secs(10),
            render_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// No valid move within the stall timeout.
    StallTimeout,
    AllBlocked,
    /// Shutdown was requested from outside.
    Cancelled,
}

/// What the loop did, returned once the game is over.
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub reason: EndReason,
    pub moves_processed: u64,
    /// Frames the observer acknowledged.
    pub frames: u32,
    /// The observer stopped acknowledging and was dropped mid-game.
    pub observer_detached: bool,
    /// Move bytes read from each player's channel.
    pub consumed: Vec<u32>,
    pub final_state: GameSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingInput,
    ValidatingMove {
        player: usize,
        byte: u8,
    },
    NotifyingParties {
        player: usize,
        outcome: MoveOutcome,
        all_blocked: bool,
    },
    GameOver(EndReason),
}

pub struct Coordinator<'a> {
    arena: &'a Arena,
    mux: InputMux,
    settings: LoopSettings,
    observer: bool,
    observer_detached: bool,
    consumed: Vec<u32>,
    moves_processed: u64,
    frames: u32,
    last_valid: Instant,
}

impl<'a> Coordinator<'a> {
    /// `channels[i]` carries player `i`'s moves.
    pub fn new(arena: &'a Arena, channels: Vec<Receiver<PlayerInput>>, settings: LoopSettings) -> Self {
        let consumed = vec![0; channels.len()];
        Self {
            arena,
            mux: InputMux::new(channels),
            settings,
            observer: false,
            observer_detached: false,
            consumed,
            moves_processed: 0,
            frames: 0,
            last_valid: Instant::now(),
        }
    }

    /// Runs the frame handshake after every move.
    pub fn with_observer(mut self, attached: bool) -> Self {
        self.observer = attached;
        self
    }

    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.mux = self.mux.with_cancel(cancel);
        self
    }

    /// Plays the game to completion.
    ///
    /// On error the game-over flag may be unset; the caller is expected to
    /// terminate the children and tear the arena down.
    pub fn run(mut self) -> Result<GameSummary> {
        self.present_frame();
        let turns = self.arena.turns()?;
        for player in 0..self.mux.len() {
            turns.allow_player_move(player)?;
        }
        self.last_valid = Instant::now();
        info!(players = self.mux.len(), "game started");

        let mut phase = Phase::AwaitingInput;
        loop {
            phase = match phase {
                Phase::AwaitingInput => self.await_input()?,
                Phase::ValidatingMove { player, byte } => self.validate_move(player, byte)?,
                Phase::NotifyingParties {
                    player,
                    outcome,
                    all_blocked,
                } => self.notify_parties(player, outcome, all_blocked)?,
                Phase::GameOver(reason) => return self.finish(reason),
            };
        }
    }

    fn await_input(&mut self) -> Result<Phase> {
        let deadline = self.last_valid + self.settings.stall_timeout;
        let phase = match self.mux.wait(deadline) {
            MuxEvent::Input {
                player,
                input: PlayerInput::Move(byte),
            } => {
                self.consumed[player] += 1;
                Phase::ValidatingMove { player, byte }
            }
            MuxEvent::Input {
                player,
                input: PlayerInput::Closed,
            } => {
                let mut state = self.arena.write()?;
                state.block_player(player);
                let all_blocked = rules::all_blocked(&*state);
                drop(state);
                info!(player, "player closed its move channel");
                if all_blocked {
                    Phase::GameOver(EndReason::AllBlocked)
                } else {
                    Phase::AwaitingInput
                }
            }
            MuxEvent::Deadline => Phase::GameOver(EndReason::StallTimeout),
            MuxEvent::Cancelled => Phase::GameOver(EndReason::Cancelled),
            MuxEvent::Exhausted => Phase::GameOver(EndReason::AllBlocked),
        };
        Ok(phase)
    }

    fn validate_move(&mut self, player: usize, byte: u8) -> Result<Phase> {
        let mut state = self.arena.write()?;
        let outcome = rules::apply_move(&mut *state, player, byte);
        let newly_blocked = rules::update_liveness(&mut *state);
        let all_blocked = rules::all_blocked(&*state);
        drop(state);

        self.moves_processed += 1;
        if outcome.is_valid() {
            self.last_valid = Instant::now();
        }
        for blocked in newly_blocked {
            info!(player = blocked, "player has no free neighbour");
        }
        Ok(Phase::NotifyingParties {
            player,
            outcome,
            all_blocked,
        })
    }

    fn notify_parties(&mut self, player: usize, outcome: MoveOutcome, all_blocked: bool) -> Result<Phase> {
        // Game over re-opens every gate anyway.
        if !all_blocked && self.mux.is_open(player) {
            self.arena.turns()?.allow_player_move(player)?;
        }
        self.present_frame();
        debug!(player, ?outcome, "move published");

        if all_blocked {
            return Ok(Phase::GameOver(EndReason::AllBlocked));
        }
        if !self.settings.move_delay.is_zero() && self.mux.sleep(self.settings.move_delay) {
            return Ok(Phase::GameOver(EndReason::Cancelled));
        }
        Ok(Phase::AwaitingInput)
    }

    fn finish(mut self, reason: EndReason) -> Result<GameSummary> {
        self.arena.write()?.set_game_over();
        info!(?reason, moves = self.moves_processed, "game over");
        self.present_frame();

        let turns = self.arena.turns()?;
        for player in 0..self.mux.len() {
            if self.mux.is_open(player) {
                if let Err(error) = turns.allow_player_move(player) {
                    warn!(player, %error, "could not release player at game over");
                }
            }
        }

        let final_state = self.arena.read()?.snapshot();
        Ok(GameSummary {
            reason,
            moves_processed: self.moves_processed,
            frames: self.frames,
            observer_detached: self.observer_detached,
            consumed: self.consumed,
            final_state,
        })
    }

    /// One observer frame. A missing or failed acknowledgement detaches the
    /// observer so the game is never held hostage by rendering.
    fn present_frame(&mut self) {
        if !self.observer {
            return;
        }
        let presented = self
            .arena
            .handshake()
            .and_then(|handshake| handshake.present(self.settings.render_timeout));
        match presented {
            Ok(true) => self.frames += 1,
            Ok(false) => {
                warn!(timeout = ?self.settings.render_timeout, "observer did not finish rendering, detaching");
                self.observer = false;
                self.observer_detached = true;
            }
            Err(error) => {
                warn!(%error, "observer handshake failed, detaching");
                self.observer = false;
                self.observer_detached = true;
            }
        }
    }
}
