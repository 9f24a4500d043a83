//! Per-player move permission.
//!
//! Each slot has a counting signal that starts closed. The coordinator opens a
//! player's gate once per processed move; the player spends one opening per
//! byte it sends.

use crate::error::{ArenaError, Result};
use crate::sync_block::SyncBlock;
use crate::MAX_PLAYERS;

/// Borrowed view of the turn gates in a sync block.
#[derive(Clone, Copy)]
pub struct TurnGate<'a> {
    block: &'a SyncBlock,
}

impl<'a> TurnGate<'a> {
    pub fn new(block: &'a SyncBlock) -> Self {
        Self { block }
    }

    /// Grants `player` permission to send exactly one move.
    pub fn allow_player_move(&self, player: usize) -> Result<()> {
        self.gate(player)?.post()
    }

    /// Blocks the calling player until its gate is opened.
    pub fn wait_player_turn(&self, player: usize) -> Result<()> {
        self.gate(player)?.wait()
    }

    /// Openings granted but not yet consumed.
    pub fn pending(&self, player: usize) -> Result<i32> {
        self.gate(player)?.pending()
    }

    fn gate(&self, player: usize) -> Result<&'a crate::primitives::CountingSignal> {
        if player >= MAX_PLAYERS {
            return Err(ArenaError::PlayerSlot(player));
        }
        Ok(&self.block.turn_gates[player])
    }
}
