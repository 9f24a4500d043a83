//! Move validation and liveness.
//!
//! Everything here runs on a [`StateView`] the caller already holds writer
//! exclusion for. The functions never lock anything themselves.

use tracing::debug;

use crate::state::{Cell, Direction, Position, StateView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidMove {
    /// The byte is not one of the eight directions.
    UnknownDirection(u8),
    OutOfBounds,
    /// Destination is already claimed, possibly by the mover.
    Occupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Valid { reward: u32, to: Position },
    Invalid(InvalidMove),
}

impl MoveOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, MoveOutcome::Valid { .. })
    }
}

/// Validates `byte` for `player` and applies the result to the counters,
/// the player position, and the board.
pub fn apply_move<B>(view: &mut StateView<B>, player: usize, byte: u8) -> MoveOutcome
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let mut record = view.player(player);
    let outcome = evaluate(view, record.position, byte);
    match outcome {
        MoveOutcome::Valid { reward, to } => {
            record.valid_moves += 1;
            record.score += reward;
            record.position = to;
            view.set_cell(to, Cell::claimed(player));
        }
        MoveOutcome::Invalid(_) => record.invalid_moves += 1,
    }
    view.put_player(player, &record);
    debug!(player, byte, ?outcome, "move processed");
    outcome
}

fn evaluate<B: AsRef<[u8]>>(view: &StateView<B>, from: Position, byte: u8) -> MoveOutcome {
    let Some(dir) = Direction::from_byte(byte) else {
        return MoveOutcome::Invalid(InvalidMove::UnknownDirection(byte));
    };
    let Some(to) = from.step(dir, view.width(), view.height()) else {
        return MoveOutcome::Invalid(InvalidMove::OutOfBounds);
    };
    match view.cell(to).points() {
        Some(reward) => MoveOutcome::Valid { reward, to },
        None => MoveOutcome::Invalid(InvalidMove::Occupied),
    }
}

/// `true` if any of the eight neighbours of `pos` can still be captured.
pub fn has_free_neighbor<B: AsRef<[u8]>>(view: &StateView<B>, pos: Position) -> bool {
    Direction::ALL.iter().any(|&dir| {
        pos.step(dir, view.width(), view.height())
            .is_some_and(|next| view.cell(next).is_free())
    })
}

/// Blocks every player left without a capturable neighbour.
///
/// Returns the indices that became blocked in this pass.
pub fn update_liveness<B>(view: &mut StateView<B>) -> Vec<usize>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let mut newly_blocked = Vec::new();
    for index in 0..view.player_count() {
        let record = view.player(index);
        if !record.blocked && !has_free_neighbor(view, record.position) {
            view.block_player(index);
            newly_blocked.push(index);
        }
    }
    if !newly_blocked.is_empty() {
        debug!(?newly_blocked, "players blocked");
    }
    newly_blocked
}

pub fn all_blocked<B: AsRef<[u8]>>(view: &StateView<B>) -> bool {
    (0..view.player_count()).all(|i| view.player(i).blocked)
}
