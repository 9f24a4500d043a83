//! Initial board and roster.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ArenaError, Result};
use crate::state::{Cell, PlayerRecord, Position, StateView, truncate_name};
use crate::MAX_PLAYERS;

/// Where players start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Placement {
    /// Spread evenly over the board.
    #[default]
    Grid,
    /// Explicit starting cells, one per player.
    Fixed(Vec<Position>),
}

#[derive(Debug, Clone)]
pub struct GameSetup {
    pub seed: u64,
    pub names: Vec<String>,
    pub placement: Placement,
}

impl GameSetup {
    pub fn new(seed: u64, names: Vec<String>) -> Self {
        Self {
            seed,
            names,
            placement: Placement::Grid,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Fills a freshly formatted state: roster, rewards, and claimed start cells.
pub fn initialize<B>(view: &mut StateView<B>, setup: &GameSetup) -> Result<()>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let count = setup.names.len();
    if count == 0 || count > MAX_PLAYERS {
        return Err(ArenaError::PlayerCount(count));
    }
    let (width, height) = (view.width(), view.height());
    let starts = match &setup.placement {
        Placement::Grid => grid_positions(count, width, height),
        Placement::Fixed(cells) => {
            check_fixed(cells, count, width, height)?;
            cells.clone()
        }
    };

    view.set_player_count(count)?;

    let mut rng = StdRng::seed_from_u64(setup.seed);
    for y in 0..height {
        for x in 0..width {
            let pos = Position::new(x, y);
            if !starts.contains(&pos) {
                view.set_cell(pos, Cell::reward(rng.gen_range(1..=9)));
            }
        }
    }

    for (index, (name, start)) in setup.names.iter().zip(&starts).enumerate() {
        view.put_player(
            index,
            &PlayerRecord {
                name: truncate_name(name).to_string(),
                score: 0,
                invalid_moves: 0,
                valid_moves: 0,
                position: *start,
                pid: 0,
                blocked: false,
            },
        );
        view.set_cell(*start, Cell::claimed(index));
    }
    Ok(())
}

/// Evenly spaced starting cells on a `ceil(sqrt(n))`-row grid.
pub fn grid_positions(count: usize, width: u16, height: u16) -> Vec<Position> {
    if count == 0 {
        return Vec::new();
    }
    let rows = (count as f64).sqrt().ceil() as usize;
    let cols = count.div_ceil(rows);
    (0..count)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            let x = (col + 1) * usize::from(width) / (cols + 1);
            let y = (row + 1) * usize::from(height) / (rows + 1);
            Position::new(x as u16, y as u16)
        })
        .collect()
}

/// Display name for a player executable: its file name, truncated.
pub fn player_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    truncate_name(&base).to_string()
}

fn check_fixed(cells: &[Position], count: usize, width: u16, height: u16) -> Result<()> {
    if cells.len() != count {
        return Err(ArenaError::Placement(format!(
            "{} start cells for {count} players",
            cells.len()
        )));
    }
    for (i, cell) in cells.iter().enumerate() {
        if cell.x >= width || cell.y >= height {
            return Err(ArenaError::Placement(format!(
                "({}, {}) is off the {width}x{height} board",
                cell.x, cell.y
            )));
        }
        if cells[..i].contains(cell) {
            return Err(ArenaError::Placement(format!(
                "({}, {}) is used twice",
                cell.x, cell.y
            )));
        }
    }
    Ok(())
}
