//! Observer side of the frame handshake, plus a plain-text renderer.

use std::fmt::Write as _;

use tracing::debug;

use crate::arena::Arena;
use crate::error::Result;
use crate::state::{GameSnapshot, Position};

pub struct ObserverClient<'a> {
    arena: &'a Arena,
}

impl<'a> ObserverClient<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        Self { arena }
    }

    /// Renders frames until one shows the game over. Returns the frame count.
    ///
    /// `render` runs while no reader role is held, on a private snapshot.
    pub fn run<F>(&self, mut render: F) -> Result<u32>
    where
        F: FnMut(&GameSnapshot),
    {
        let handshake = self.arena.handshake()?;
        let mut frames = 0;
        loop {
            handshake.wait_frame()?;
            let snapshot = self.arena.read()?.snapshot();
            render(&snapshot);
            handshake.render_done()?;
            frames += 1;
            if snapshot.game_over {
                debug!(frames, "final frame rendered");
                return Ok(frames);
            }
        }
    }
}

/// Board and scoreboard as text.
///
/// Free cells show their reward, trails show the owner's lowercase letter, and
/// each player's current cell shows the uppercase letter.
pub fn render_text(snapshot: &GameSnapshot) -> String {
    let mut out = String::new();
    for y in 0..snapshot.height {
        for x in 0..snapshot.width {
            let pos = Position::new(x, y);
            let cell = snapshot.cell(pos);
            let glyph = match (cell.points(), cell.owner()) {
                (Some(points), _) => char::from_digit(points.min(9), 10).unwrap_or('?'),
                (None, Some(owner)) => {
                    let head = snapshot
                        .players
                        .get(owner)
                        .is_some_and(|p| p.position == pos);
                    player_letter(owner, head)
                }
                (None, None) => '.',
            };
            out.push(glyph);
            out.push(' ');
        }
        out.pop();
        out.push('\n');
    }
    out.push('\n');
    for (index, player) in snapshot.players.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {:<15} score={:<5} valid={:<4} invalid={:<4}{}",
            player_letter(index, true),
            player.name,
            player.score,
            player.valid_moves,
            player.invalid_moves,
            if player.blocked { " blocked" } else { "" },
        );
    }
    if snapshot.game_over {
        out.push_str("game over\n");
    }
    out
}

fn player_letter(index: usize, upper: bool) -> char {
    let base = if upper { b'A' } else { b'a' };
    char::from(base + (index % 26) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{GameSetup, Placement, initialize};
    use crate::state::{StateView, state_size};

    #[test]
    fn renders_board_and_scoreboard() {
        let mut view = StateView::format(vec![0; state_size(10, 10)], 10, 10).unwrap();
        let setup = GameSetup::new(5, vec!["ann".into(), "bob".into()])
            .with_placement(Placement::Fixed(vec![Position::new(0, 0), Position::new(9, 9)]));
        initialize(&mut view, &setup).unwrap();
        view.block_player(1);
        view.set_game_over();

        let text = render_text(&view.snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('A'));
        assert!(lines[9].ends_with('B'));
        assert_eq!(lines[0].split(' ').count(), 10);
        assert!(lines[11].starts_with("A ann"));
        assert!(lines[12].ends_with("blocked"));
        assert_eq!(lines.last(), Some(&"game over"));
    }
}
