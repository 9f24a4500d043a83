//! One complete coordinator run: segments, children, main loop, teardown.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::arena::Arena;
use crate::config::ArenaConfig;
use crate::coordinator::{Coordinator, GameSummary, LoopSettings};
use crate::error::Result;
use crate::roster::{self, ChildProcess, ExitOutcome};
use crate::setup::{self, GameSetup, player_name};
use crate::shutdown::spawn_signal_watcher;

/// How long children get to exit on their own after game over.
const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    pub index: usize,
    pub name: String,
    pub pid: u32,
    pub outcome: ExitOutcome,
    pub score: u32,
    pub valid_moves: u32,
    pub invalid_moves: u32,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub seed: u64,
    pub summary: GameSummary,
    pub players: Vec<PlayerReport>,
    pub observer: Option<ExitOutcome>,
}

impl SessionReport {
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "game over ({:?}) after {} moves, seed {}\n",
            self.summary.reason, self.summary.moves_processed, self.seed
        );
        if let Some(outcome) = self.observer {
            out.push_str(&format!("observer {outcome}\n"));
        }
        for p in &self.players {
            out.push_str(&format!(
                "player {} ({}) {}: score {} / {} valid / {} invalid\n",
                p.name, p.index, p.outcome, p.score, p.valid_moves, p.invalid_moves
            ));
        }
        out
    }
}

/// Runs a whole game as configured.
///
/// Everything created along the way is released before returning, on success
/// and on every error path.
pub fn run(config: &ArenaConfig) -> Result<SessionReport> {
    config.validate()?;

    let mut arena = Arena::create(&config.segments, config.width, config.height)?;
    let names = config.players.iter().map(|p| player_name(p)).collect();
    let game = GameSetup::new(config.seed, names).with_placement(config.placement.clone());
    setup::initialize(&mut *arena.write()?, &game)?;

    let cancel = spawn_signal_watcher()?;

    let mut observer = config
        .observer
        .as_deref()
        .and_then(|path| roster::spawn_observer(path, config));

    let (mut players, channels) = match roster::spawn_players(&arena, config) {
        Ok(spawned) => spawned,
        Err(err) => {
            if let Some(child) = &mut observer {
                child.terminate();
            }
            arena.teardown();
            return Err(err);
        }
    };

    let settings = LoopSettings {
        move_delay: config.move_delay,
        stall_timeout: config.stall_timeout,
        render_timeout: config.render_timeout,
    };
    let result = Coordinator::new(&arena, channels, settings)
        .with_observer(observer.is_some())
        .with_cancel(cancel)
        .run();

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "main loop failed, stopping children");
            for child in players.iter_mut().chain(observer.as_mut()) {
                child.terminate();
            }
            arena.teardown();
            return Err(err);
        }
    };

    let outcomes: Vec<ExitOutcome> = players
        .iter_mut()
        .map(|child| child.wait_or_kill(EXIT_GRACE))
        .collect();
    let observer_outcome = observer.as_mut().map(|child| reap_observer(child, &summary));
    arena.teardown();

    let report = SessionReport {
        seed: config.seed,
        players: build_player_reports(&players, &outcomes, &summary),
        observer: observer_outcome,
        summary,
    };
    info!(reason = ?report.summary.reason, "session finished");
    Ok(report)
}

fn reap_observer(child: &mut ChildProcess, summary: &GameSummary) -> ExitOutcome {
    // A detached observer never sees the final frame and would wait forever.
    if summary.observer_detached {
        warn!(pid = child.pid(), path = %child.path().display(), "stopping detached observer");
        return child.terminate();
    }
    child.wait_or_kill(EXIT_GRACE)
}

fn build_player_reports(
    players: &[ChildProcess],
    outcomes: &[ExitOutcome],
    summary: &GameSummary,
) -> Vec<PlayerReport> {
    players
        .iter()
        .zip(outcomes)
        .zip(&summary.final_state.players)
        .enumerate()
        .map(|(index, ((child, outcome), record))| PlayerReport {
            index,
            name: record.name.clone(),
            pid: child.pid(),
            outcome: *outcome,
            score: record.score,
            valid_moves: record.valid_moves,
            invalid_moves: record.invalid_moves,
            blocked: record.blocked,
        })
        .collect()
}
