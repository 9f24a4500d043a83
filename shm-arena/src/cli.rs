use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{ArgAction, Args, Parser};

use crate::config::{
    ArenaConfig, DEFAULT_STATE_SHM, DEFAULT_SYNC_SHM, STATE_SHM_ENV, SYNC_SHM_ENV, SegmentNames,
};
use crate::player::StrategyKind;

/// Segment names shared by all three binaries.
#[derive(Args, Debug, Clone)]
pub struct SegmentArgs {
    /// Name of the game-state shared memory segment.
    #[arg(long = "state-shm", env = STATE_SHM_ENV, default_value = DEFAULT_STATE_SHM)]
    pub state: String,

    /// Name of the synchronization shared memory segment.
    #[arg(long = "sync-shm", env = SYNC_SHM_ENV, default_value = DEFAULT_SYNC_SHM)]
    pub sync: String,
}

impl SegmentArgs {
    pub fn names(&self) -> SegmentNames {
        SegmentNames::new(&self.state, &self.sync)
    }
}

/// Runs a game between player processes over shared memory.
///
/// `-h` is the board height, so help is only available as `--help`.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_flag = true)]
pub struct CoordinatorArgs {
    /// Board width.
    #[arg(short = 'w', long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(10..))]
    pub width: u16,

    /// Board height.
    #[arg(short = 'h', long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(10..))]
    pub height: u16,

    /// Milliseconds to pause after every processed move.
    #[arg(short = 'd', long = "delay", default_value_t = 200)]
    pub delay_ms: u64,

    /// Seconds without a valid move before the game ends.
    #[arg(short = 't', long = "timeout", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Board seed; defaults to the current time.
    #[arg(short = 's', long)]
    pub seed: Option<u64>,

    /// Observer executable.
    #[arg(short = 'v', long = "view")]
    pub view: Option<PathBuf>,

    /// Player executables, one per player.
    #[arg(short = 'p', long = "players", num_args = 1..=9, required = true)]
    pub players: Vec<PathBuf>,

    /// Milliseconds to wait for the observer to finish a frame.
    #[arg(long = "render-timeout", default_value_t = 10_000)]
    pub render_timeout_ms: u64,

    /// Print the final report as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub segments: SegmentArgs,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl CoordinatorArgs {
    pub fn into_config(self) -> ArenaConfig {
        let seed = self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        });
        let mut config = ArenaConfig::new(self.players);
        config.width = self.width;
        config.height = self.height;
        config.move_delay = Duration::from_millis(self.delay_ms);
        config.stall_timeout = Duration::from_secs(self.timeout_secs);
        config.render_timeout = Duration::from_millis(self.render_timeout_ms);
        config.seed = seed;
        config.observer = self.view;
        config.segments = self.segments.names();
        config
    }
}

/// Plays one seat; launched by the coordinator with `width height`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct PlayerArgs {
    pub width: u16,
    pub height: u16,

    /// Move strategy: `random`, `greedy`, or `fixed:<byte>`.
    #[arg(long, env = "ARENA_STRATEGY", default_value = "random")]
    pub strategy: StrategyKind,

    /// Close the move channel after this many moves.
    #[arg(long = "max-moves", env = "ARENA_MAX_MOVES")]
    pub max_moves: Option<u32>,

    /// Seed for the strategy's random choices; defaults to the pid.
    #[arg(long, env = "ARENA_PLAYER_SEED")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub segments: SegmentArgs,
}

/// Renders every frame; launched by the coordinator with `width height`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct ObserverArgs {
    pub width: u16,
    pub height: u16,

    #[command(flatten)]
    pub segments: SegmentArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_h_is_height() {
        let args = CoordinatorArgs::try_parse_from([
            "coordinator", "-w", "12", "-h", "15", "-s", "3", "-p", "./a", "./b",
        ])
        .unwrap();
        assert_eq!((args.width, args.height), (12, 15));
        let config = args.into_config();
        assert_eq!(config.seed, 3);
        assert_eq!(config.players.len(), 2);
        assert_eq!(config.move_delay, Duration::from_millis(200));
        assert_eq!(config.stall_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_small_boards_and_large_rosters() {
        assert!(CoordinatorArgs::try_parse_from(["coordinator", "-w", "9", "-p", "./a"]).is_err());
        let mut argv = vec!["coordinator", "-p"];
        argv.extend(["./a"; 10]);
        assert!(CoordinatorArgs::try_parse_from(argv).is_err());
        assert!(CoordinatorArgs::try_parse_from(["coordinator"]).is_err());
    }

    #[test]
    fn player_takes_dimensions_positionally() {
        let args = PlayerArgs::try_parse_from([
            "player", "10", "12", "--strategy", "fixed:250", "--max-moves", "3",
        ])
        .unwrap();
        assert_eq!((args.width, args.height), (10, 12));
        assert_eq!(args.strategy, StrategyKind::Fixed(250));
        assert_eq!(args.max_moves, Some(3));
    }
}
