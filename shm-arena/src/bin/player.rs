//! A player process. Started by the coordinator as `player <width> <height>`;
//! everything it writes to stdout is a move.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shm_arena::arena::Arena;
use shm_arena::cli::PlayerArgs;
use shm_arena::player::{PlayerClient, locate_by_pid};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    // stdout carries moves, so logs must go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let args = PlayerArgs::parse();
    let names = args.segments.names();
    let arena = Arena::attach(&names).context("failed to attach to the arena")?;

    let pid = std::process::id();
    let index = locate_by_pid(&arena, pid).context("coordinator has no record for this process")?;
    let (width, height) = {
        let state = arena.read()?;
        (state.width(), state.height())
    };
    if (width, height) != (args.width, args.height) {
        info!(width, height, "board size differs from arguments, using the shared state");
    }

    let strategy = args.strategy.build(args.seed.unwrap_or(u64::from(pid)));
    let (exit, moves) = PlayerClient::new(&arena, index, io::stdout(), strategy)
        .with_max_moves(args.max_moves)
        .run()
        .context("player loop failed")?;
    info!(index, ?exit, moves, "done");
    Ok(())
}
