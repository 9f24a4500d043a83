//! Prints every frame the coordinator publishes until the game is over.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;

use shm_arena::arena::Arena;
use shm_arena::cli::ObserverArgs;
use shm_arena::observer::{ObserverClient, render_text};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let args = ObserverArgs::parse();
    let arena = Arena::attach(&args.segments.names()).context("failed to attach to the arena")?;

    let stdout = io::stdout();
    let frames = ObserverClient::new(&arena)
        .run(|snapshot| {
            let mut out = stdout.lock();
            // A closed terminal must not stall the game; keep acknowledging.
            let _ = write!(out, "\x1b[2J\x1b[H{}", render_text(snapshot));
            let _ = out.flush();
        })
        .context("observer loop failed")?;
    tracing::debug!(frames, "observer finished");
    Ok(())
}
