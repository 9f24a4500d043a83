//! Runs one game: creates the shared segments, spawns the observer and the
//! players, drives the main loop, and prints the final report.
//!
//! ```bash
//! cargo run --bin coordinator -- -w 20 -h 15 -d 50 \
//!   -v target/debug/observer -p target/debug/player target/debug/player
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use shm_arena::cli::CoordinatorArgs;
use shm_arena::session;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let args = CoordinatorArgs::parse();
    let json = args.json;
    let config = args.into_config();

    let report = session::run(&config).context("game session failed")?;
    if json {
        let encoded = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{encoded}");
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}
