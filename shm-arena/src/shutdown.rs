//! SIGINT/SIGTERM turned into a cancellation message.
//!
//! The coordinator's loop is synchronous, so signals are watched by a small
//! current-thread tokio runtime on its own thread. Handlers are registered
//! before [`spawn_signal_watcher`] returns; a signal arriving during child
//! spawning is not lost.

use std::thread;

use crossbeam_channel::{Receiver, bounded};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

use crate::error::{ArenaError, Result};

/// Returns a channel that receives `()` whenever SIGINT or SIGTERM arrives.
pub fn spawn_signal_watcher() -> Result<Receiver<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| ArenaError::Thread {
            what: "signal runtime",
            source,
        })?;

    let (mut interrupt, mut terminate) = {
        let _entered = runtime.enter();
        let interrupt = signal(SignalKind::interrupt());
        let terminate = signal(SignalKind::terminate());
        match (interrupt, terminate) {
            (Ok(i), Ok(t)) => (i, t),
            (Err(source), _) | (_, Err(source)) => {
                return Err(ArenaError::Thread {
                    what: "signal handlers",
                    source,
                })
            }
        }
    };

    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    let name = tokio::select! {
                        Some(()) = interrupt.recv() => "SIGINT",
                        Some(()) = terminate.recv() => "SIGTERM",
                        else => break,
                    };
                    info!(signal = name, "shutdown requested");
                    // A pending cancellation is enough; repeats are dropped.
                    let _ = tx.try_send(());
                }
            });
        })
        .map_err(|source| ArenaError::Thread {
            what: "signal watcher",
            source,
        })?;
    Ok(rx)
}
