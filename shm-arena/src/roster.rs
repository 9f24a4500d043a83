//! Child processes: spawning, pid registration, and reaping.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arena::Arena;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::input::{PlayerInput, spawn_channel_reader};

const REAP_POLL: Duration = Duration::from_millis(10);

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
    /// The status could not be collected.
    Unknown,
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitOutcome::Exited(code),
            (None, Some(signal)) => ExitOutcome::Signaled(signal),
            (None, None) => ExitOutcome::Unknown,
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited({code})"),
            ExitOutcome::Signaled(signal) => write!(f, "signaled({signal})"),
            ExitOutcome::Unknown => f.write_str("unknown"),
        }
    }
}

/// A spawned player or observer.
pub struct ChildProcess {
    role: &'static str,
    path: PathBuf,
    child: Child,
}

impl ChildProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for a normal exit.
    pub fn wait(&mut self) -> ExitOutcome {
        match self.child.wait() {
            Ok(status) => status.into(),
            Err(error) => {
                warn!(role = self.role, pid = self.pid(), %error, "failed to reap child");
                ExitOutcome::Unknown
            }
        }
    }

    /// Waits up to `grace`, then kills the child and reaps it.
    pub fn wait_or_kill(&mut self, grace: Duration) -> ExitOutcome {
        let until = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return status.into(),
                Ok(None) if Instant::now() < until => thread::sleep(REAP_POLL),
                Ok(None) => {
                    warn!(role = self.role, pid = self.pid(), "child did not exit in time, killing it");
                    return self.terminate();
                }
                Err(error) => {
                    warn!(role = self.role, pid = self.pid(), %error, "failed to poll child");
                    return self.terminate();
                }
            }
        }
    }

    /// Kills the child if it is still running and reaps it.
    pub fn terminate(&mut self) -> ExitOutcome {
        if let Err(error) = self.child.kill() {
            debug!(role = self.role, pid = self.pid(), %error, "kill failed, child probably exited");
        }
        self.wait()
    }
}

/// Spawns every player with its stdout as the move channel.
///
/// Writer exclusion is held for the whole roster, so each pid is in the game
/// state before any player can take the reader role to look itself up. If any
/// spawn fails, the players already started are killed and reaped.
pub fn spawn_players(
    arena: &Arena,
    config: &ArenaConfig,
) -> Result<(Vec<ChildProcess>, Vec<Receiver<PlayerInput>>)> {
    let mut state = arena.write()?;
    let mut children: Vec<ChildProcess> = Vec::with_capacity(config.players.len());
    let mut channels = Vec::with_capacity(config.players.len());

    for (index, path) in config.players.iter().enumerate() {
        match spawn_player(index, path, config) {
            Ok((child, channel)) => {
                state.set_pid(index, child.pid());
                debug!(index, pid = child.pid(), path = %path.display(), "player spawned");
                children.push(child);
                channels.push(channel);
            }
            Err(err) => {
                drop(state);
                for child in &mut children {
                    let outcome = child.terminate();
                    debug!(pid = child.pid(), %outcome, "rolled back player");
                }
                return Err(err);
            }
        }
    }
    info!(players = children.len(), "players spawned");
    Ok((children, channels))
}

fn spawn_player(
    index: usize,
    path: &Path,
    config: &ArenaConfig,
) -> Result<(ChildProcess, Receiver<PlayerInput>)> {
    let mut child = dimensions_command(path, config)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| ArenaError::Spawn {
            role: "player",
            path: path.to_path_buf(),
            source,
        })?;
    let stdout = child.stdout.take();
    let mut process = ChildProcess {
        role: "player",
        path: path.to_path_buf(),
        child,
    };
    let Some(stdout) = stdout else {
        process.terminate();
        return Err(ArenaError::Spawn {
            role: "player",
            path: path.to_path_buf(),
            source: std::io::Error::other("stdout was not captured"),
        });
    };
    match spawn_channel_reader(index, stdout) {
        Ok(channel) => Ok((process, channel)),
        Err(err) => {
            process.terminate();
            Err(err)
        }
    }
}

/// Starts the observer. Failure is reported and the game runs without one.
pub fn spawn_observer(path: &Path, config: &ArenaConfig) -> Option<ChildProcess> {
    match dimensions_command(path, config).spawn() {
        Ok(child) => {
            debug!(pid = child.id(), path = %path.display(), "observer spawned");
            Some(ChildProcess {
                role: "observer",
                path: path.to_path_buf(),
                child,
            })
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to spawn observer, continuing without one");
            None
        }
    }
}

/// `path width height` with the segment names in the environment.
fn dimensions_command(path: &Path, config: &ArenaConfig) -> Command {
    let mut command = Command::new(path);
    command
        .arg(config.width.to_string())
        .arg(config.height.to_string())
        .envs(config.segments.env())
        .stdin(Stdio::null());
    command
}
