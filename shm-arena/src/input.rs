//! Player move channels and the coordinator's input multiplexer.
//!
//! Each player pipe is drained by a dedicated reader thread that forwards one
//! [`PlayerInput`] per byte over a bounded crossbeam channel. The main loop
//! then waits on all channels at once through [`InputMux`], with a deadline and
//! an optional cancellation channel.
//!
//! # Fairness
//!
//! When several players are ready at once, [`InputMux::wait`] scans from the
//! slot after the one it serviced last, so the start index rotates across the
//! whole game rather than restarting at player 0 on every call.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Select, TryRecvError, bounded};
use tracing::{debug, warn};

use crate::error::{ArenaError, Result};

/// What a player channel produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerInput {
    /// One move byte.
    Move(u8),
    /// End of input; nothing more will arrive.
    Closed,
}

/// Starts a thread that forwards every byte of `source` as a [`PlayerInput`].
///
/// The channel holds a single item, so the thread reads at most one byte ahead
/// of the main loop. End of stream and read errors both end in `Closed`.
pub fn spawn_channel_reader<R>(player: usize, mut source: R) -> Result<Receiver<PlayerInput>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name(format!("player-{player}-reader"))
        .spawn(move || {
            let mut byte = [0u8; 1];
            loop {
                match source.read(&mut byte) {
                    Ok(0) => {
                        debug!(player, "move channel reached end of input");
                        let _ = tx.send(PlayerInput::Closed);
                        break;
                    }
                    Ok(_) => {
                        if tx.send(PlayerInput::Move(byte[0])).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(player, error = %err, "move channel read failed");
                        let _ = tx.send(PlayerInput::Closed);
                        break;
                    }
                }
            }
        })
        .map_err(|source| ArenaError::Thread {
            what: "player channel reader",
            source,
        })?;
    Ok(rx)
}

/// Outcome of one [`InputMux::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxEvent {
    Input { player: usize, input: PlayerInput },
    /// The deadline passed with nothing ready.
    Deadline,
    /// Cancellation was requested.
    Cancelled,
    /// Every channel has closed.
    Exhausted,
}

pub struct InputMux {
    channels: Vec<Option<Receiver<PlayerInput>>>,
    next: usize,
    cancel: Option<Receiver<()>>,
    cancelled: bool,
}

impl InputMux {
    pub fn new(channels: Vec<Receiver<PlayerInput>>) -> Self {
        Self {
            channels: channels.into_iter().map(Some).collect(),
            next: 0,
            cancel: None,
            cancelled: false,
        }
    }

    /// Any message on `cancel` ends the next or current wait.
    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_open(&self, player: usize) -> bool {
        self.channels.get(player).is_some_and(Option::is_some)
    }

    pub fn open_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_some()).count()
    }

    /// Stops listening to `player`.
    pub fn close(&mut self, player: usize) {
        if let Some(slot) = self.channels.get_mut(player) {
            *slot = None;
        }
    }

    pub fn is_cancelled(&mut self) -> bool {
        self.poll_cancel();
        self.cancelled
    }

    /// Waits for the next input, cancellation, or `deadline`.
    pub fn wait(&mut self, deadline: Instant) -> MuxEvent {
        loop {
            if self.is_cancelled() {
                return MuxEvent::Cancelled;
            }
            if self.open_count() == 0 {
                return MuxEvent::Exhausted;
            }
            // Checked before scanning so a steady stream of input cannot
            // outlive the deadline.
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return MuxEvent::Deadline,
            };
            if let Some(event) = self.scan() {
                return event;
            }

            let mut select = Select::new();
            for rx in self.channels.iter().flatten() {
                select.recv(rx);
            }
            if let Some(cancel) = &self.cancel {
                select.recv(cancel);
            }
            // Readiness only; the next pass picks the channel in rotation order.
            let _ = select.ready_timeout(remaining);
        }
    }

    /// Sleeps for `pause` unless cancelled first. Returns `true` on cancellation.
    pub fn sleep(&mut self, pause: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let until = Instant::now() + pause;
        match &self.cancel {
            Some(cancel) => match cancel.recv_deadline(until) {
                Ok(()) => self.cancelled = true,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.cancel = None;
                    thread::sleep(until.saturating_duration_since(Instant::now()));
                }
            },
            None => thread::sleep(pause),
        }
        self.cancelled
    }

    fn poll_cancel(&mut self) {
        if self.cancelled {
            return;
        }
        if let Some(cancel) = &self.cancel {
            match cancel.try_recv() {
                Ok(()) => self.cancelled = true,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.cancel = None,
            }
        }
    }

    fn scan(&mut self) -> Option<MuxEvent> {
        let n = self.channels.len();
        for k in 0..n {
            let player = (self.next + k) % n;
            let Some(rx) = &self.channels[player] else {
                continue;
            };
            let input = match rx.try_recv() {
                Ok(input) => input,
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => PlayerInput::Closed,
            };
            if input == PlayerInput::Closed {
                self.close(player);
            }
            self.next = (player + 1) % n;
            return Some(MuxEvent::Input { player, input });
        }
        None
    }
}
