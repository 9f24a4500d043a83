//! Two-phase frame handshake between the coordinator and the observer.
//!
//! The coordinator posts "frame ready" and blocks on "render done". The
//! observer reads the state as a reader in between, so a frame never overlaps a
//! move and no frame is skipped.

use std::time::Duration;

use crate::error::Result;
use crate::sync_block::SyncBlock;

#[derive(Clone, Copy)]
pub struct ObserverHandshake<'a> {
    block: &'a SyncBlock,
}

impl<'a> ObserverHandshake<'a> {
    pub fn new(block: &'a SyncBlock) -> Self {
        Self { block }
    }

    /// Coordinator side: announce a new frame.
    pub fn notify_frame(&self) -> Result<()> {
        self.block.frame_ready.post()
    }

    /// Coordinator side with an upper bound; `Ok(false)` on timeout.
    pub fn wait_render_done_timeout(&self, timeout: Duration) -> Result<bool> {
        self.block.render_done.wait_timeout(timeout)
    }

    /// Runs one full frame from the coordinator side.
    pub fn present(&self, timeout: Duration) -> Result<bool> {
        self.notify_frame()?;
        self.wait_render_done_timeout(timeout)
    }

    /// Observer side: wait for the next frame.
    pub fn wait_frame(&self) -> Result<()> {
        self.block.frame_ready.wait()
    }

    /// Observer side: acknowledge the frame.
    pub fn render_done(&self) -> Result<()> {
        self.block.render_done.post()
    }
}
