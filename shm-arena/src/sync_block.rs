//! Layout of the synchronization segment.
//!
//! The block has a fixed size, independent of the board, with one turn gate per
//! possible player slot. A coordinator initializes every primitive and then
//! publishes [`SYNC_MAGIC`]; attaching processes refuse a block without it.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::debug;

use crate::error::{ArenaError, Result};
use crate::primitives::{BinaryLock, CountingSignal};
use crate::MAX_PLAYERS;

/// Written last during initialization.
pub const SYNC_MAGIC: u32 = 0x5359_4e43;

#[repr(C)]
pub struct SyncBlock {
    magic: AtomicU32,
    /// Coordinator -> observer: a frame is ready.
    pub(crate) frame_ready: CountingSignal,
    /// Observer -> coordinator: the frame has been rendered.
    pub(crate) render_done: CountingSignal,
    /// Writer-priority turnstile.
    pub(crate) turnstile: BinaryLock,
    /// Held by the writer, or by a reader group as a whole.
    pub(crate) state_lock: BinaryLock,
    pub(crate) reader_count_lock: BinaryLock,
    reader_count: UnsafeCell<u32>,
    pub(crate) turn_gates: [CountingSignal; MAX_PLAYERS],
    torn_down: AtomicBool,
}

unsafe impl Send for SyncBlock {}
unsafe impl Sync for SyncBlock {}

impl SyncBlock {
    /// Bytes the segment must hold.
    pub const SIZE: usize = std::mem::size_of::<SyncBlock>();

    /// Initializes every primitive in a zero-filled block.
    ///
    /// On failure the primitives initialized so far are destroyed again.
    pub fn initialize(&self) -> Result<()> {
        let result = self.init_primitives();
        if result.is_err() {
            self.destroy_primitives();
            return result;
        }
        self.magic.store(SYNC_MAGIC, Ordering::Release);
        Ok(())
    }

    fn init_primitives(&self) -> Result<()> {
        self.turnstile.init()?;
        self.state_lock.init()?;
        self.reader_count_lock.init()?;
        unsafe {
            *self.reader_count.get() = 0;
        }
        self.frame_ready.init(0)?;
        self.render_done.init(0)?;
        for gate in &self.turn_gates {
            gate.init(0)?;
        }
        Ok(())
    }

    /// Reinterprets the start of a mapping as a block, checking the magic.
    ///
    /// # Safety
    /// `ptr` must point to at least [`SyncBlock::SIZE`] mapped, page-aligned
    /// bytes that stay mapped for `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *const u8, name: &str) -> Result<&'a SyncBlock> {
        let block = &*(ptr as *const SyncBlock);
        if block.magic.load(Ordering::Acquire) != SYNC_MAGIC {
            return Err(ArenaError::NotInitialized(name.to_string()));
        }
        Ok(block)
    }

    /// Like [`from_ptr`](Self::from_ptr) without the magic check, for the
    /// creator before initialization.
    ///
    /// # Safety
    /// Same as [`from_ptr`](Self::from_ptr).
    pub unsafe fn from_ptr_unchecked<'a>(ptr: *const u8) -> &'a SyncBlock {
        &*(ptr as *const SyncBlock)
    }

    /// Destroys every primitive exactly once across all attached processes.
    ///
    /// Returns `false` if another caller already tore the block down.
    pub fn destroy_primitives(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.magic.store(0, Ordering::Release);
        self.frame_ready.destroy();
        self.render_done.destroy();
        self.turnstile.destroy();
        self.state_lock.destroy();
        self.reader_count_lock.destroy();
        for gate in &self.turn_gates {
            gate.destroy();
        }
        debug!("synchronization primitives destroyed");
        true
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Current reader count. Only meaningful while holding `reader_count_lock`,
    /// or in quiescent tests.
    pub fn active_readers(&self) -> u32 {
        unsafe { *self.reader_count.get() }
    }

    /// # Safety
    /// Caller holds `reader_count_lock`.
    pub(crate) unsafe fn reader_count_mut(&self) -> &mut u32 {
        &mut *self.reader_count.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_independent_of_board() {
        assert!(SyncBlock::SIZE < 4096);
    }

    #[test]
    fn uninitialized_block_is_rejected() {
        let bytes = vec![0u64; SyncBlock::SIZE / 8 + 1];
        let result = unsafe { SyncBlock::from_ptr(bytes.as_ptr().cast(), "/zeroed") };
        assert!(matches!(result, Err(ArenaError::NotInitialized(_))));
    }

    #[test]
    fn initialize_then_destroy_twice() {
        let bytes = vec![0u64; SyncBlock::SIZE / 8 + 1];
        let block = unsafe { SyncBlock::from_ptr_unchecked(bytes.as_ptr().cast()) };
        block.initialize().expect("initialize");
        assert!(unsafe { SyncBlock::from_ptr(bytes.as_ptr().cast(), "/heap") }.is_ok());
        assert!(block.destroy_primitives());
        assert!(!block.destroy_primitives());
        assert!(block.is_torn_down());
    }
}
