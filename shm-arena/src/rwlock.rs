//! Writer-priority reader/writer protocol over the game state.
//!
//! Every writer and the *first* reader of each reader group pass through the
//! same turnstile. A writer keeps the turnstile from just before it queues for
//! the state lock until it owns it, so a writer waiting behind an active reader
//! group blocks any new reader group from forming. Readers only hold the
//! turnstile long enough to bump the shared count.
//!
//! Every entry sequence rolls back the locks it already took if a later step
//! fails, so a failed `*_enter` leaves the block exactly as it found it.

use tracing::warn;

use crate::error::Result;
use crate::sync_block::SyncBlock;

impl SyncBlock {
    /// Joins the reader group, taking the state lock if this is the first reader.
    pub fn reader_enter(&self) -> Result<()> {
        self.turnstile.lock()?;
        if let Err(err) = self.reader_count_lock.lock() {
            self.unlock_or_warn(&self.turnstile, "turnstile");
            return Err(err);
        }

        // Safety: reader_count_lock is held.
        let count = unsafe { self.reader_count_mut() };
        *count += 1;
        if *count == 1 {
            if let Err(err) = self.state_lock.lock() {
                self.abandon_reader_join(false);
                return Err(err);
            }
        }

        if let Err(err) = self.reader_count_lock.unlock() {
            // The count lock is still ours, so the join can be undone.
            self.abandon_reader_join(true);
            return Err(err);
        }
        self.unlock_or_warn(&self.turnstile, "turnstile");
        Ok(())
    }

    /// Takes back a reader join whose entry sequence failed part way.
    ///
    /// The caller holds the turnstile and `reader_count_lock` and has already
    /// counted itself. `holds_state` says whether a first reader also took the
    /// state lock. All three locks are released on return.
    fn abandon_reader_join(&self, holds_state: bool) {
        // Safety: reader_count_lock is held.
        let count = unsafe { self.reader_count_mut() };
        *count = count.saturating_sub(1);
        if holds_state && *count == 0 {
            self.unlock_or_warn(&self.state_lock, "state lock");
        }
        self.unlock_or_warn(&self.reader_count_lock, "reader count lock");
        self.unlock_or_warn(&self.turnstile, "turnstile");
    }

    /// Leaves the reader group; the last reader out releases the state lock.
    pub fn reader_exit(&self) -> Result<()> {
        self.reader_count_lock.lock()?;
        // Safety: reader_count_lock is held.
        let count = unsafe { self.reader_count_mut() };
        if *count == 0 {
            warn!("reader_exit without a matching reader_enter");
            return self.reader_count_lock.unlock();
        }
        *count -= 1;
        let last_out = if *count == 0 {
            self.state_lock.unlock()
        } else {
            Ok(())
        };
        let released = self.reader_count_lock.unlock();
        last_out.and(released)
    }

    /// Takes exclusive access, queueing ahead of any reader group not yet formed.
    pub fn writer_enter(&self) -> Result<()> {
        self.turnstile.lock()?;
        if let Err(err) = self.state_lock.lock() {
            self.unlock_or_warn(&self.turnstile, "turnstile");
            return Err(err);
        }
        Ok(())
    }

    pub fn writer_exit(&self) -> Result<()> {
        let state = self.state_lock.unlock();
        let turnstile = self.turnstile.unlock();
        state.and(turnstile)
    }

    /// Scoped reader role, released on drop.
    pub fn read(&self) -> Result<ReadGuard<'_>> {
        self.reader_enter()?;
        Ok(ReadGuard { block: self })
    }

    /// Scoped writer role, released on drop.
    pub fn write(&self) -> Result<WriteGuard<'_>> {
        self.writer_enter()?;
        Ok(WriteGuard { block: self })
    }

    fn unlock_or_warn(&self, lock: &crate::primitives::BinaryLock, what: &str) {
        if let Err(error) = lock.unlock() {
            warn!(%error, lock = what, "failed to release lock during rollback");
        }
    }
}

/// Holds the reader role until dropped.
pub struct ReadGuard<'a> {
    block: &'a SyncBlock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.block.reader_exit() {
            warn!(%error, "reader_exit failed");
        }
    }
}

/// Holds the writer role until dropped.
pub struct WriteGuard<'a> {
    block: &'a SyncBlock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.block.writer_exit() {
            warn!(%error, "writer_exit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on_heap() -> (Vec<u64>, &'static SyncBlock) {
        let bytes = vec![0u64; SyncBlock::SIZE / 8 + 1];
        // The Vec is returned alongside and outlives every use in the test.
        let block = unsafe { SyncBlock::from_ptr_unchecked(bytes.as_ptr().cast()) };
        block.initialize().expect("initialize");
        (bytes, block)
    }

    #[test]
    fn readers_share_and_last_one_releases() {
        let (_bytes, block) = block_on_heap();
        block.reader_enter().unwrap();
        block.reader_enter().unwrap();
        assert_eq!(block.active_readers(), 2);
        assert!(!block.state_lock.is_free().unwrap());
        assert!(block.turnstile.is_free().unwrap());

        block.reader_exit().unwrap();
        assert!(!block.state_lock.is_free().unwrap());
        block.reader_exit().unwrap();
        assert_eq!(block.active_readers(), 0);
        assert!(block.state_lock.is_free().unwrap());
        block.destroy_primitives();
    }

    #[test]
    fn writer_holds_both_locks_until_exit() {
        let (_bytes, block) = block_on_heap();
        {
            let _guard = block.write().unwrap();
            assert!(!block.turnstile.is_free().unwrap());
            assert!(!block.state_lock.is_free().unwrap());
        }
        assert!(block.turnstile.is_free().unwrap());
        assert!(block.state_lock.is_free().unwrap());
        block.destroy_primitives();
    }

    #[test]
    fn failed_reader_entry_leaves_no_lock_held() {
        let (_bytes, block) = block_on_heap();
        block.state_lock.destroy();
        assert!(block.reader_enter().is_err());
        assert_eq!(block.active_readers(), 0);
        assert!(block.turnstile.is_free().unwrap());
        assert!(block.reader_count_lock.is_free().unwrap());
        block.destroy_primitives();
    }

    #[test]
    fn abandoned_first_reader_releases_every_lock() {
        let (_bytes, block) = block_on_heap();
        // Everything a first reader holds just before releasing the count lock.
        block.turnstile.lock().unwrap();
        block.reader_count_lock.lock().unwrap();
        unsafe { *block.reader_count_mut() += 1 };
        block.state_lock.lock().unwrap();

        block.abandon_reader_join(true);
        assert_eq!(block.active_readers(), 0);
        assert!(block.state_lock.is_free().unwrap());
        assert!(block.reader_count_lock.is_free().unwrap());
        assert!(block.turnstile.is_free().unwrap());
        block.destroy_primitives();
    }

    #[test]
    fn abandoned_join_keeps_the_group_lock_for_remaining_readers() {
        let (_bytes, block) = block_on_heap();
        block.reader_enter().unwrap();
        block.turnstile.lock().unwrap();
        block.reader_count_lock.lock().unwrap();
        unsafe { *block.reader_count_mut() += 1 };

        block.abandon_reader_join(true);
        assert_eq!(block.active_readers(), 1);
        assert!(!block.state_lock.is_free().unwrap());
        assert!(block.turnstile.is_free().unwrap());

        block.reader_exit().unwrap();
        assert!(block.state_lock.is_free().unwrap());
        block.destroy_primitives();
    }

    #[test]
    fn failed_writer_entry_releases_turnstile() {
        let (_bytes, block) = block_on_heap();
        block.state_lock.destroy();
        assert!(block.write().is_err());
        assert!(block.turnstile.is_free().unwrap());
        block.destroy_primitives();
    }
}
