//! Per-process context owning both shared segments.
//!
//! Every process builds exactly one [`Arena`] in its entry point and passes it
//! by reference to whatever needs the game state or the primitives. The
//! coordinator creates the segments and owns their teardown; players and the
//! observer attach and only unmap on drop.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::config::SegmentNames;
use crate::error::{ArenaError, Result};
use crate::handshake::ObserverHandshake;
use crate::rwlock::{ReadGuard, WriteGuard};
use crate::shm::SharedRegion;
use crate::state::{StateView, state_size};
use crate::sync_block::SyncBlock;
use crate::turn::TurnGate;

pub struct Arena {
    state: Option<SharedRegion>,
    sync: Option<SharedRegion>,
    owner: bool,
    torn_down: AtomicBool,
}

impl Arena {
    /// Creates and initializes both segments for a `width` x `height` board.
    ///
    /// Anything created before a failure is unmapped and unlinked again.
    pub fn create(names: &SegmentNames, width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ArenaError::BoardSize { width, height });
        }
        let state = SharedRegion::create(&names.state, state_size(width, height))?;
        // Safety: nobody else can have attached to a segment created just now.
        StateView::format(unsafe { state.bytes_mut() }, width, height)?;

        let sync = SharedRegion::create(&names.sync, SyncBlock::SIZE)?;
        // Safety: the mapping is page aligned and SyncBlock::SIZE bytes long.
        let block = unsafe { SyncBlock::from_ptr_unchecked(sync.as_ptr()) };
        block.initialize()?;

        info!(state = %names.state, sync = %names.sync, width, height, "arena created");
        Ok(Self {
            state: Some(state),
            sync: Some(sync),
            owner: true,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Attaches to segments created by a running coordinator.
    ///
    /// The state is mapped read-only; the sync segment must be writable since
    /// every wait and post mutates it.
    pub fn attach(names: &SegmentNames) -> Result<Self> {
        let sync = SharedRegion::open(&names.sync, true)?;
        if sync.len() < SyncBlock::SIZE {
            return Err(ArenaError::SegmentTooSmall {
                name: names.sync.clone(),
                actual: sync.len(),
                expected: SyncBlock::SIZE,
            });
        }
        // Safety: size checked above; the mapping lives as long as `sync`.
        unsafe { SyncBlock::from_ptr(sync.as_ptr(), &names.sync)? };

        let state = SharedRegion::open(&names.state, false)?;
        debug!(state = %names.state, sync = %names.sync, "attached to arena");
        Ok(Self {
            state: Some(state),
            sync: Some(sync),
            owner: false,
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub fn sync_block(&self) -> Result<&SyncBlock> {
        if self.is_torn_down() {
            return Err(ArenaError::TornDown);
        }
        let sync = self.sync.as_ref().ok_or(ArenaError::TornDown)?;
        // Safety: validated in create/attach and mapped until teardown.
        Ok(unsafe { SyncBlock::from_ptr_unchecked(sync.as_ptr()) })
    }

    pub fn turns(&self) -> Result<TurnGate<'_>> {
        Ok(TurnGate::new(self.sync_block()?))
    }

    pub fn handshake(&self) -> Result<ObserverHandshake<'_>> {
        Ok(ObserverHandshake::new(self.sync_block()?))
    }

    /// Takes the reader role and returns a view valid while it is held.
    pub fn read(&self) -> Result<StateRead<'_>> {
        let block = self.sync_block()?;
        let region = self.state.as_ref().ok_or(ArenaError::TornDown)?;
        let guard = block.read()?;
        // Safety: the reader role excludes the only writer.
        let view = StateView::attach(unsafe { region.bytes() })?;
        Ok(StateRead {
            view,
            _guard: guard,
        })
    }

    /// Takes writer exclusion. Only the creating process may write.
    pub fn write(&self) -> Result<StateWrite<'_>> {
        let block = self.sync_block()?;
        let region = self.state.as_ref().ok_or(ArenaError::TornDown)?;
        if !region.is_writable() {
            return Err(ArenaError::ReadOnly);
        }
        let guard = block.write()?;
        // Safety: writer exclusion is held for the lifetime of the view, and
        // this process is the only one with a writable mapping.
        let view = StateView::attach(unsafe { region.bytes_mut() })?;
        Ok(StateWrite {
            view,
            _guard: guard,
        })
    }

    /// Releases everything exactly once: primitives (owner only), then the
    /// mappings, then the names.
    pub fn teardown(&mut self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owner {
            if let Some(sync) = &self.sync {
                // Safety: still mapped; nothing else in this process uses it now.
                let block = unsafe { SyncBlock::from_ptr_unchecked(sync.as_ptr()) };
                block.destroy_primitives();
            }
        }
        drop(self.state.take());
        drop(self.sync.take());
        if self.owner {
            info!("arena torn down");
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Game state borrowed under the reader role.
pub struct StateRead<'a> {
    view: StateView<&'a [u8]>,
    _guard: ReadGuard<'a>,
}

impl<'a> Deref for StateRead<'a> {
    type Target = StateView<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

/// Game state borrowed under writer exclusion.
pub struct StateWrite<'a> {
    view: StateView<&'a mut [u8]>,
    _guard: WriteGuard<'a>,
}

impl<'a> Deref for StateWrite<'a> {
    type Target = StateView<&'a mut [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl DerefMut for StateWrite<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.view
    }
}
