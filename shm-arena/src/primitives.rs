//! Process-shared semaphores.
//!
//! [`RawSemaphore`] is an unnamed POSIX semaphore initialized with `pshared = 1`
//! and stored inside a shared mapping, so any process that maps the segment can
//! wait on or post it without inheriting handles from its parent.
//!
//! The raw semaphore is never handed out directly. Each role gets a typed
//! wrapper: [`BinaryLock`] for mutual exclusion and [`CountingSignal`] for
//! one-way notifications. Swapping a lock for a signal is a type error.

use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ArenaError, Result};

const UNINIT: u32 = 0;
const LIVE: u32 = 1;
const DESTROYED: u32 = 2;

/// An unnamed, process-shared POSIX semaphore plus a lifecycle word.
///
/// The lifecycle word makes `destroy` idempotent across every process that
/// shares the mapping: only the caller that moves it from live to destroyed
/// calls `sem_destroy`.
#[repr(C)]
pub struct RawSemaphore {
    sem: UnsafeCell<libc::sem_t>,
    state: AtomicU32,
}

unsafe impl Send for RawSemaphore {}
unsafe impl Sync for RawSemaphore {}

impl RawSemaphore {
    /// Initializes the semaphore in place with a starting count.
    pub fn init(&self, value: u32) -> Result<()> {
        if self
            .state
            .compare_exchange(UNINIT, LIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ArenaError::semaphore(
                "init",
                io::Error::new(io::ErrorKind::AlreadyExists, "semaphore already initialized"),
            ));
        }
        if unsafe { libc::sem_init(self.sem.get(), 1, value) } != 0 {
            let err = io::Error::last_os_error();
            self.state.store(UNINIT, Ordering::Release);
            return Err(ArenaError::semaphore("init", err));
        }
        Ok(())
    }

    /// Blocks until the count is positive, then decrements it.
    ///
    /// `EINTR` is retried; any other failure is reported.
    pub fn acquire(&self) -> Result<()> {
        self.ensure_live()?;
        loop {
            if unsafe { libc::sem_wait(self.sem.get()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ArenaError::semaphore("wait", err));
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` when the timeout elapsed first.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<bool> {
        self.ensure_live()?;
        let deadline = abs_deadline(timeout);
        loop {
            if unsafe { libc::sem_timedwait(self.sem.get(), &deadline) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(ArenaError::semaphore("timedwait", err)),
            }
        }
    }

    /// Decrements without blocking; `Ok(false)` if the count was zero.
    pub fn try_acquire(&self) -> Result<bool> {
        self.ensure_live()?;
        loop {
            if unsafe { libc::sem_trywait(self.sem.get()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Ok(false),
                _ => return Err(ArenaError::semaphore("trywait", err)),
            }
        }
    }

    /// Increments the count, waking one blocked waiter if any.
    pub fn release(&self) -> Result<()> {
        self.ensure_live()?;
        if unsafe { libc::sem_post(self.sem.get()) } != 0 {
            return Err(ArenaError::semaphore("post", io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Current count, for diagnostics and tests.
    pub fn value(&self) -> Result<i32> {
        self.ensure_live()?;
        let mut value = 0;
        if unsafe { libc::sem_getvalue(self.sem.get(), &mut value) } != 0 {
            return Err(ArenaError::semaphore("getvalue", io::Error::last_os_error()));
        }
        Ok(value)
    }

    /// Releases OS resources. Returns `true` only for the call that did it.
    pub fn destroy(&self) -> bool {
        if self
            .state
            .compare_exchange(LIVE, DESTROYED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        unsafe {
            libc::sem_destroy(self.sem.get());
        }
        true
    }

    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == LIVE
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(ArenaError::Destroyed)
        }
    }
}

fn abs_deadline(timeout: Duration) -> libc::timespec {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let at = now + timeout;
    libc::timespec {
        tv_sec: at.as_secs() as libc::time_t,
        tv_nsec: at.subsec_nanos() as libc::c_long,
    }
}

/// Mutual-exclusion lock; starts unlocked.
#[repr(transparent)]
pub struct BinaryLock(RawSemaphore);

impl BinaryLock {
    pub fn init(&self) -> Result<()> {
        self.0.init(1)
    }

    pub fn lock(&self) -> Result<()> {
        self.0.acquire()
    }

    pub fn unlock(&self) -> Result<()> {
        self.0.release()
    }

    /// `true` if nobody holds the lock right now.
    pub fn is_free(&self) -> Result<bool> {
        Ok(self.0.value()? > 0)
    }

    pub fn destroy(&self) -> bool {
        self.0.destroy()
    }
}

/// One-way notification counter; each `post` admits exactly one `wait`.
#[repr(transparent)]
pub struct CountingSignal(RawSemaphore);

impl CountingSignal {
    pub fn init(&self, initial: u32) -> Result<()> {
        self.0.init(initial)
    }

    pub fn post(&self) -> Result<()> {
        self.0.release()
    }

    pub fn wait(&self) -> Result<()> {
        self.0.acquire()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.0.acquire_timeout(timeout)
    }

    pub fn try_wait(&self) -> Result<bool> {
        self.0.try_acquire()
    }

    pub fn pending(&self) -> Result<i32> {
        self.0.value()
    }

    pub fn destroy(&self) -> bool {
        self.0.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed<T>() -> Box<T> {
        // All-zero bytes are the "not yet initialized" state.
        unsafe { Box::new(std::mem::zeroed()) }
    }

    #[test]
    fn lock_round_trip() {
        let lock = zeroed::<BinaryLock>();
        lock.init().expect("init");
        assert!(lock.is_free().unwrap());
        lock.lock().expect("lock");
        assert!(!lock.is_free().unwrap());
        lock.unlock().expect("unlock");
        assert!(lock.is_free().unwrap());
        assert!(lock.destroy());
    }

    #[test]
    fn signal_counts_posts() {
        let signal = zeroed::<CountingSignal>();
        signal.init(0).expect("init");
        assert!(!signal.try_wait().unwrap());
        signal.post().unwrap();
        signal.post().unwrap();
        assert_eq!(signal.pending().unwrap(), 2);
        assert!(signal.try_wait().unwrap());
        assert!(signal.try_wait().unwrap());
        assert!(!signal.try_wait().unwrap());
        signal.destroy();
    }

    #[test]
    fn wait_timeout_expires_without_post() {
        let signal = zeroed::<CountingSignal>();
        signal.init(0).unwrap();
        assert!(!signal.wait_timeout(Duration::from_millis(20)).unwrap());
        signal.post().unwrap();
        assert!(signal.wait_timeout(Duration::from_millis(20)).unwrap());
        signal.destroy();
    }

    #[test]
    fn double_destroy_is_harmless() {
        let signal = zeroed::<CountingSignal>();
        signal.init(1).unwrap();
        assert!(signal.destroy());
        assert!(!signal.destroy());
        assert!(matches!(signal.wait(), Err(ArenaError::Destroyed)));
        assert!(matches!(signal.post(), Err(ArenaError::Destroyed)));
    }

    extern "C" fn ignore_signal(_: libc::c_int) {}

    #[test]
    fn interrupted_wait_keeps_waiting_until_posted() {
        use std::os::unix::thread::JoinHandleExt;
        use std::sync::Arc;
        use std::thread;

        // No SA_RESTART, so every delivery makes sem_wait fail with EINTR.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = 0;
            assert_eq!(libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()), 0);
        }

        let signal: Arc<Box<CountingSignal>> = Arc::new(zeroed());
        signal.init(0).unwrap();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let _ = done_tx.send(signal.wait().is_ok());
            })
        };

        for _ in 0..10 {
            thread::sleep(Duration::from_millis(10));
            unsafe {
                libc::pthread_kill(waiter.as_pthread_t(), libc::SIGUSR1);
            }
        }
        assert!(done_rx.try_recv().is_err(), "wait returned without a post");

        signal.post().unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        waiter.join().unwrap();
        signal.destroy();
    }

    #[test]
    fn init_twice_is_rejected() {
        let lock = zeroed::<BinaryLock>();
        lock.init().unwrap();
        assert!(lock.init().is_err());
        lock.destroy();
    }
}
