//! Named POSIX shared memory segments.
//!
//! [`SharedRegion`] wraps `shm_open` + `mmap`. The creating process owns the
//! name and unlinks it on drop; attaching processes only map and unmap.

use std::ffi::CString;
use std::io;
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use crate::error::{ArenaError, Result};

/// A mapped, named shared memory segment.
pub struct SharedRegion {
    name: String,
    ptr: NonNull<u8>,
    len: usize,
    writable: bool,
    owner: bool,
    unlinked: bool,
}

// The mapping is plain shared memory; callers synchronize access through the
// semaphores stored in the sync segment.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Creates a fresh zero-filled segment of `len` bytes, mapped read-write.
    ///
    /// A stale segment left under the same name by a crashed run is unlinked
    /// first. Any failure after `shm_open` unlinks the name again.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let c_name = segment_name(name)?;
        unsafe {
            libc::shm_unlink(c_name.as_ptr());
        }

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(ArenaError::shm("create", name, io::Error::last_os_error()));
        }

        let rollback = |op: &'static str| {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            ArenaError::shm(op, name, err)
        };

        if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
            return Err(rollback("truncate"));
        }
        let ptr = match map(fd, len, true) {
            Some(ptr) => ptr,
            None => return Err(rollback("map")),
        };
        unsafe {
            libc::close(fd);
        }

        debug!(name, len, "created shared memory segment");
        Ok(Self {
            name: name.to_string(),
            ptr,
            len,
            writable: true,
            owner: true,
            unlinked: false,
        })
    }

    /// Attaches to an existing segment, sizing the mapping from `fstat`.
    pub fn open(name: &str, writable: bool) -> Result<Self> {
        let c_name = segment_name(name)?;
        let flags = if writable { libc::O_RDWR } else { libc::O_RDONLY };
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, 0) };
        if fd < 0 {
            return Err(ArenaError::shm("open", name, io::Error::last_os_error()));
        }

        let fail = |op: &'static str| {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
            }
            ArenaError::shm(op, name, err)
        };

        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } != 0 {
            return Err(fail("stat"));
        }
        let len = stat.st_size as usize;
        if len == 0 {
            unsafe {
                libc::close(fd);
            }
            return Err(ArenaError::NotInitialized(name.to_string()));
        }
        let ptr = match map(fd, len, writable) {
            Some(ptr) => ptr,
            None => return Err(fail("map")),
        };
        unsafe {
            libc::close(fd);
        }

        Ok(Self {
            name: name.to_string(),
            ptr,
            len,
            writable,
            owner: false,
            unlinked: false,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Views the mapping as bytes.
    ///
    /// # Safety
    /// The caller must hold a role (reader or writer) that excludes concurrent
    /// writers for as long as the slice lives.
    pub unsafe fn bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// Views the mapping as mutable bytes.
    ///
    /// # Safety
    /// The mapping must be writable and the caller must hold writer exclusion
    /// for as long as the slice lives.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }

    /// Removes the name so no new process can attach. Idempotent.
    pub fn unlink(&mut self) {
        if self.unlinked || !self.owner {
            return;
        }
        self.unlinked = true;
        let Ok(c_name) = CString::new(self.name.as_str()) else {
            return;
        };
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                warn!(name = %self.name, error = %err, "shm_unlink failed");
            }
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        self.unlink();
    }
}

fn segment_name(name: &str) -> Result<CString> {
    let valid = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
    if !valid {
        return Err(ArenaError::InvalidName(name.to_string()));
    }
    CString::new(name).map_err(|_| ArenaError::InvalidName(name.to_string()))
}

fn map(fd: libc::c_int, len: usize, writable: bool) -> Option<NonNull<u8>> {
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };
    let addr = unsafe { libc::mmap(ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0) };
    if addr == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(addr.cast())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("/shm-arena-test-{tag}-{}", std::process::id())
    }

    #[test]
    fn rejects_names_without_leading_slash() {
        assert!(matches!(
            SharedRegion::create("no-slash", 64),
            Err(ArenaError::InvalidName(_))
        ));
        assert!(matches!(
            SharedRegion::open("/a/b", false),
            Err(ArenaError::InvalidName(_))
        ));
    }

    #[test]
    fn attach_sees_creator_writes_and_unlink_is_idempotent() {
        let name = unique("region");
        let mut owner = SharedRegion::create(&name, 128).expect("create");
        unsafe {
            owner.bytes_mut()[7] = 42;
        }

        let reader = SharedRegion::open(&name, false).expect("open");
        assert_eq!(reader.len(), 128);
        assert!(!reader.is_writable());
        assert_eq!(unsafe { reader.bytes()[7] }, 42);

        owner.unlink();
        owner.unlink();
        assert!(SharedRegion::open(&name, false).is_err());
    }
}
