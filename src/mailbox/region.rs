//! Shared memory mapping with an in-band lock word.
//!
//! Layout of a mapped region:
//!
//! ```text
//! +------------+------------+------------------+---------------------+
//! | lock (u32) | reserved   | offset (u64)     | data area ...       |
//! +------------+------------+------------------+---------------------+
//! 0            4            8                  16 (HEADER_LEN)
//! ```
//!
//! The lock word is taken with an atomic compare-exchange. Atomics on a
//! `MAP_SHARED` page are coherent across processes, so the same word guards
//! the region in the Sender and the Receiver after `fork`.

#![allow(unsafe_code)]

use std::hint::spin_loop;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;

use nix::fcntl::OFlag;
use nix::libc::off_t;
use nix::sys::mman::{mmap, mmap_anonymous, munmap, shm_open, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::warn;

use crate::{AppError, Result};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Busy-wait iterations before yielding the CPU while the lock is held.
const SPIN_LIMIT: u32 = 128;

#[repr(C)]
struct Header {
    lock: AtomicU32,
    _reserved: u32,
    offset: AtomicU64,
}

/// Bytes reserved at the start of every region.
pub const HEADER_LEN: usize = std::mem::size_of::<Header>();

/// A read/write `MAP_SHARED` mapping of `HEADER_LEN + capacity` bytes.
#[derive(Debug)]
pub(crate) struct SharedRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the header is only touched through atomics and the data area only
// through `RegionGuard`, which requires holding the lock word.
unsafe impl Send for SharedRegion {}
// SAFETY: see `Send` above.
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or reuse) the named POSIX shared-memory object and map it.
    ///
    /// The region is reset to an unlocked, empty state.
    pub(crate) fn create_named(name: &str, capacity: usize) -> Result<Self> {
        let len = region_len(capacity)?;
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o600),
        )
        .map_err(|errno| AppError::Mailbox(format!("shm_open {name} failed: {errno}")))?;

        let size = off_t::try_from(len.get())
            .map_err(|_| AppError::Mailbox(format!("region of {len} bytes is too large")))?;
        ftruncate(&fd, size)
            .map_err(|errno| AppError::Mailbox(format!("ftruncate {name} failed: {errno}")))?;

        // SAFETY: fresh mapping of a descriptor we own, length matches the
        // object size set just above; no existing Rust reference aliases it.
        let base = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        }
        .map_err(|errno| AppError::Mailbox(format!("mmap {name} failed: {errno}")))?;

        let region = Self {
            base: base.cast(),
            len: len.get(),
        };
        region.reset();
        Ok(region)
    }

    /// Map an unnamed shared region. Still shared with children after `fork`.
    pub(crate) fn create_anonymous(capacity: usize) -> Result<Self> {
        let len = region_len(capacity)?;
        // SAFETY: anonymous mapping, nothing else refers to it yet.
        let base = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_ANONYMOUS,
            )
        }
        .map_err(|errno| AppError::Mailbox(format!("anonymous mmap failed: {errno}")))?;

        Ok(Self {
            base: base.cast(),
            len: len.get(),
        })
    }

    /// Size of the data area.
    pub(crate) fn capacity(&self) -> usize {
        self.len - HEADER_LEN
    }

    /// Take the lock word, spinning and then yielding until it is free.
    pub(crate) fn lock(&self) -> RegionGuard<'_> {
        let header = self.header();
        let mut spins = 0_u32;
        while header
            .lock
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if spins < SPIN_LIMIT {
                spins += 1;
                spin_loop();
            } else {
                thread::yield_now();
            }
        }
        RegionGuard { region: self }
    }

    fn header(&self) -> &Header {
        // SAFETY: the mapping is at least HEADER_LEN bytes, page aligned, and
        // the header holds only atomics and a plain reserved word.
        unsafe { self.base.cast::<Header>().as_ref() }
    }

    fn reset(&self) {
        // A stale object may still carry the lock of a dead session.
        self.header().lock.store(UNLOCKED, Ordering::Release);
        let mut guard = self.lock();
        guard.data().fill(0);
        guard.set_offset(0);
        drop(guard);
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe a live mapping created by this value,
        // and no guard can outlive `self`.
        if let Err(errno) = unsafe { munmap(self.base.cast(), self.len) } {
            warn!(%errno, "munmap of mailbox region failed");
        }
    }
}

/// Exclusive access to the data area and write offset.
#[derive(Debug)]
pub(crate) struct RegionGuard<'a> {
    region: &'a SharedRegion,
}

impl RegionGuard<'_> {
    pub(crate) fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Current write offset, clamped to the data capacity.
    pub(crate) fn offset(&self) -> usize {
        let raw = self.region.header().offset.load(Ordering::Relaxed);
        usize::try_from(raw).map_or(self.region.capacity(), |offset| {
            offset.min(self.region.capacity())
        })
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        let offset = offset.min(self.region.capacity());
        self.region
            .header()
            .offset
            .store(u64::try_from(offset).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// The data area.
    pub(crate) fn data(&mut self) -> &mut [u8] {
        // SAFETY: the lock word is held for the guard's lifetime, so no other
        // guard (in this or the peer process) touches these bytes, and
        // `&mut self` prevents a second borrow through this guard.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.region.base.as_ptr().add(HEADER_LEN),
                self.region.capacity(),
            )
        }
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.region
            .header()
            .lock
            .store(UNLOCKED, Ordering::Release);
    }
}

fn region_len(capacity: usize) -> Result<NonZeroUsize> {
    if capacity == 0 {
        return Err(AppError::Mailbox("mailbox capacity must be non-zero".into()));
    }
    capacity
        .checked_add(HEADER_LEN)
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| AppError::Mailbox(format!("invalid mailbox capacity {capacity}")))
}
