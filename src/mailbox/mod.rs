//! Deferred-display mailbox shared by the Sender and Receiver (manual mode).
//!
//! The Receiver appends every inbound message; the Sender drains the log when
//! the user asks for it (interrupt), after each local send, and when the
//! Receiver reports the log as nearly full.
//!
//! Overflow never discards data: an append that does not fit first drains
//! everything already stored and hands those frames back to the caller.

mod region;

use nix::errno::Errno;
use nix::sys::mman::shm_unlink;
use tracing::{debug, warn};

use crate::channel::transport::{Frame, TERMINATOR};
use crate::{AppError, Result};

pub use region::HEADER_LEN;
use region::{RegionGuard, SharedRegion};

/// Bounded shared log of terminator-delimited frames.
#[derive(Debug)]
pub struct Mailbox {
    region: SharedRegion,
    name: Option<String>,
    watermark: usize,
}

impl Mailbox {
    /// Create the named shared-memory mailbox with `capacity` data bytes.
    ///
    /// A stale object with the same name is reused and emptied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mailbox` if the object cannot be opened, sized or
    /// mapped.
    pub fn create(name: &str, capacity: usize, watermark: usize) -> Result<Self> {
        let region = SharedRegion::create_named(name, capacity)?;
        debug!(name, capacity, watermark, "mailbox created");
        Ok(Self {
            region,
            name: Some(name.to_owned()),
            watermark,
        })
    }

    /// Create an unnamed mailbox; it is still shared with processes forked
    /// after this call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mailbox` if the mapping fails.
    pub fn anonymous(capacity: usize, watermark: usize) -> Result<Self> {
        Ok(Self {
            region: SharedRegion::create_anonymous(capacity)?,
            name: None,
            watermark,
        })
    }

    /// Unlink a named mailbox. Succeeds if it is already gone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cleanup` if `shm_unlink` fails otherwise.
    pub fn remove(name: &str) -> Result<()> {
        match shm_unlink(name) {
            Ok(()) => {
                debug!(name, "mailbox removed");
                Ok(())
            }
            Err(Errno::ENOENT) => Ok(()),
            Err(errno) => {
                warn!(name, %errno, "failed to remove mailbox");
                Err(AppError::Cleanup(format!("shm_unlink {name} failed: {errno}")))
            }
        }
    }

    /// Shared-memory object name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Data area size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Near-full watermark in bytes.
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Enter the critical section.
    #[must_use]
    pub fn lock(&self) -> MailboxGuard<'_> {
        MailboxGuard {
            inner: self.region.lock(),
            watermark: self.watermark,
        }
    }

    /// Append one message. See [`MailboxGuard::append`].
    #[must_use]
    pub fn append(&self, message: &[u8]) -> Vec<Frame> {
        self.lock().append(message)
    }

    /// Take every stored frame. See [`MailboxGuard::drain`].
    #[must_use]
    pub fn drain(&self) -> Vec<Frame> {
        self.lock().drain()
    }

    /// See [`MailboxGuard::near_full`].
    #[must_use]
    pub fn near_full(&self) -> bool {
        self.lock().near_full()
    }

    /// Bytes currently stored, terminators included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped exclusive access to a [`Mailbox`]; the lock is released on drop.
#[derive(Debug)]
pub struct MailboxGuard<'a> {
    inner: RegionGuard<'a>,
    watermark: usize,
}

impl MailboxGuard<'_> {
    /// Store `message` followed by a terminator.
    ///
    /// When `offset + len + 1` would exceed the capacity, all stored frames
    /// are drained first and returned; otherwise the returned list is empty.
    /// The message is cut at its first terminator byte, and a message that
    /// cannot fit even in an empty mailbox is truncated to `capacity - 1`.
    pub fn append(&mut self, message: &[u8]) -> Vec<Frame> {
        let capacity = self.inner.capacity();
        let message = message
            .iter()
            .position(|byte| *byte == TERMINATOR)
            .map_or(message, |end| &message[..end]);
        let message = if message.len() >= capacity {
            warn!(
                len = message.len(),
                capacity, "message larger than mailbox, truncating"
            );
            &message[..capacity - 1]
        } else {
            message
        };

        let needed = message.len() + 1;
        let forced = if self.inner.offset() + needed > capacity {
            let frames = self.drain();
            debug!(drained = frames.len(), "mailbox full, forced drain");
            frames
        } else {
            Vec::new()
        };

        let offset = self.inner.offset();
        let data = self.inner.data();
        data[offset..offset + message.len()].copy_from_slice(message);
        data[offset + message.len()] = TERMINATOR;
        self.inner.set_offset(offset + needed);
        forced
    }

    /// Return all stored frames in append order and empty the mailbox.
    pub fn drain(&mut self) -> Vec<Frame> {
        let end = self.inner.offset();
        if end == 0 {
            return Vec::new();
        }

        let data = self.inner.data();
        let mut frames = Vec::new();
        let mut start = 0;
        while start < end {
            let stop = data[start..end]
                .iter()
                .position(|byte| *byte == TERMINATOR)
                .map_or(end, |pos| start + pos);
            frames.push(Frame::new(data[start..stop].to_vec()));
            start = stop + 1;
        }

        data.fill(0);
        self.inner.set_offset(0);
        frames
    }

    /// Whether free space has fallen to the watermark or below.
    #[must_use]
    pub fn near_full(&self) -> bool {
        self.inner.capacity() - self.inner.offset() <= self.watermark
    }

    /// Bytes currently stored, terminators included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.offset()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
