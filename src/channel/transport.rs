//! Framed message transport over one FIFO.
//!
//! A frame is the message payload followed by a single [`TERMINATOR`] byte.
//! Frames are written with one `write` call (well under `PIPE_BUF`), so two
//! writers can never interleave inside a frame.
//!
//! Reads are byte-wise: the reader never consumes past the terminator, which
//! keeps the next frame intact in the pipe for the following call.

use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Largest payload a single frame carries.
pub const MAX_PAYLOAD: usize = 255;

/// Byte that ends every frame on the wire.
pub const TERMINATOR: u8 = 0;

/// One received message payload, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Wrap raw payload bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the frame, returning its payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Frame {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// Outcome of one [`read_frame`] call.
#[derive(Debug)]
pub enum Received {
    /// A complete (or EOF-terminated partial) frame.
    Frame(Frame),
    /// The writer closed its end before any byte of a new frame arrived.
    Closed,
    /// Non-recoverable read failure.
    Error(AppError),
}

/// Write `payload` plus terminator to `writer`.
///
/// Interrupted writes are retried; nothing else is.
///
/// # Errors
///
/// - `AppError::Transport` if the payload is larger than [`MAX_PAYLOAD`],
///   contains the terminator byte, or the write fails.
/// - `AppError::PeerDisconnected` if the reading end is gone (`EPIPE`).
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD {
        return Err(AppError::Transport(format!(
            "payload of {} bytes exceeds {MAX_PAYLOAD}",
            payload.len()
        )));
    }
    if payload.contains(&TERMINATOR) {
        return Err(AppError::Transport(
            "payload contains the frame terminator".into(),
        ));
    }

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload);
    frame.push(TERMINATOR);

    let mut written = 0;
    while written < frame.len() {
        match writer.write(&frame[written..]) {
            Ok(0) => {
                return Err(AppError::Transport("write accepted zero bytes".into()));
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                return Err(AppError::PeerDisconnected(format!("write failed: {err}")));
            }
            Err(err) => return Err(AppError::Transport(format!("write failed: {err}"))),
        }
    }
    Ok(written)
}

/// Read one frame from `reader`.
///
/// Bytes past [`MAX_PAYLOAD`] are consumed and dropped up to the terminator.
pub fn read_frame<R: Read>(reader: &mut R) -> Received {
    let mut payload = Vec::with_capacity(MAX_PAYLOAD);
    let mut byte = [0_u8; 1];
    let mut read_any = false;
    let mut dropped = 0_usize;

    loop {
        match reader.read(&mut byte) {
            Ok(0) if !read_any => return Received::Closed,
            Ok(0) => break,
            Ok(_) => {
                read_any = true;
                if byte[0] == TERMINATOR {
                    break;
                }
                if payload.len() < MAX_PAYLOAD {
                    payload.push(byte[0]);
                } else {
                    dropped += 1;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Received::Error(AppError::Transport(format!("read failed: {err}")));
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, "frame exceeded {MAX_PAYLOAD} bytes and was truncated");
    }
    Received::Frame(Frame(payload))
}

/// Write half of a session: the local endpoint's outbound FIFO.
#[derive(Debug)]
pub struct OutboundChannel {
    file: File,
    path: PathBuf,
}

impl OutboundChannel {
    /// Try to open `path` for writing without blocking.
    ///
    /// Returns `Ok(None)` while no reader has the FIFO open yet, so the
    /// caller can keep reacting to triggers while it waits for the peer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelOpen` for any other `open` or `fcntl` failure.
    pub fn try_open(path: &Path) -> Result<Option<Self>> {
        let file = match OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.raw_os_error() == Some(Errno::ENXIO as i32) => return Ok(None),
            Err(err) => {
                return Err(AppError::ChannelOpen(format!(
                    "cannot open {} for writing: {err}",
                    path.display()
                )));
            }
        };

        set_blocking(&file).map_err(|errno| {
            AppError::ChannelOpen(format!(
                "cannot make {} blocking: {errno}",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "outbound channel open");
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Open `path` for writing, retrying every `retry` until a reader
    /// appears.
    ///
    /// # Errors
    ///
    /// Same as [`OutboundChannel::try_open`].
    pub fn open(path: &Path, retry: Duration) -> Result<Self> {
        loop {
            if let Some(channel) = Self::try_open(path)? {
                return Ok(channel);
            }
            thread::sleep(retry);
        }
    }

    /// Send one message.
    ///
    /// Returns the number of bytes written, terminator included.
    ///
    /// # Errors
    ///
    /// See [`write_frame`].
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        write_frame(&mut self.file, payload)
    }

    /// The FIFO path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read half of a session: the local endpoint's inbound FIFO.
#[derive(Debug)]
pub struct InboundChannel {
    file: File,
    path: PathBuf,
}

impl InboundChannel {
    /// Open `path` for reading, blocking until a writer appears.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelOpen` if `open` fails.
    pub fn open(path: &Path) -> Result<Self> {
        let file = loop {
            match File::open(path) {
                Ok(file) => break file,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(AppError::ChannelOpen(format!(
                        "cannot open {} for reading: {err}",
                        path.display()
                    )));
                }
            }
        };
        debug!(path = %path.display(), "inbound channel open");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Receive the next message. See [`read_frame`].
    pub fn receive_message(&mut self) -> Received {
        read_frame(&mut self.file)
    }

    /// The FIFO path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for InboundChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Briefly open `path` as a writer and close it again.
///
/// A reader blocked in `open` on that FIFO returns and then sees end of
/// stream. Does nothing when no reader is waiting.
pub fn poke(path: &Path) {
    match OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
    {
        Ok(_) => debug!(path = %path.display(), "poked waiting reader"),
        Err(err) => debug!(path = %path.display(), %err, "nothing to poke"),
    }
}

fn set_blocking(file: &File) -> nix::Result<()> {
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
    Ok(())
}
