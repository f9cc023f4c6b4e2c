//! Local input splitting.
//!
//! Input is read unbuffered from a duplicate of fd 0 so that `poll` on the
//! descriptor always reflects what is left to read; lines are assembled here
//! instead.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsFd, BorrowedFd};

use crate::channel::transport::{MAX_PAYLOAD, TERMINATOR};

const READ_CHUNK: usize = 1024;

/// Splits a byte stream into messages of at most [`MAX_PAYLOAD`] bytes.
///
/// A message ends after a newline (kept), after [`MAX_PAYLOAD`] bytes, or at
/// end of input. Terminator bytes are dropped on the way in.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    eof: bool,
}

impl LineReader<File> {
    /// Reader over a duplicate of the process's standard input.
    ///
    /// # Errors
    ///
    /// Returns the `dup` failure.
    pub fn stdin() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::new(File::from(fd)))
    }
}

impl<R: AsFd> AsFd for LineReader<R> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl<R: Read> LineReader<R> {
    /// Wrap `reader`.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Perform one read. Returns `false` once end of input is reached.
    ///
    /// # Errors
    ///
    /// Returns any read failure other than an interrupted call.
    pub fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut chunk = [0_u8; READ_CHUNK];
        let n = loop {
            match self.reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.pending
            .extend(chunk[..n].iter().copied().filter(|byte| *byte != TERMINATOR));
        Ok(true)
    }

    /// Next complete message, if one is buffered.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let window = self.pending.len().min(MAX_PAYLOAD);
        let take = if let Some(pos) = self.pending[..window].iter().position(|b| *b == b'\n') {
            pos + 1
        } else if self.pending.len() >= MAX_PAYLOAD {
            MAX_PAYLOAD
        } else if self.eof && !self.pending.is_empty() {
            self.pending.len()
        } else {
            return None;
        };
        Some(self.pending.drain(..take).collect())
    }

    /// Whether end of input has been seen.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}
