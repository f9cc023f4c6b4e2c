//! Named-pipe channels between the two chat endpoints.
//!
//! A session uses two FIFOs per ordered pair of nicknames: the local
//! endpoint writes to `base_dir/local-peer.chat` and reads from
//! `base_dir/peer-local.chat`. The peer derives the same two paths with the
//! roles swapped, so each process's outbound path is the other's inbound path.

pub mod transport;

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, warn};

use crate::identity::EndpointId;
use crate::{AppError, Result};

/// File extension shared by both pipes.
pub const PIPE_EXTENSION: &str = "chat";

/// The two FIFO paths of one session, seen from the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    outbound: PathBuf,
    inbound: PathBuf,
}

impl ChannelPair {
    /// Derive the pipe paths for the ordered pair (`local`, `peer`).
    #[must_use]
    pub fn new(base_dir: &Path, local: &EndpointId, peer: &EndpointId) -> Self {
        Self {
            outbound: base_dir.join(format!("{local}-{peer}.{PIPE_EXTENSION}")),
            inbound: base_dir.join(format!("{peer}-{local}.{PIPE_EXTENSION}")),
        }
    }

    /// Path this endpoint writes to.
    #[must_use]
    pub fn outbound(&self) -> &Path {
        &self.outbound
    }

    /// Path this endpoint reads from.
    #[must_use]
    pub fn inbound(&self) -> &Path {
        &self.inbound
    }

    /// Create both FIFOs if they do not exist yet.
    ///
    /// Pipes left behind by an earlier session are reused as they are.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelOpen` if `mkfifo` fails for a reason other
    /// than the path already existing, or if the existing path is not a FIFO.
    pub fn create(&self) -> Result<()> {
        create_fifo(&self.outbound)?;
        create_fifo(&self.inbound)
    }

    /// Unlink both FIFOs, tolerating paths that are already gone.
    ///
    /// Both paths are attempted even if the first one fails.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cleanup` describing the last failure.
    pub fn remove(&self) -> Result<()> {
        let mut outcome = Ok(());
        for path in [&self.outbound, &self.inbound] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "pipe removed"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to remove pipe");
                    outcome = Err(AppError::Cleanup(format!(
                        "cannot remove {}: {err}",
                        path.display()
                    )));
                }
            }
        }
        outcome
    }
}

fn create_fifo(path: &Path) -> Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) => {
            debug!(path = %path.display(), "pipe created");
            Ok(())
        }
        Err(Errno::EEXIST) => {
            let meta = fs::metadata(path).map_err(|err| {
                AppError::ChannelOpen(format!("cannot inspect {}: {err}", path.display()))
            })?;
            if meta.file_type().is_fifo() {
                debug!(path = %path.display(), "reusing existing pipe");
                Ok(())
            } else {
                Err(AppError::ChannelOpen(format!(
                    "{} exists and is not a named pipe",
                    path.display()
                )))
            }
        }
        Err(errno) => Err(AppError::ChannelOpen(format!(
            "mkfifo {} failed: {errno}",
            path.display()
        ))),
    }
}
