//! Asynchronous control triggers between the Sender and Receiver processes.
//!
//! Each trigger is carried by one signal. The signal handler only sets the
//! trigger's atomic flag and writes a byte to a wake-up socket; the role loops
//! `poll` that socket next to their blocking descriptor and act on the flags
//! synchronously. Nothing that locks, allocates or prints runs in the handler.
//!
//! | Trigger             | Signal    | Observed by |
//! |---------------------|-----------|-------------|
//! | `UserInterrupt`     | `SIGINT`  | Sender      |
//! | `PeerChannelClosed` | `SIGUSR2` | Sender      |
//! | `WriteBroken`       | `SIGPIPE` | Sender      |
//! | `DrainRequest`      | `SIGUSR1` | Sender      |
//! | `ShutdownRequest`   | `SIGTERM` | Receiver    |

use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::low_level::{pipe, unregister};
use signal_hook::SigId;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Payload-less notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The local user pressed the interrupt key.
    UserInterrupt,
    /// The Receiver saw the inbound channel close.
    PeerChannelClosed,
    /// An outbound write found no reader.
    WriteBroken,
    /// The Receiver wants the mailbox displayed.
    DrainRequest,
    /// The Sender is ending the session.
    ShutdownRequest,
}

impl Trigger {
    /// Every trigger kind.
    pub const ALL: [Self; 5] = [
        Self::UserInterrupt,
        Self::PeerChannelClosed,
        Self::WriteBroken,
        Self::DrainRequest,
        Self::ShutdownRequest,
    ];

    /// Signal that carries this trigger.
    #[must_use]
    pub fn signal(self) -> Signal {
        match self {
            Self::UserInterrupt => Signal::SIGINT,
            Self::PeerChannelClosed => Signal::SIGUSR2,
            Self::WriteBroken => Signal::SIGPIPE,
            Self::DrainRequest => Signal::SIGUSR1,
            Self::ShutdownRequest => Signal::SIGTERM,
        }
    }

    /// Trigger carried by `signal`, if any.
    #[must_use]
    pub fn from_signal(signal: Signal) -> Option<Self> {
        Self::ALL.into_iter().find(|trigger| trigger.signal() == signal)
    }

    fn index(self) -> usize {
        match self {
            Self::UserInterrupt => 0,
            Self::PeerChannelClosed => 1,
            Self::WriteBroken => 2,
            Self::DrainRequest => 3,
            Self::ShutdownRequest => 4,
        }
    }
}

/// Why [`ControlPlane::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// The watched descriptor is readable, hung up, or in error.
    Input,
    /// A trigger may have been raised; check the flags.
    Trigger,
    /// The timeout elapsed.
    Timeout,
}

/// Which half of the session a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Reads local input and owns the outbound channel.
    Sender,
    /// Owns the inbound channel.
    Receiver,
}

impl Role {
    /// Triggers this role listens for.
    #[must_use]
    pub fn triggers(self) -> &'static [Trigger] {
        match self {
            Self::Sender => &[
                Trigger::UserInterrupt,
                Trigger::PeerChannelClosed,
                Trigger::WriteBroken,
                Trigger::DrainRequest,
            ],
            Self::Receiver => &[Trigger::ShutdownRequest],
        }
    }
}

/// Per-process trigger flags plus the wake-up socket.
#[derive(Debug)]
pub struct ControlPlane {
    flags: [Arc<AtomicBool>; 5],
    wake_rx: UnixStream,
    wake_tx: UnixStream,
    hooks: Vec<SigId>,
}

impl ControlPlane {
    /// Flags and wake-up socket without any signal hooked up.
    ///
    /// Triggers can still be raised locally with [`ControlPlane::raise`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the wake-up socket cannot be created.
    pub fn detached() -> Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()
            .map_err(|err| AppError::Process(format!("cannot create wake socket: {err}")))?;
        for end in [&wake_rx, &wake_tx] {
            end.set_nonblocking(true).map_err(|err| {
                AppError::Process(format!("cannot make wake socket non-blocking: {err}"))
            })?;
        }

        Ok(Self {
            flags: Default::default(),
            wake_rx,
            wake_tx,
            hooks: Vec::new(),
        })
    }

    /// Hook the signals of `role` to this plane.
    ///
    /// The Receiver additionally ignores `SIGINT`, which the terminal sends
    /// to the whole foreground process group.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if a handler cannot be registered.
    pub fn install(role: Role) -> Result<Self> {
        let mut plane = Self::detached()?;

        for trigger in role.triggers() {
            let signal = trigger.signal() as i32;
            let flag_id =
                signal_hook::flag::register(signal, Arc::clone(&plane.flags[trigger.index()]))
                    .map_err(|err| hook_error(*trigger, &err))?;
            plane.hooks.push(flag_id);

            let tx = plane
                .wake_tx
                .try_clone()
                .map_err(|err| hook_error(*trigger, &err))?;
            let wake_id = pipe::register(signal, tx).map_err(|err| hook_error(*trigger, &err))?;
            plane.hooks.push(wake_id);
        }

        if role == Role::Receiver {
            ignore_interrupt()?;
        }

        debug!(?role, "control plane installed");
        Ok(plane)
    }

    /// Raise `trigger` from inside this process.
    pub fn raise(&self, trigger: Trigger) {
        self.flags[trigger.index()].store(true, Ordering::SeqCst);
        match (&self.wake_tx).write(&[1]) {
            Ok(_) => {}
            // A full socket already guarantees a pending wake-up.
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => warn!(%err, "failed to write wake byte"),
        }
    }

    /// Clear `trigger` and report whether it was raised.
    #[must_use]
    pub fn take(&self, trigger: Trigger) -> bool {
        self.flags[trigger.index()].swap(false, Ordering::SeqCst)
    }

    /// Whether `trigger` is raised, without clearing it.
    #[must_use]
    pub fn is_raised(&self, trigger: Trigger) -> bool {
        self.flags[trigger.index()].load(Ordering::SeqCst)
    }

    /// Descriptor that becomes readable whenever a trigger is raised.
    #[must_use]
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.wake_rx.as_fd()
    }

    /// Discard pending wake-up bytes.
    pub fn clear_wake(&self) {
        let mut buf = [0_u8; 64];
        loop {
            match (&self.wake_rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(%err, "failed to clear wake socket");
                    break;
                }
            }
        }
    }

    /// Block until `fd` (if given) is ready, a trigger is raised, or
    /// `timeout` elapses. `None` waits indefinitely.
    ///
    /// A trigger takes precedence over input when both are ready; the wake
    /// socket is cleared before returning [`Wakeup::Trigger`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if `poll` fails for a reason other than
    /// an interrupting signal.
    pub fn wait(&self, fd: Option<BorrowedFd<'_>>, timeout: Option<Duration>) -> Result<Wakeup> {
        let timeout = timeout.map_or(PollTimeout::NONE, |limit| {
            PollTimeout::from(u16::try_from(limit.as_millis()).unwrap_or(u16::MAX))
        });

        let mut fds = vec![PollFd::new(self.wake_fd(), PollFlags::POLLIN)];
        if let Some(fd) = fd {
            fds.push(PollFd::new(fd, PollFlags::POLLIN));
        }

        match poll(&mut fds, timeout) {
            Ok(0) => return Ok(Wakeup::Timeout),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Wakeup::Trigger),
            Err(errno) => return Err(AppError::Transport(format!("poll failed: {errno}"))),
        }

        let ready = |pfd: &PollFd<'_>| {
            pfd.revents().is_some_and(|events| {
                events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
            })
        };

        if ready(&fds[0]) {
            self.clear_wake();
            return Ok(Wakeup::Trigger);
        }
        if fds.get(1).is_some_and(ready) {
            return Ok(Wakeup::Input);
        }
        Ok(Wakeup::Timeout)
    }

    /// Deliver `trigger` to process `pid`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if `kill` fails (for instance because the
    /// process is already gone).
    pub fn notify(pid: Pid, trigger: Trigger) -> Result<()> {
        debug!(%pid, ?trigger, "sending trigger");
        kill(pid, trigger.signal())
            .map_err(|errno| AppError::Process(format!("cannot signal {pid}: {errno}")))
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        for id in self.hooks.drain(..) {
            unregister(id);
        }
    }
}

fn hook_error(trigger: Trigger, err: &std::io::Error) -> AppError {
    AppError::Process(format!("cannot hook {trigger:?}: {err}"))
}

#[allow(unsafe_code)]
fn ignore_interrupt() -> Result<()> {
    use nix::sys::signal::{signal, SigHandler};

    // SAFETY: SIG_IGN installs no handler code, so there is nothing to be
    // async-signal-safe about.
    unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) }
        .map(drop)
        .map_err(|errno| AppError::Process(format!("cannot ignore SIGINT: {errno}")))
}
