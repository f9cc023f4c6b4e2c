//! Session supervisor: sets up shared resources, splits the process into the
//! Sender and Receiver roles, and tears everything down exactly once.
//!
//! ```text
//!            create pipes (+ mailbox)
//!                      |
//!                    fork
//!          +-----------+-----------+
//!       parent                   child
//!       Sender                   Receiver
//!   stdin -> outbound      inbound -> stdout / mailbox
//!          <---- DrainRequest, PeerChannelClosed
//!          ----> ShutdownRequest
//!       reap child
//!       teardown
//! ```

mod input;
pub mod receiver;
pub mod sender;
mod state;

use std::io::{self, Write};

use nix::unistd::{getppid, ForkResult};
use tracing::{debug, info, warn};

use crate::channel::ChannelPair;
use crate::config::ChatConfig;
use crate::control::{ControlPlane, Role};
use crate::identity::EndpointId;
use crate::mailbox::Mailbox;
use crate::presentation::{ModeFlags, Presentation, TerminalPresenter};
use crate::{AppError, Result};

pub use input::LineReader;
pub use state::{ReceiverEvent, ReceiverState, SenderEvent, SenderState};

/// How a session ended, as seen by the user's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Normal close: local end of input, quit command, or interrupt after
    /// the channel was open.
    Normal,
    /// Startup or fatal transport failure.
    Failure,
    /// Interrupted before the outbound channel was ever opened.
    InterruptedBeforeOpen,
    /// The peer disconnected while in direct mode.
    PeerDisconnected,
}

impl SessionExit {
    /// Process exit status.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Failure => 1,
            Self::InterruptedBeforeOpen => 4,
            Self::PeerDisconnected => 5,
        }
    }
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The local nickname.
    pub local: EndpointId,
    /// The peer's nickname.
    pub peer: EndpointId,
    /// Command-line mode switches.
    pub flags: ModeFlags,
    /// File/default configuration.
    pub chat: ChatConfig,
}

impl SessionConfig {
    /// Shared-memory object name for this ordered pair.
    ///
    /// The nicknames are joined with `-`, which a nickname cannot contain.
    #[must_use]
    pub fn mailbox_name(&self) -> String {
        format!("{}{}-{}", self.chat.shm_prefix, self.local, self.peer)
    }
}

/// State shared by both role loops, owned by the supervisor.
pub struct SessionContext {
    /// The local nickname.
    pub local: EndpointId,
    /// The peer's nickname.
    pub peer: EndpointId,
    /// Command-line mode switches.
    pub flags: ModeFlags,
    /// File/default configuration.
    pub config: ChatConfig,
    /// The two FIFO paths.
    pub channels: ChannelPair,
    /// Present only in manual mode.
    pub mailbox: Option<Mailbox>,
    /// Output formatting.
    pub presenter: Box<dyn Presentation>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("flags", &self.flags)
            .field("channels", &self.channels)
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Whether inbound messages are deferred to the mailbox.
    #[must_use]
    pub fn manual(&self) -> bool {
        self.mailbox.is_some()
    }

    /// Print `text` to stdout immediately.
    pub fn emit(&self, text: &str) {
        emit(text);
    }

    /// Drain the mailbox (if any) and print its frames as peer messages.
    ///
    /// Returns the number of frames shown.
    #[must_use]
    pub fn display_mailbox(&self) -> usize {
        let Some(mailbox) = &self.mailbox else {
            return 0;
        };
        let frames = mailbox.drain();
        for frame in &frames {
            emit(&self.presenter.message(&self.peer, frame.as_bytes()));
        }
        frames.len()
    }
}

/// Removes the session's persisted objects exactly once.
///
/// Runs on [`Teardown::run`] or on drop, whichever comes first. A disarmed
/// teardown (the Receiver's inherited copy) never touches the filesystem.
#[derive(Debug)]
pub struct Teardown {
    channels: ChannelPair,
    mailbox_name: Option<String>,
    done: bool,
}

impl Teardown {
    /// Teardown for `channels` and the optional named mailbox.
    #[must_use]
    pub fn new(channels: ChannelPair, mailbox_name: Option<String>) -> Self {
        Self {
            channels,
            mailbox_name,
            done: false,
        }
    }

    /// Unlink the pipes and the mailbox. Later calls do nothing.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn run(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        if let Err(err) = self.channels.remove() {
            warn!(%err, "pipe cleanup incomplete");
        }
        if let Some(name) = &self.mailbox_name {
            if let Err(err) = Mailbox::remove(name) {
                warn!(%err, "mailbox cleanup incomplete");
            }
        }
        debug!("session resources released");
    }

    /// Prevent this value from ever cleaning up.
    pub fn disarm(&mut self) {
        self.done = true;
    }

    /// Whether cleanup already ran (or was disarmed).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

/// Runs one chat session from setup to teardown.
pub struct Supervisor {
    config: SessionConfig,
    presenter: Box<dyn Presentation>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Supervisor using the terminal presenter.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let presenter = TerminalPresenter::new(
            config.local.clone(),
            config.flags,
            config.chat.quit_command.clone(),
        );
        Self::with_presenter(config, Box::new(presenter))
    }

    /// Supervisor with a custom presentation collaborator.
    #[must_use]
    pub fn with_presenter(config: SessionConfig, presenter: Box<dyn Presentation>) -> Self {
        Self { config, presenter }
    }

    /// Run the session. Returns in both processes after the split: the
    /// Sender's result is the user-visible one.
    ///
    /// Must be called while the process is single-threaded.
    ///
    /// # Errors
    ///
    /// - `AppError::ChannelOpen` if the pipes cannot be created.
    /// - `AppError::Mailbox` if the manual-mode mailbox cannot be created.
    /// - `AppError::Process` if signal hooks cannot be installed or `fork`
    ///   fails.
    pub fn run(self) -> Result<SessionExit> {
        let Self { config, presenter } = self;
        let channels = ChannelPair::new(&config.chat.base_dir, &config.local, &config.peer);
        channels.create()?;

        let mailbox_name = config.flags.manual.then(|| config.mailbox_name());
        let mut teardown = Teardown::new(channels.clone(), mailbox_name.clone());

        let mailbox = match &mailbox_name {
            Some(name) => Some(Mailbox::create(
                name,
                config.chat.mailbox_capacity(),
                config.chat.mailbox_watermark,
            )?),
            None => None,
        };

        let ctx = SessionContext {
            local: config.local,
            peer: config.peer,
            flags: config.flags,
            config: config.chat,
            channels,
            mailbox,
            presenter,
        };

        // Installed before the split so an early trigger from the child can
        // never hit the default (terminating) disposition.
        let sender_plane = ControlPlane::install(Role::Sender)?;

        io::stdout()
            .flush()
            .map_err(|err| AppError::Io(format!("cannot flush stdout: {err}")))?;

        info!(local = %ctx.local, peer = %ctx.peer, manual = ctx.manual(), "starting session");

        match split()? {
            ForkResult::Child => {
                teardown.disarm();
                drop(sender_plane);
                let plane = ControlPlane::install(Role::Receiver)?;
                Ok(receiver::run(&ctx, &plane, getppid()))
            }
            ForkResult::Parent { child } => {
                debug!(%child, "receiver started");
                let exit = sender::run(&ctx, &sender_plane, child);
                teardown.run();
                info!(code = exit.code(), "session finished");
                Ok(exit)
            }
        }
    }
}

/// Print `text` to stdout immediately, ignoring a closed terminal.
pub(crate) fn emit(text: &str) {
    let mut out = io::stdout().lock();
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        debug!(%err, "stdout write failed");
    }
}

#[allow(unsafe_code)]
fn split() -> Result<ForkResult> {
    // SAFETY: the supervisor runs before any thread is spawned, so the child
    // starts with a consistent copy of every lock and allocator state.
    unsafe { nix::unistd::fork() }
        .map_err(|errno| AppError::Process(format!("fork failed: {errno}")))
}
