//! Terminal presentation of chat traffic.
//!
//! The session engine hands over a speaker and raw payload bytes; everything
//! that turns them into terminal output (ANSI styling, bot-mode plain lines,
//! local echo suppression, prompts and bells) lives here.

use crate::identity::EndpointId;

const UNDERLINE: &str = "\x1B[4m";
const NO_UNDERLINE: &str = "\x1B[24m";
const RESET: &str = "\x1B[0m";
const YELLOW: &str = "\x1B[33m";
const BRIGHT_YELLOW: &str = "\x1B[93m";
const BRIGHT_CYAN: &str = "\x1B[96m";
const CLEAR_LINE: &str = "\x1B[2K\r";
const CURSOR_UP: &str = "\x1B[A";
const BELL: &str = "\x07";

/// Mode switches chosen on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModeFlags {
    /// Plain `[nick] text` output and no local echo.
    pub bot: bool,
    /// Buffer inbound messages in the mailbox instead of printing them.
    pub manual: bool,
    /// Coloured output with an input prompt.
    pub joli: bool,
}

/// Session events the user is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The other side ended the conversation.
    PeerDisconnected,
    /// The local user interrupted the session.
    LocalDisconnected,
}

/// Formats chat output. Implementations return text; the caller prints it.
pub trait Presentation {
    /// A message spoken by `speaker`.
    fn message(&self, speaker: &EndpointId, payload: &[u8]) -> String;

    /// Echo of a line the local user just sent, if it should be shown.
    fn echo(&self, payload: &[u8]) -> Option<String>;

    /// Input prompt shown before reading a line, if any.
    fn prompt(&self) -> Option<String>;

    /// Cue emitted when a message is buffered instead of displayed.
    fn buffered(&self) -> Option<String>;

    /// A session notice.
    fn notice(&self, notice: Notice) -> String;
}

/// ANSI terminal presentation matching the classic chat layout.
#[derive(Debug, Clone)]
pub struct TerminalPresenter {
    local: EndpointId,
    flags: ModeFlags,
    quit_command: String,
}

impl TerminalPresenter {
    /// Presenter for a session run by `local`.
    #[must_use]
    pub fn new(local: EndpointId, flags: ModeFlags, quit_command: impl Into<String>) -> Self {
        Self {
            local,
            flags,
            quit_command: quit_command.into(),
        }
    }

    fn line(&self, speaker: &EndpointId, payload: &[u8]) -> String {
        let mut text = String::from_utf8_lossy(payload).into_owned();
        if !text.ends_with('\n') {
            text.push('\n');
        }

        if self.flags.bot {
            return format!("[{speaker}] {text}");
        }
        if !self.flags.joli {
            return format!("[{UNDERLINE}{speaker}{RESET}] {text}");
        }

        if speaker == &self.local {
            format!("{CURSOR_UP}{CLEAR_LINE}{BRIGHT_CYAN}[{UNDERLINE}{speaker}{NO_UNDERLINE}]{RESET} {text}")
        } else {
            format!("{CLEAR_LINE}{BRIGHT_YELLOW}[{UNDERLINE}{speaker}{NO_UNDERLINE}]{RESET} {text}")
        }
    }
}

impl Presentation for TerminalPresenter {
    fn message(&self, speaker: &EndpointId, payload: &[u8]) -> String {
        let mut out = self.line(speaker, payload);
        if self.flags.joli && speaker != &self.local {
            if let Some(prompt) = self.prompt() {
                out.push_str(&prompt);
            }
        }
        out
    }

    fn echo(&self, payload: &[u8]) -> Option<String> {
        (!self.flags.bot).then(|| self.line(&self.local, payload))
    }

    fn prompt(&self) -> Option<String> {
        self.flags.joli.then(|| {
            format!(
                "{}, enter your message (type '{}' to quit): ",
                self.local, self.quit_command
            )
        })
    }

    fn buffered(&self) -> Option<String> {
        (!self.flags.bot).then(|| BELL.to_owned())
    }

    fn notice(&self, notice: Notice) -> String {
        let prefix = if self.flags.joli { CLEAR_LINE } else { "" };
        match notice {
            Notice::PeerDisconnected => {
                format!("{prefix}Connection closed by the other user.\n")
            }
            Notice::LocalDisconnected if self.flags.bot => "User disconnected.\n".to_owned(),
            Notice::LocalDisconnected => {
                format!("{prefix}\n{YELLOW}WARNING{RESET} User disconnected.\n")
            }
        }
    }
}
