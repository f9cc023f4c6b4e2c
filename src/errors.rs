//! Error types shared across the chat session.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Why an endpoint identifier was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierIssue {
    /// Longer than the 30-byte limit.
    TooLong,
    /// Empty, `.`, `..`, or contains a forbidden character.
    Forbidden,
}

/// Application error enumeration covering all session failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Nickname rejected by validation.
    InvalidIdentifier(IdentifierIssue, String),
    /// A named pipe could not be created or opened.
    ChannelOpen(String),
    /// Fatal read or write failure on an open channel.
    Transport(String),
    /// The other end of a channel has gone away.
    PeerDisconnected(String),
    /// Shared-memory mailbox setup or mapping failure.
    Mailbox(String),
    /// Process split, signal installation or signal delivery failure.
    Process(String),
    /// Best-effort teardown step failed.
    Cleanup(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidIdentifier(_, msg) => write!(f, "invalid identifier: {msg}"),
            Self::ChannelOpen(msg) => write!(f, "channel open: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::PeerDisconnected(msg) => write!(f, "peer disconnected: {msg}"),
            Self::Mailbox(msg) => write!(f, "mailbox: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Cleanup(msg) => write!(f, "cleanup: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl AppError {
    /// Process exit status reported for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidIdentifier(IdentifierIssue::TooLong, _) => 2,
            Self::InvalidIdentifier(IdentifierIssue::Forbidden, _) => 3,
            _ => 1,
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
