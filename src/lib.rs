//! Two-party terminal chat over named pipes.
//!
//! Each endpoint runs as two processes: a Sender forwarding local input to an
//! outbound FIFO and a Receiver reading the peer's FIFO. Control triggers
//! travel between them as signals, and manual mode defers inbound messages to
//! a shared-memory mailbox.

pub mod channel;
pub mod config;
pub mod control;
pub mod errors;
pub mod identity;
pub mod mailbox;
pub mod presentation;
pub mod session;

pub use config::ChatConfig;
pub use errors::{AppError, Result};
