//! Role state machines.
//!
//! The transitions are pure so the role loops stay thin: a loop turns what
//! it observed into an event, asks for the next state, and performs the
//! side effects the new state implies.

use crate::control::Trigger;
use crate::session::SessionExit;

/// Something the Sender loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderEvent {
    /// A control trigger flag was set.
    Trigger(Trigger),
    /// Local input reached end of file.
    LocalEof,
    /// The user typed the quit command.
    QuitCommand,
    /// A requested mailbox drain has been displayed.
    DrainComplete,
    /// The outbound channel failed with a non-recoverable error.
    TransportFailure,
    /// The Receiver has been reaped and resources released.
    ShutdownComplete,
}

/// Sender lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Forwarding local input.
    Running,
    /// Displaying the mailbox before resuming.
    Draining,
    /// Closing down with the given outcome.
    ShuttingDown(SessionExit),
    /// Done.
    Terminated(SessionExit),
}

impl SenderState {
    /// State after `event`.
    ///
    /// `manual` says whether a mailbox exists; `opened` whether the outbound
    /// channel has been opened at least once.
    #[must_use]
    pub fn next(self, event: SenderEvent, manual: bool, opened: bool) -> Self {
        match (self, event) {
            (Self::ShuttingDown(exit), SenderEvent::ShutdownComplete) => Self::Terminated(exit),
            (state @ (Self::ShuttingDown(_) | Self::Terminated(_)), _) => state,

            (Self::Draining, SenderEvent::DrainComplete) => Self::Running,

            (_, SenderEvent::LocalEof | SenderEvent::QuitCommand) => {
                Self::ShuttingDown(SessionExit::Normal)
            }
            (_, SenderEvent::TransportFailure) => Self::ShuttingDown(SessionExit::Failure),

            (_, SenderEvent::Trigger(Trigger::UserInterrupt)) if !opened => {
                Self::ShuttingDown(SessionExit::InterruptedBeforeOpen)
            }
            (_, SenderEvent::Trigger(Trigger::UserInterrupt)) if manual => Self::Draining,
            (_, SenderEvent::Trigger(Trigger::UserInterrupt)) => {
                Self::ShuttingDown(SessionExit::Normal)
            }

            (state, SenderEvent::Trigger(Trigger::PeerChannelClosed)) if manual => state,
            (_, SenderEvent::Trigger(Trigger::PeerChannelClosed)) => {
                Self::ShuttingDown(SessionExit::PeerDisconnected)
            }

            (_, SenderEvent::Trigger(Trigger::WriteBroken)) if manual => {
                Self::ShuttingDown(SessionExit::Normal)
            }
            (_, SenderEvent::Trigger(Trigger::WriteBroken)) => {
                Self::ShuttingDown(SessionExit::PeerDisconnected)
            }

            (_, SenderEvent::Trigger(Trigger::DrainRequest)) if manual => Self::Draining,

            (state, _) => state,
        }
    }

    /// Exit outcome once shutting down or terminated.
    #[must_use]
    pub fn exit(self) -> Option<SessionExit> {
        match self {
            Self::ShuttingDown(exit) | Self::Terminated(exit) => Some(exit),
            Self::Running | Self::Draining => None,
        }
    }
}

/// Something the Receiver loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// The Sender asked the Receiver to stop.
    ShutdownRequest,
    /// A blocking wait or read returned.
    ReadReturned,
    /// The inbound channel reported end of stream.
    ChannelClosed,
    /// The inbound channel failed.
    ReadFailed,
}

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Waiting for inbound messages.
    Listening,
    /// Stop requested; leaves at the next point where no read is pending.
    Stopping,
    /// Done.
    Terminated,
}

impl ReceiverState {
    /// State after `event`.
    #[must_use]
    pub fn next(self, event: ReceiverEvent) -> Self {
        match (self, event) {
            (Self::Terminated, _)
            | (_, ReceiverEvent::ChannelClosed | ReceiverEvent::ReadFailed)
            | (Self::Stopping, ReceiverEvent::ReadReturned) => Self::Terminated,
            (_, ReceiverEvent::ShutdownRequest) => Self::Stopping,
            (Self::Listening, ReceiverEvent::ReadReturned) => Self::Listening,
        }
    }
}
