//! Receiver role: reads the inbound channel and either prints messages or
//! buffers them in the mailbox.

use std::os::fd::AsFd;

use nix::unistd::Pid;
use tracing::{debug, error, info_span, trace, warn};

use crate::channel::transport::{Frame, InboundChannel, Received};
use crate::control::{ControlPlane, Trigger, Wakeup};
use crate::session::{ReceiverEvent, ReceiverState, SessionContext, SessionExit};

/// Run the Receiver until the channel closes or the Sender asks it to stop.
pub(crate) fn run(ctx: &SessionContext, plane: &ControlPlane, sender: Pid) -> SessionExit {
    let span = info_span!("receiver", local = %ctx.local, peer = %ctx.peer);
    let _guard = span.enter();

    if plane.take(Trigger::ShutdownRequest) {
        debug!("stopped before the inbound channel was opened");
        return SessionExit::Normal;
    }

    let mut inbound = match InboundChannel::open(ctx.channels.inbound()) {
        Ok(inbound) => inbound,
        Err(err) => {
            error!(%err, "cannot open inbound channel");
            return SessionExit::Failure;
        }
    };

    let mut state = ReceiverState::Listening;
    loop {
        if plane.take(Trigger::ShutdownRequest) {
            state = state.next(ReceiverEvent::ShutdownRequest);
        }
        if state == ReceiverState::Stopping {
            // No read is in flight between polls.
            state = state.next(ReceiverEvent::ReadReturned);
        }
        if state == ReceiverState::Terminated {
            break;
        }

        match plane.wait(Some(inbound.as_fd()), None) {
            Ok(Wakeup::Input) => {}
            Ok(Wakeup::Trigger | Wakeup::Timeout) => continue,
            Err(err) => {
                error!(%err, "waiting for inbound data failed");
                state = state.next(ReceiverEvent::ReadFailed);
                continue;
            }
        }

        let event = match inbound.receive_message() {
            Received::Frame(frame) => {
                deliver(ctx, sender, &frame);
                ReceiverEvent::ReadReturned
            }
            Received::Closed => {
                peer_closed(ctx, plane, sender);
                ReceiverEvent::ChannelClosed
            }
            Received::Error(err) => {
                error!(%err, "inbound read failed");
                ReceiverEvent::ReadFailed
            }
        };
        state = state.next(event);
    }

    debug!("receiver finished");
    SessionExit::Normal
}

fn deliver(ctx: &SessionContext, sender: Pid, frame: &Frame) {
    trace!(len = frame.len(), "message received");

    let Some(mailbox) = &ctx.mailbox else {
        ctx.emit(&ctx.presenter.message(&ctx.peer, frame.as_bytes()));
        return;
    };

    let (forced, near_full) = {
        let mut guard = mailbox.lock();
        let forced = guard.append(frame.as_bytes());
        (forced, guard.near_full())
    };

    for earlier in &forced {
        ctx.emit(&ctx.presenter.message(&ctx.peer, earlier.as_bytes()));
    }
    if let Some(cue) = ctx.presenter.buffered() {
        ctx.emit(&cue);
    }
    if near_full {
        if let Err(err) = ControlPlane::notify(sender, Trigger::DrainRequest) {
            warn!(%err, "cannot request a mailbox drain");
        }
    }
}

fn peer_closed(ctx: &SessionContext, plane: &ControlPlane, sender: Pid) {
    debug!("inbound channel closed by peer");
    if ctx.manual() || plane.is_raised(Trigger::ShutdownRequest) {
        return;
    }
    if let Err(err) = ControlPlane::notify(sender, Trigger::PeerChannelClosed) {
        warn!(%err, "cannot report the closed channel");
    }
}
