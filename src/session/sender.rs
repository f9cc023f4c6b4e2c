//! Sender role: forwards local input to the outbound channel and acts on the
//! triggers raised against this process.

use std::fs::File;
use std::os::fd::AsFd;
use std::thread;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, error, info, info_span, trace, warn};

use crate::channel::transport::{poke, OutboundChannel};
use crate::control::{ControlPlane, Role, Trigger, Wakeup};
use crate::presentation::Notice;
use crate::session::{LineReader, SenderEvent, SenderState, SessionContext, SessionExit};
use crate::AppError;

/// Run the Sender until the session ends, then stop and reap the Receiver.
///
/// The returned outcome is the session's exit status.
pub(crate) fn run(ctx: &SessionContext, plane: &ControlPlane, receiver: Pid) -> SessionExit {
    let span = info_span!("sender", local = %ctx.local, peer = %ctx.peer);
    let _guard = span.enter();

    let mut sender = Sender {
        ctx,
        plane,
        state: SenderState::Running,
        outbound: None,
        opened: false,
    };

    match LineReader::stdin() {
        Ok(mut input) => sender.forward_input(&mut input),
        Err(err) => {
            error!(%err, "cannot read local input");
            sender.apply(SenderEvent::TransportFailure);
        }
    }

    sender.shut_down(receiver);
    sender.state.exit().unwrap_or(SessionExit::Failure)
}

struct Sender<'a> {
    ctx: &'a SessionContext,
    plane: &'a ControlPlane,
    state: SenderState,
    outbound: Option<OutboundChannel>,
    opened: bool,
}

impl Sender<'_> {
    fn apply(&mut self, event: SenderEvent) {
        let before = self.state;
        self.state = before.next(event, self.ctx.manual(), self.opened);
        if self.state != before {
            debug!(?event, ?before, after = ?self.state, "sender transition");
        }
    }

    fn running(&self) -> bool {
        self.state.exit().is_none()
    }

    fn forward_input(&mut self, input: &mut LineReader<File>) {
        let interval = self.ctx.config.open_poll_interval();

        while self.running() {
            self.handle_triggers();
            if !self.running() {
                break;
            }

            if self.outbound.is_none() {
                match OutboundChannel::try_open(self.ctx.channels.outbound()) {
                    Ok(Some(channel)) => {
                        info!("outbound channel connected");
                        self.outbound = Some(channel);
                        self.opened = true;
                        self.prompt();
                    }
                    Ok(None) => {
                        if let Err(err) = self.plane.wait(None, Some(interval)) {
                            error!(%err, "waiting for the peer failed");
                            self.apply(SenderEvent::TransportFailure);
                        }
                        continue;
                    }
                    Err(err) => {
                        error!(%err, "cannot open outbound channel");
                        self.apply(SenderEvent::TransportFailure);
                        continue;
                    }
                }
            }

            if let Some(line) = input.next_line() {
                self.forward(&line);
                continue;
            }
            if input.is_eof() {
                debug!("local input closed");
                self.apply(SenderEvent::LocalEof);
                continue;
            }

            match self.plane.wait(Some(input.as_fd()), None) {
                Ok(Wakeup::Input) => {
                    if let Err(err) = input.fill() {
                        error!(%err, "cannot read local input");
                        self.apply(SenderEvent::TransportFailure);
                    }
                }
                Ok(Wakeup::Trigger | Wakeup::Timeout) => {}
                Err(err) => {
                    error!(%err, "waiting for local input failed");
                    self.apply(SenderEvent::TransportFailure);
                }
            }
        }
    }

    fn handle_triggers(&mut self) {
        for &trigger in Role::Sender.triggers() {
            if !self.running() {
                return;
            }
            if !self.plane.take(trigger) {
                continue;
            }
            debug!(?trigger, "trigger observed");

            self.apply(SenderEvent::Trigger(trigger));
            match self.state {
                SenderState::Draining => {
                    let shown = self.ctx.display_mailbox();
                    trace!(shown, "mailbox drained");
                    self.apply(SenderEvent::DrainComplete);
                    self.prompt();
                }
                SenderState::ShuttingDown(_) => self.announce(trigger),
                SenderState::Running | SenderState::Terminated(_) => {}
            }
        }
    }

    fn announce(&self, trigger: Trigger) {
        let notice = match trigger {
            Trigger::UserInterrupt => Notice::LocalDisconnected,
            Trigger::PeerChannelClosed | Trigger::WriteBroken => Notice::PeerDisconnected,
            Trigger::DrainRequest | Trigger::ShutdownRequest => return,
        };
        self.ctx.emit(&self.ctx.presenter.notice(notice));
    }

    fn forward(&mut self, line: &[u8]) {
        if self.is_quit_command(line) {
            debug!("quit command entered");
            self.apply(SenderEvent::QuitCommand);
            return;
        }
        let Some(outbound) = self.outbound.as_mut() else {
            return;
        };

        match outbound.send(line) {
            Ok(written) => {
                trace!(written, "message sent");
                if let Some(echo) = self.ctx.presenter.echo(line) {
                    self.ctx.emit(&echo);
                }
                if self.ctx.manual() {
                    let shown = self.ctx.display_mailbox();
                    trace!(shown, "mailbox shown after send");
                }
                self.prompt();
            }
            Err(AppError::PeerDisconnected(reason)) => {
                debug!(%reason, "outbound channel has no reader");
                self.plane.raise(Trigger::WriteBroken);
            }
            Err(err) => {
                error!(%err, "send failed");
                self.apply(SenderEvent::TransportFailure);
            }
        }
    }

    fn is_quit_command(&self, line: &[u8]) -> bool {
        let text = line.strip_suffix(b"\n").unwrap_or(line);
        let text = text.strip_suffix(b"\r").unwrap_or(text);
        text == self.ctx.config.quit_command.as_bytes()
    }

    fn prompt(&self) {
        if let Some(prompt) = self.ctx.presenter.prompt() {
            self.ctx.emit(&prompt);
        }
    }

    fn shut_down(&mut self, receiver: Pid) {
        // Closing the write end lets the peer's Receiver see end of stream.
        self.outbound = None;

        if let Err(err) = ControlPlane::notify(receiver, Trigger::ShutdownRequest) {
            debug!(%err, "receiver already gone");
        }
        self.reap(receiver);

        let shown = self.ctx.display_mailbox();
        trace!(shown, "final mailbox drain");
        self.apply(SenderEvent::ShutdownComplete);
    }

    fn reap(&self, receiver: Pid) {
        let interval = self.ctx.config.open_poll_interval();
        loop {
            // Releases a Receiver still blocked opening its inbound FIFO.
            poke(self.ctx.channels.inbound());

            match waitpid(receiver, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => thread::sleep(interval),
                Ok(status) => {
                    debug!(?status, "receiver reaped");
                    return;
                }
                Err(errno) => {
                    warn!(%errno, "cannot reap receiver");
                    return;
                }
            }
        }
    }
}
