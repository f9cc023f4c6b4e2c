//! Unit tests for the Sender and Receiver state machines.

use pipechat::control::Trigger;
use pipechat::session::{ReceiverEvent, ReceiverState, SenderEvent, SenderState, SessionExit};

const DIRECT: bool = false;
const MANUAL: bool = true;
const OPENED: bool = true;
const NOT_OPENED: bool = false;

fn trigger(t: Trigger) -> SenderEvent {
    SenderEvent::Trigger(t)
}

#[test]
fn interrupt_in_manual_mode_drains_and_resumes() {
    let state = SenderState::Running.next(trigger(Trigger::UserInterrupt), MANUAL, OPENED);
    assert_eq!(state, SenderState::Draining);
    assert_eq!(state.exit(), None);

    let state = state.next(SenderEvent::DrainComplete, MANUAL, OPENED);
    assert_eq!(state, SenderState::Running);
}

#[test]
fn interrupt_in_direct_mode_shuts_down_normally() {
    let state = SenderState::Running.next(trigger(Trigger::UserInterrupt), DIRECT, OPENED);
    assert_eq!(state, SenderState::ShuttingDown(SessionExit::Normal));
}

#[test]
fn interrupt_before_open_has_its_own_outcome() {
    for manual in [DIRECT, MANUAL] {
        let state = SenderState::Running.next(trigger(Trigger::UserInterrupt), manual, NOT_OPENED);
        assert_eq!(
            state,
            SenderState::ShuttingDown(SessionExit::InterruptedBeforeOpen)
        );
    }
}

#[test]
fn local_end_of_input_and_quit_shut_down_normally() {
    for event in [SenderEvent::LocalEof, SenderEvent::QuitCommand] {
        for manual in [DIRECT, MANUAL] {
            let state = SenderState::Running.next(event, manual, OPENED);
            assert_eq!(state, SenderState::ShuttingDown(SessionExit::Normal));
        }
    }
}

#[test]
fn peer_close_ends_direct_sessions_only() {
    let direct = SenderState::Running.next(trigger(Trigger::PeerChannelClosed), DIRECT, OPENED);
    assert_eq!(
        direct,
        SenderState::ShuttingDown(SessionExit::PeerDisconnected)
    );

    let manual = SenderState::Running.next(trigger(Trigger::PeerChannelClosed), MANUAL, OPENED);
    assert_eq!(manual, SenderState::Running);
}

#[test]
fn broken_write_outcome_depends_on_mode() {
    let direct = SenderState::Running.next(trigger(Trigger::WriteBroken), DIRECT, OPENED);
    assert_eq!(
        direct,
        SenderState::ShuttingDown(SessionExit::PeerDisconnected)
    );

    let manual = SenderState::Running.next(trigger(Trigger::WriteBroken), MANUAL, OPENED);
    assert_eq!(manual, SenderState::ShuttingDown(SessionExit::Normal));
}

#[test]
fn drain_request_only_matters_with_a_mailbox() {
    assert_eq!(
        SenderState::Running.next(trigger(Trigger::DrainRequest), MANUAL, OPENED),
        SenderState::Draining
    );
    assert_eq!(
        SenderState::Running.next(trigger(Trigger::DrainRequest), DIRECT, OPENED),
        SenderState::Running
    );
}

#[test]
fn transport_failure_is_a_failure_exit() {
    let state = SenderState::Running.next(SenderEvent::TransportFailure, DIRECT, OPENED);
    assert_eq!(state.exit(), Some(SessionExit::Failure));
}

#[test]
fn shutting_down_only_completes_on_shutdown_complete() {
    let state = SenderState::ShuttingDown(SessionExit::PeerDisconnected);
    assert_eq!(state.next(SenderEvent::LocalEof, DIRECT, OPENED), state);
    assert_eq!(
        state.next(trigger(Trigger::UserInterrupt), MANUAL, OPENED),
        state
    );

    let done = state.next(SenderEvent::ShutdownComplete, DIRECT, OPENED);
    assert_eq!(done, SenderState::Terminated(SessionExit::PeerDisconnected));
    assert_eq!(done.exit(), Some(SessionExit::PeerDisconnected));
    assert_eq!(done.next(SenderEvent::QuitCommand, DIRECT, OPENED), done);
}

#[test]
fn shutdown_complete_is_ignored_while_running() {
    assert_eq!(
        SenderState::Running.next(SenderEvent::ShutdownComplete, DIRECT, OPENED),
        SenderState::Running
    );
}

#[test]
fn receiver_stops_after_the_current_read() {
    let state = ReceiverState::Listening.next(ReceiverEvent::ShutdownRequest);
    assert_eq!(state, ReceiverState::Stopping);
    assert_eq!(
        state.next(ReceiverEvent::ReadReturned),
        ReceiverState::Terminated
    );
}

#[test]
fn receiver_keeps_listening_between_frames() {
    assert_eq!(
        ReceiverState::Listening.next(ReceiverEvent::ReadReturned),
        ReceiverState::Listening
    );
}

#[test]
fn closed_or_failed_channel_terminates_directly() {
    for event in [ReceiverEvent::ChannelClosed, ReceiverEvent::ReadFailed] {
        assert_eq!(
            ReceiverState::Listening.next(event),
            ReceiverState::Terminated
        );
        assert_eq!(ReceiverState::Stopping.next(event), ReceiverState::Terminated);
    }
}

#[test]
fn terminated_receiver_stays_terminated() {
    assert_eq!(
        ReceiverState::Terminated.next(ReceiverEvent::ShutdownRequest),
        ReceiverState::Terminated
    );
}

#[test]
fn exit_codes_match_the_documented_table() {
    assert_eq!(SessionExit::Normal.code(), 0);
    assert_eq!(SessionExit::Failure.code(), 1);
    assert_eq!(SessionExit::InterruptedBeforeOpen.code(), 4);
    assert_eq!(SessionExit::PeerDisconnected.code(), 5);
}
