//! Unit tests for frame encoding and the FIFO-backed channels.

use std::thread;
use std::time::Duration;

use pipechat::channel::transport::{
    read_frame, write_frame, Frame, InboundChannel, OutboundChannel, Received, MAX_PAYLOAD,
};
use pipechat::channel::ChannelPair;
use pipechat::identity::EndpointId;
use pipechat::AppError;

fn pair(dir: &std::path::Path) -> ChannelPair {
    let local = EndpointId::parse("alice").expect("alice");
    let peer = EndpointId::parse("bob").expect("bob");
    let pair = ChannelPair::new(dir, &local, &peer);
    pair.create().expect("create fifos");
    pair
}

fn open_outbound(path: &std::path::Path) -> OutboundChannel {
    OutboundChannel::open(path, Duration::from_millis(5)).expect("open outbound")
}

fn expect_frame(received: Received) -> Frame {
    match received {
        Received::Frame(frame) => frame,
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[test]
fn write_frame_appends_the_terminator() {
    let mut sink = Vec::new();
    let written = write_frame(&mut sink, b"hi\n").expect("write");
    assert_eq!(written, 4);
    assert_eq!(sink, b"hi\n\0");
}

#[test]
fn write_frame_rejects_oversized_payloads() {
    let mut sink = Vec::new();
    let err = write_frame(&mut sink, &[b'a'; MAX_PAYLOAD + 1]).expect_err("too large");
    assert!(matches!(err, AppError::Transport(_)));
    assert!(sink.is_empty());

    assert!(write_frame(&mut sink, &[b'a'; MAX_PAYLOAD]).is_ok());
}

#[test]
fn write_frame_rejects_embedded_terminator() {
    let mut sink = Vec::new();
    let err = write_frame(&mut sink, b"a\0b").expect_err("embedded terminator");
    assert!(matches!(err, AppError::Transport(_)));
}

#[test]
fn read_frame_stops_at_each_terminator() {
    let mut wire: &[u8] = b"one\0two\0";
    assert_eq!(expect_frame(read_frame(&mut wire)), Frame::from("one"));
    assert_eq!(expect_frame(read_frame(&mut wire)), Frame::from("two"));
    assert!(matches!(read_frame(&mut wire), Received::Closed));
}

#[test]
fn partial_frame_at_end_of_stream_is_returned() {
    let mut wire: &[u8] = b"dangling";
    assert_eq!(expect_frame(read_frame(&mut wire)), Frame::from("dangling"));
    assert!(matches!(read_frame(&mut wire), Received::Closed));
}

#[test]
fn overlong_frame_is_truncated_without_losing_the_next() {
    let mut wire = vec![b'x'; 300];
    wire.push(0);
    wire.extend_from_slice(b"next\0");
    let mut reader = wire.as_slice();

    let first = expect_frame(read_frame(&mut reader));
    assert_eq!(first.len(), MAX_PAYLOAD);
    assert_eq!(expect_frame(read_frame(&mut reader)), Frame::from("next"));
}

#[test]
fn empty_payload_is_a_valid_frame() {
    let mut wire: &[u8] = b"\0";
    assert!(expect_frame(read_frame(&mut wire)).is_empty());
}

#[test]
fn try_open_without_reader_returns_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = pair(dir.path());
    assert!(OutboundChannel::try_open(pair.outbound())
        .expect("try_open")
        .is_none());
}

#[test]
fn try_open_on_missing_path_is_a_channel_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = OutboundChannel::try_open(&dir.path().join("absent.chat")).expect_err("missing");
    assert!(matches!(err, AppError::ChannelOpen(_)));
}

#[test]
fn payloads_round_trip_through_a_fifo() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = pair(dir.path());
    let path = pair.outbound().to_path_buf();

    let reader = thread::spawn(move || {
        let mut inbound = InboundChannel::open(&path).expect("open inbound");
        let mut received = Vec::new();
        loop {
            match inbound.receive_message() {
                Received::Frame(frame) => received.push(frame.into_bytes()),
                Received::Closed => break,
                Received::Error(err) => panic!("read failed: {err}"),
            }
        }
        received
    });

    let sent: Vec<Vec<u8>> = (1..MAX_PAYLOAD)
        .map(|len| (0..len).map(|i| b'a' + u8::try_from(i % 26).expect("small")).collect())
        .collect();

    let mut outbound = open_outbound(pair.outbound());
    for payload in &sent {
        let written = outbound.send(payload).expect("send");
        assert_eq!(written, payload.len() + 1);
    }
    drop(outbound);

    let received = reader.join().expect("reader thread");
    assert_eq!(received, sent);
}

#[test]
fn write_after_reader_closes_reports_peer_disconnected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = pair(dir.path());
    let path = pair.outbound().to_path_buf();

    let reader = thread::spawn(move || InboundChannel::open(&path).expect("open inbound"));
    let mut outbound = open_outbound(pair.outbound());
    drop(reader.join().expect("reader thread"));

    // SIGPIPE is ignored by the test harness, so the write sees EPIPE.
    let err = outbound.send(b"anyone?").expect_err("no reader");
    assert!(matches!(err, AppError::PeerDisconnected(_)));
}
