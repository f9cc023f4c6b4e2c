//! Unit tests for terminal presentation.

use pipechat::identity::EndpointId;
use pipechat::presentation::{ModeFlags, Notice, Presentation, TerminalPresenter};

fn id(raw: &str) -> EndpointId {
    EndpointId::parse(raw).expect("valid nickname")
}

fn presenter(flags: ModeFlags) -> TerminalPresenter {
    TerminalPresenter::new(id("alice"), flags, "exit")
}

const BOT: ModeFlags = ModeFlags {
    bot: true,
    manual: false,
    joli: false,
};

const JOLI: ModeFlags = ModeFlags {
    bot: false,
    manual: false,
    joli: true,
};

#[test]
fn bot_mode_prints_plain_tagged_lines() {
    let out = presenter(BOT).message(&id("bob"), b"hi\n");
    assert_eq!(out, "[bob] hi\n");
}

#[test]
fn missing_newline_is_added() {
    let out = presenter(BOT).message(&id("bob"), b"no newline");
    assert_eq!(out, "[bob] no newline\n");
}

#[test]
fn default_mode_underlines_the_speaker() {
    let out = presenter(ModeFlags::default()).message(&id("bob"), b"hi\n");
    assert_eq!(out, "[\x1B[4mbob\x1B[0m] hi\n");
}

#[test]
fn bot_mode_has_no_echo_prompt_or_bell() {
    let p = presenter(BOT);
    assert_eq!(p.echo(b"hi\n"), None);
    assert_eq!(p.prompt(), None);
    assert_eq!(p.buffered(), None);
}

#[test]
fn default_mode_echoes_and_rings() {
    let p = presenter(ModeFlags::default());
    let echo = p.echo(b"hi\n").expect("echo");
    assert!(echo.contains("alice"));
    assert!(echo.ends_with("hi\n"));
    assert_eq!(p.prompt(), None);
    assert_eq!(p.buffered().as_deref(), Some("\x07"));
}

#[test]
fn joli_mode_prompts_with_the_quit_command() {
    let prompt = presenter(JOLI).prompt().expect("prompt");
    assert_eq!(prompt, "alice, enter your message (type 'exit' to quit): ");
}

#[test]
fn joli_mode_colours_each_side_differently() {
    let p = presenter(JOLI);
    let peer = p.message(&id("bob"), b"hi\n");
    let local = p.echo(b"yo\n").expect("echo");

    assert!(peer.contains("\x1B[93m"), "peer in yellow: {peer:?}");
    assert!(local.contains("\x1B[96m"), "local in cyan: {local:?}");
    assert!(local.starts_with("\x1B[A"), "echo replaces the typed line");
    assert!(peer.ends_with("(type 'exit' to quit): "), "prompt restored");
}

#[test]
fn notices_name_the_disconnect() {
    let p = presenter(ModeFlags::default());
    assert_eq!(
        p.notice(Notice::PeerDisconnected),
        "Connection closed by the other user.\n"
    );
    assert!(p
        .notice(Notice::LocalDisconnected)
        .contains("User disconnected."));
    assert_eq!(
        presenter(BOT).notice(Notice::LocalDisconnected),
        "User disconnected.\n"
    );
}

#[test]
fn invalid_utf8_is_rendered_lossily() {
    let out = presenter(BOT).message(&id("bob"), &[0x66, 0xFF, b'\n']);
    assert_eq!(out, "[bob] f\u{FFFD}\n");
}
