//! Unit tests for session teardown and per-session naming.

use std::path::PathBuf;

use pipechat::channel::ChannelPair;
use pipechat::identity::EndpointId;
use pipechat::mailbox::Mailbox;
use pipechat::presentation::ModeFlags;
use pipechat::session::{SessionConfig, Teardown};
use pipechat::ChatConfig;

fn id(raw: &str) -> EndpointId {
    EndpointId::parse(raw).expect("valid nickname")
}

fn created_pair(dir: &std::path::Path) -> ChannelPair {
    let pair = ChannelPair::new(dir, &id("alice"), &id("bob"));
    pair.create().expect("create fifos");
    pair
}

fn shm_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/dev/shm{name}"))
}

#[test]
fn run_removes_pipes_and_mailbox_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = created_pair(dir.path());
    let name = format!("/pipechat_teardown_{}", std::process::id());
    drop(Mailbox::create(&name, 64, 0).expect("mailbox"));

    let mut teardown = Teardown::new(pair.clone(), Some(name.clone()));
    assert!(!teardown.is_done());
    teardown.run();

    assert!(teardown.is_done());
    assert!(!pair.outbound().exists());
    assert!(!pair.inbound().exists());
    assert!(!shm_path(&name).exists());

    // A second run is a no-op even if the paths reappear.
    pair.create().expect("recreate");
    teardown.run();
    assert!(pair.outbound().exists());
}

#[test]
fn drop_runs_pending_teardown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = created_pair(dir.path());

    drop(Teardown::new(pair.clone(), None));
    assert!(!pair.outbound().exists());
}

#[test]
fn disarmed_teardown_leaves_everything_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = created_pair(dir.path());

    let mut teardown = Teardown::new(pair.clone(), None);
    teardown.disarm();
    assert!(teardown.is_done());
    drop(teardown);

    assert!(pair.outbound().exists());
    assert!(pair.inbound().exists());
}

#[test]
fn teardown_tolerates_already_removed_resources() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pair = ChannelPair::new(dir.path(), &id("alice"), &id("bob"));
    let mut teardown = Teardown::new(pair, Some("/pipechat_never_created".into()));
    teardown.run();
    assert!(teardown.is_done());
}

#[test]
fn mailbox_name_is_unique_per_ordered_pair() {
    let config = |local: &str, peer: &str| SessionConfig {
        local: id(local),
        peer: id(peer),
        flags: ModeFlags::default(),
        chat: ChatConfig::default(),
    };
    assert_eq!(config("alice", "bob").mailbox_name(), "/chat_shm_alice-bob");
    assert_ne!(
        config("alice", "bob").mailbox_name(),
        config("bob", "alice").mailbox_name()
    );
    assert_ne!(
        config("a_b", "c").mailbox_name(),
        config("a", "b_c").mailbox_name()
    );
}
