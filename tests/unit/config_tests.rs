use std::time::Duration;

use pipechat::mailbox::HEADER_LEN;
use pipechat::{AppError, ChatConfig};

fn with_base_dir(base: &std::path::Path, extra: &str) -> String {
    format!("base_dir = '{}'\n{extra}", base.display())
}

#[test]
fn empty_file_uses_defaults() {
    let config = ChatConfig::from_toml_str("").expect("defaults are valid");
    assert_eq!(config, ChatConfig::default());
    assert_eq!(config.base_dir, std::path::PathBuf::from("/tmp"));
    assert_eq!(config.shm_prefix, "/chat_shm_");
    assert_eq!(config.quit_command, "exit");
    assert_eq!(config.open_poll_interval(), Duration::from_millis(100));
    assert_eq!(config.mailbox_capacity(), 4096 - HEADER_LEN);
}

#[test]
fn every_key_can_be_overridden() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = with_base_dir(
        dir.path(),
        r#"
shm_prefix = "/test_chat_"
mailbox_region_bytes = 1024
mailbox_watermark = 64
open_poll_interval_ms = 25
quit_command = "/quit"
"#,
    );

    let config = ChatConfig::from_toml_str(&raw).expect("valid config");
    assert_eq!(config.base_dir, dir.path());
    assert_eq!(config.shm_prefix, "/test_chat_");
    assert_eq!(config.mailbox_capacity(), 1024 - HEADER_LEN);
    assert_eq!(config.mailbox_watermark, 64);
    assert_eq!(config.open_poll_interval(), Duration::from_millis(25));
    assert_eq!(config.quit_command, "/quit");
}

#[test]
fn unknown_keys_are_rejected() {
    let err = ChatConfig::from_toml_str("colour = true").expect_err("unknown key");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_base_dir_is_rejected() {
    let err = ChatConfig::from_toml_str("base_dir = '/definitely/not/here'")
        .expect_err("missing directory");
    assert!(err.to_string().contains("base_dir"));
}

#[test]
fn shm_prefix_must_be_a_single_component() {
    for prefix in ["chat_", "/a/b"] {
        let raw = format!("shm_prefix = '{prefix}'");
        let err = ChatConfig::from_toml_str(&raw).expect_err("bad prefix");
        assert!(err.to_string().contains("shm_prefix"), "{prefix}");
    }
}

#[test]
fn region_must_hold_one_full_frame() {
    let raw = format!("mailbox_region_bytes = {}", HEADER_LEN + 255);
    let err = ChatConfig::from_toml_str(&raw).expect_err("region too small");
    assert!(err.to_string().contains("mailbox_region_bytes"));

    let raw = format!("mailbox_region_bytes = {}", HEADER_LEN + 256);
    assert!(ChatConfig::from_toml_str(&raw).is_ok());
}

#[test]
fn watermark_must_be_below_capacity() {
    let raw = "mailbox_region_bytes = 512\nmailbox_watermark = 600";
    let err = ChatConfig::from_toml_str(raw).expect_err("watermark too large");
    assert!(err.to_string().contains("mailbox_watermark"));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = ChatConfig::from_toml_str("open_poll_interval_ms = 0").expect_err("zero interval");
    assert!(err.to_string().contains("open_poll_interval_ms"));
}

#[test]
fn blank_quit_command_is_rejected() {
    let err = ChatConfig::from_toml_str("quit_command = '  '").expect_err("blank quit");
    assert!(err.to_string().contains("quit_command"));
}

#[test]
fn load_from_path_reads_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "quit_command = 'bye'").expect("write config");

    let config = ChatConfig::load_from_path(&path).expect("load");
    assert_eq!(config.quit_command, "bye");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let err = ChatConfig::load_from_path("/nope/config.toml").expect_err("missing file");
    assert!(err.to_string().starts_with("config:"));
}
