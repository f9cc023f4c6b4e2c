//! Chat configuration parsing and validation.
//!
//! Every key is optional; a session started without `--config` runs on
//! [`ChatConfig::default`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::channel::transport::MAX_PAYLOAD;
use crate::mailbox::HEADER_LEN;
use crate::{AppError, Result};

fn default_base_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_shm_prefix() -> String {
    "/chat_shm_".into()
}

fn default_mailbox_region_bytes() -> usize {
    4096
}

fn default_open_poll_interval_ms() -> u16 {
    100
}

fn default_quit_command() -> String {
    "exit".into()
}

/// Session configuration parsed from an optional `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ChatConfig {
    /// Directory that holds the `<a>-<b>.chat` named pipes.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Prefix of the shared-memory object name used in manual mode.
    #[serde(default = "default_shm_prefix")]
    pub shm_prefix: String,
    /// Total size of the shared mailbox region, header included.
    #[serde(default = "default_mailbox_region_bytes")]
    pub mailbox_region_bytes: usize,
    /// Remaining free bytes at which the receiver asks for a drain.
    #[serde(default)]
    pub mailbox_watermark: usize,
    /// Delay between outbound open attempts while the peer is absent.
    #[serde(default = "default_open_poll_interval_ms")]
    pub open_poll_interval_ms: u16,
    /// Local input line that ends the session.
    #[serde(default = "default_quit_command")]
    pub quit_command: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            shm_prefix: default_shm_prefix(),
            mailbox_region_bytes: default_mailbox_region_bytes(),
            mailbox_watermark: 0,
            open_poll_interval_ms: default_open_poll_interval_ms(),
            quit_command: default_quit_command(),
        }
    }
}

impl ChatConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Bytes available for frames once the header is accounted for.
    #[must_use]
    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_region_bytes.saturating_sub(HEADER_LEN)
    }

    /// Outbound open retry interval as a [`Duration`].
    #[must_use]
    pub fn open_poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.open_poll_interval_ms))
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_dir() {
            return Err(AppError::Config(format!(
                "base_dir {} is not a directory",
                self.base_dir.display()
            )));
        }

        if !self.shm_prefix.starts_with('/') || self.shm_prefix[1..].contains('/') {
            return Err(AppError::Config(
                "shm_prefix must start with '/' and contain no other '/'".into(),
            ));
        }

        // One maximal frame plus its terminator must always fit.
        if self.mailbox_capacity() <= MAX_PAYLOAD {
            return Err(AppError::Config(format!(
                "mailbox_region_bytes must exceed {}",
                HEADER_LEN + MAX_PAYLOAD
            )));
        }

        if self.mailbox_watermark >= self.mailbox_capacity() {
            return Err(AppError::Config(
                "mailbox_watermark must be smaller than the mailbox data area".into(),
            ));
        }

        if self.open_poll_interval_ms == 0 {
            return Err(AppError::Config(
                "open_poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.quit_command.trim().is_empty() {
            return Err(AppError::Config("quit_command must not be empty".into()));
        }

        Ok(())
    }
}
