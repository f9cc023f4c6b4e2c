//! `pipechat`: two-party terminal chat binary.
//!
//! Validates the nicknames, loads configuration, and hands over to the
//! session supervisor, which splits into the Sender and Receiver processes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use pipechat::identity::EndpointId;
use pipechat::presentation::ModeFlags;
use pipechat::session::{SessionConfig, Supervisor};
use pipechat::{AppError, ChatConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "pipechat", about = "Two-party chat over named pipes", version, long_about = None)]
struct Cli {
    /// Your nickname.
    local: String,

    /// The nickname of the person to talk to.
    peer: String,

    /// Plain `[nick] text` output without local echo.
    #[arg(long)]
    bot: bool,

    /// Buffer incoming messages and show them when you send or press Ctrl-C.
    #[arg(long, visible_alias = "manual")]
    manuel: bool,

    /// Coloured output with an input prompt.
    #[arg(long)]
    joli: bool,

    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the named pipes (overrides the configuration).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            if let Err(print_err) = err.print() {
                debug!(%print_err, "cannot print usage");
            }
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("pipechat: {err}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(%err, "session failed");
            eprintln!("pipechat: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(args: Cli) -> Result<u8> {
    // ── Validate identifiers ────────────────────────────
    let local = EndpointId::parse(&args.local)?;
    let peer = EndpointId::parse(&args.peer)?;

    // ── Load configuration ──────────────────────────────
    let mut chat = match &args.config {
        Some(path) => ChatConfig::load_from_path(path)?,
        None => ChatConfig::default(),
    };
    if let Some(dir) = args.base_dir {
        chat.base_dir = dir;
    }
    chat.validate()?;
    info!(base_dir = %chat.base_dir.display(), "configuration loaded");

    // ── Run the session ─────────────────────────────────
    let config = SessionConfig {
        local,
        peer,
        flags: ModeFlags {
            bot: args.bot,
            manual: args.manuel,
            joli: args.joli,
        },
        chat,
    };
    let exit = Supervisor::new(config).run()?;
    Ok(exit.code())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
