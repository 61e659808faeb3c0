//! # sealstate CLI
//!
//! Encrypts and decrypts state and plan payloads with the configured pairings.
//!
//! ```text
//! sealstate encrypt --target state --config encryption.json --input state.json --output state.enc
//! sealstate decrypt --target state --config encryption.json --input state.enc
//! sealstate validate --config encryption.json
//! ```
//!
//! The `TF_ENCRYPTION` environment variable, written in the same grammar as the file (JSON or
//! TOML), is merged over the file configuration.
//! Payloads flow through stdin/stdout when `--input`/`--output` are omitted or `-`;
//! diagnostics and logs always go to stderr.

pub mod config;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sealstate_encryption::{Diagnostics, Encryption, setup};
use sealstate_logger::{LevelFilter, Logger};
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "sealstate", version, about = "Encrypt state and plan artifacts at rest")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Minimum log level written to stderr.
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    /// Directory for rolling JSON log files.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt a payload into an envelope.
    Encrypt(Transform),
    /// Decrypt an envelope back into the payload.
    Decrypt(Transform),
    /// Build every target and report configuration problems.
    Validate(Validate),
}

#[derive(Debug, Args)]
pub struct Transform {
    /// Target whose pairings are used (`state`, `plan`, ...).
    #[arg(long, short)]
    pub target: String,

    /// Base encryption configuration file (JSON or TOML).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Input file, `-` for stdin.
    #[arg(long, short, default_value = "-")]
    pub input: PathBuf,

    /// Output file, `-` for stdout.
    #[arg(long, short, default_value = "-")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct Validate {
    /// Base encryption configuration file (JSON or TOML).
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::OFF,
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

/// Installs the logger for the lifetime of the returned handle.
///
/// # Errors
/// If the subscriber cannot be installed or the log directory is unusable.
pub fn init_logger(cli: &Cli) -> Result<Logger> {
    let builder = Logger::builder()
        .name("sealstate")
        .level(cli.log_level.into())
        .ansi(io::stderr().is_terminal());

    let logger = match &cli.log_dir {
        Some(dir) => builder.path(dir).json().init(),
        None => builder.init(),
    };
    logger.context("Failed to initialize logging")
}

/// Runs a parsed command.
///
/// # Errors
/// Configuration loading, I/O or encryption failures.
pub fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Encrypt(args) => transform(&args, Direction::Encrypt),
        Command::Decrypt(args) => transform(&args, Direction::Decrypt),
        Command::Validate(args) => validate(&args),
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn transform(args: &Transform, direction: Direction) -> Result<ExitCode> {
    let Some(encryption) = startup(args.config.as_deref())? else {
        return Ok(ExitCode::FAILURE);
    };

    let target = encryption.target(&args.target)?;
    let input = read_input(&args.input)?;

    let output = match direction {
        Direction::Encrypt => target.encrypt_bytes(&input)?,
        Direction::Decrypt => target.decrypt_bytes(&input)?,
    };
    debug!(?direction, target_name = %args.target, bytes = output.len(), "Writing output");

    write_output(&args.output, &output)?;
    Ok(ExitCode::SUCCESS)
}

fn validate(args: &Validate) -> Result<ExitCode> {
    let Some(encryption) = startup(args.config.as_deref())? else {
        return Ok(ExitCode::FAILURE);
    };

    let mut stdout = io::stdout().lock();
    for name in encryption.targets() {
        let mode = if encryption.can_encrypt(name) { "encrypt/decrypt" } else { "decrypt only" };
        writeln!(stdout, "{name}: {mode}")?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads, merges and builds. Returns `None` after reporting errors.
fn startup(config_path: Option<&Path>) -> Result<Option<Encryption>> {
    let (base, file_diags) = config::load_config(config_path)?;
    report(&file_diags)?;

    match setup::encryption_from_config(base) {
        Ok((encryption, diags)) => {
            report(&diags)?;
            Ok((!diags.has_errors()).then_some(encryption))
        },
        Err(diags) => {
            report(&diags)?;
            Ok(None)
        },
    }
}

fn report(diags: &Diagnostics) -> Result<()> {
    if diags.is_empty() {
        return Ok(());
    }
    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{diags}")?;
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf).context("Failed to read stdin")?;
        return Ok(buf);
    }
    if !path.is_file() {
        bail!("Input file not found: {}", path.display());
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data).context("Failed to write stdout")?;
        return stdout.flush().context("Failed to flush stdout");
    }
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}
