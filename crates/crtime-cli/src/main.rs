#![forbid(unsafe_code)]

//! `crtime` — report a file's creation time by decoding its inode
//! straight from the ext4 device the file lives on.
//!
//! The standard stat interface does not expose ext4 creation times, so
//! the tool resolves the file to an inode number via the host stat and
//! then reads the raw 256-byte inode record from the device itself.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crtime_ondisk::{Ext4Timestamp, Ext4Volume};
use crtime_types::InodeNumber;
use serde::Serialize;
use std::env::VarError;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "CRTIME_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|_| {
            anyhow::anyhow!(
                "invalid {key}={raw:?}; expected one of: human, json",
                key = Self::ENV_KEY
            )
        })
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => Ok(Some(Self::parse(&value)?)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                anyhow::bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(log_format_override: Option<LogFormat>) -> Result<()> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(default_env_filter())
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "crtime",
    about = "Extract a file's creation time from an ext4 device"
)]
struct Cli {
    /// Block device (or image file) holding the ext4 filesystem.
    device: PathBuf,
    /// File whose creation time should be reported; must live on the
    /// given device.
    file: PathBuf,
    /// Emit the decoded record as JSON instead of the one-line summary.
    #[arg(long)]
    json: bool,
    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `CRTIME_LOG_FORMAT` > `human`.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Serialize)]
struct CrtimeOutput {
    device: String,
    file: String,
    inode: u32,
    crtime: u32,
    crtime_extra: u32,
    seconds: i64,
    nanoseconds: u32,
    timestamp: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    if !is_readable(&cli.device) || !is_readable(&cli.file) {
        print_usage();
        return Ok(());
    }

    let ino = resolve_inode(&cli.file)?;
    let started = Instant::now();

    let volume = Ext4Volume::open_path(&cli.device).with_context(|| {
        format!(
            "failed to open {} as an ext4 filesystem",
            cli.device.display()
        )
    })?;
    let inode_size = volume
        .require_large_inodes()
        .with_context(|| format!("{} cannot carry creation times", cli.device.display()))?;
    let (inode, _raw) = volume
        .read_inode(ino)
        .with_context(|| format!("failed to read inode {ino} from {}", cli.device.display()))?;

    let ts = inode.crtime_full();
    let timestamp = format_timestamp(ts)?;

    info!(
        device = %cli.device.display(),
        file = %cli.file.display(),
        ino = ino.0,
        inode_size,
        duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "inode_decoded"
    );

    if cli.json {
        let output = CrtimeOutput {
            device: cli.device.display().to_string(),
            file: cli.file.display().to_string(),
            inode: ino.0,
            crtime: inode.crtime,
            crtime_extra: inode.crtime_extra,
            seconds: ts.seconds,
            nanoseconds: ts.nanoseconds,
            timestamp,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{}",
            render_crtime_line(inode.crtime, inode.crtime_extra, &timestamp)
        );
    }

    Ok(())
}

fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

fn print_usage() {
    println!("crtime — ext4 file creation time extractor");
    println!();
    println!("USAGE:");
    println!("  crtime <device_with_ext4_filesystem> <filename>");
    println!();
    println!("Make sure the device and the file are readable (reading a raw");
    println!("block device usually needs root).");
}

/// Ask the host filesystem which inode number backs `path`.
///
/// The kernel's stat is the only part of the pipeline that touches the
/// mounted filesystem; everything after works on the raw device.
fn resolve_inode(path: &Path) -> Result<InodeNumber> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let ino = u32::try_from(meta.ino()).with_context(|| {
        format!(
            "inode number {} does not fit ext4's 32-bit inode space",
            meta.ino()
        )
    })?;
    Ok(InodeNumber(ino))
}

fn render_crtime_line(crtime: u32, crtime_extra: u32, timestamp: &str) -> String {
    format!("crtime: 0x{crtime:08x}:{crtime_extra:08x} -- {timestamp}")
}

fn format_timestamp(ts: Ext4Timestamp) -> Result<String> {
    let nanos = i128::from(ts.seconds) * 1_000_000_000 + i128::from(ts.nanoseconds);
    let odt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .context("creation time is outside the representable range")?;
    odt.format(&Rfc3339)
        .context("failed to render creation time")
}
