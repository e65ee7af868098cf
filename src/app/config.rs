//! Config file loading and merging with CLI arguments.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use page_downloader::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT, READ_TIMEOUT_SECS,
};
use page_downloader::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Args;

const APP_DIR: &str = "page-downloader";
const CONFIG_FILE: &str = "config.toml";

const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_OUTPUT_DIR: &str = "pages";

/// TOML-backed defaults. Keys mirror the long CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) batch_size: Option<u16>,
    pub(crate) fetch_timeout: Option<u64>,
    pub(crate) connect_timeout: Option<u64>,
    pub(crate) read_timeout: Option<u64>,
    pub(crate) max_retries: Option<u8>,
    pub(crate) max_page_bytes: Option<u64>,
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) poll_interval: Option<u64>,
    /// Show the progress bar (`--no-progress` always wins).
    pub(crate) progress: Option<bool>,
}

impl FileConfig {
    /// Validates config values against the same ranges the CLI enforces.
    pub(crate) fn validate(&self) -> Result<()> {
        check_range("batch_size", self.batch_size.map(u64::from), 1, 1000)?;
        check_range("fetch_timeout", self.fetch_timeout, 1, 3600)?;
        check_range("connect_timeout", self.connect_timeout, 1, 3600)?;
        check_range("read_timeout", self.read_timeout, 1, 3600)?;
        check_range("max_retries", self.max_retries.map(u64::from), 0, 10)?;
        check_range("max_page_bytes", self.max_page_bytes, 1, u64::MAX)?;
        check_range("poll_interval", self.poll_interval, 50, 60_000)?;
        Ok(())
    }
}

fn check_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/page-downloader/config.toml`
/// 2. `$HOME/.config/page-downloader/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional and skipped
/// when absent.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }

    let Some(path) = resolve_default_config_path() else {
        debug!("no config directory known, using built-in defaults");
        return Ok(None);
    };
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using built-in defaults");
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    debug!(path = %path.display(), ?config, "config file loaded");
    Ok(config)
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Effective run settings after applying CLI > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) batch_size: usize,
    pub(crate) fetch_timeout: Duration,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
    pub(crate) max_retries: u32,
    pub(crate) max_page_bytes: Option<u64>,
    pub(crate) output_dir: PathBuf,
    pub(crate) poll_interval: Duration,
    pub(crate) progress: bool,
}

impl Settings {
    pub(crate) fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();

        Self {
            batch_size: args
                .batch_size
                .or(file.batch_size)
                .map_or(DEFAULT_BATCH_SIZE, usize::from),
            fetch_timeout: args
                .fetch_timeout
                .or(file.fetch_timeout)
                .map_or(DEFAULT_FETCH_TIMEOUT, Duration::from_secs),
            connect_timeout_secs: args
                .connect_timeout
                .or(file.connect_timeout)
                .unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: args
                .read_timeout
                .or(file.read_timeout)
                .unwrap_or(READ_TIMEOUT_SECS),
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .map_or(DEFAULT_MAX_RETRIES, u32::from),
            max_page_bytes: args.max_page_bytes.or(file.max_page_bytes),
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            poll_interval: Duration::from_millis(
                args.poll_interval
                    .or(file.poll_interval)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            progress: !args.no_progress && !args.quiet && file.progress.unwrap_or(true),
        }
    }
}
