//! Configuration for the `kanban` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Command;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    board: BoardFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    data_file: Option<PathBuf>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    project: Option<String>,
    lock_timeout_ms: Option<u64>,
    title_width: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Snapshot file the task store is loaded from and saved to.
    pub data_file: PathBuf,
    /// Key of the project to show; may be omitted when only one exists.
    pub project: Option<String>,
    /// Upper bound for a single remote mutation. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Maximum rendered title width in characters.
    pub title_width: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            project: None,
            lock_timeout: None,
            title_width: 48,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/kanban/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI (and env) > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        // A zero timeout in either layer disables the bound.
        let lock_timeout_ms = cli.lock_timeout_ms.or(file.board.lock_timeout_ms);

        Self {
            data_file: cli
                .data_file
                .clone()
                .or_else(|| file.store.data_file.clone())
                .unwrap_or(defaults.data_file),
            project: cli.project.clone().or_else(|| file.board.project.clone()),
            lock_timeout: lock_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            title_width: cli
                .title_width
                .or(file.board.title_width)
                .unwrap_or(defaults.title_width),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board with optimistic status changes")]
pub struct CliArgs {
    /// Task store snapshot file.
    #[arg(long, env = "KANBAN_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Project key to open.
    #[arg(short, long, env = "KANBAN_PROJECT")]
    pub project: Option<String>,

    /// Give up on a remote mutation after this many milliseconds (0 = never).
    #[arg(long, env = "KANBAN_LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: Option<u64>,

    /// Maximum rendered title width.
    #[arg(long)]
    pub title_width: Option<usize>,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/kanban.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; shows the board when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_data_file() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("kanban.bin"),
        |dir| dir.join("kanban").join("board.bin"),
    )
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("kanban").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
