//! `kanban`: project board in the terminal.
//!
//! Tasks live in a local snapshot file. Status changes are shown
//! immediately and rolled back if the store rejects them. Configuration via
//! CLI flags, environment variables, or config file
//! (`~/.config/kanban/config.toml`).
//!
//! ```bash
//! cargo run --bin kanban -- init ALPHA "Project Alpha"
//! cargo run --bin kanban -- create "Fix login bug" --priority high --points 3
//! cargo run --bin kanban -- move ALPHA-1=in_progress
//! cargo run --bin kanban -- board --query login
//! ```

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use kanban::cli::{self, BoardCommand, Command};
use kanban::config::{CliArgs, ClientConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > env > config file > defaults.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout is for the board.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let command = cli
        .command
        .unwrap_or_else(|| Command::Board(BoardCommand::default()));
    tracing::debug!(?command, data_file = %config.data_file.display(), "kanban starting");

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let result = cli::run(command, &config, &mut stdout, &mut stderr).await;
    let _ = stdout.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            let _ = writeln!(stderr, "error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("kanban.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
