use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const TRACE_FILE_NAME: &str = "bcsync.trace";

/// Level for a `-v` count. `RUST_LOG` still wins when set.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber writing to `<log_dir>/bcsync.trace`.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(verbosity: u8, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log dir {}", log_dir.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));

    let file_appender = tracing_appender::rolling::never(log_dir, TRACE_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .try_init()
        .context("cannot install tracing subscriber")?;

    info!("tracing to {}", log_dir.join(TRACE_FILE_NAME).display());
    Ok(guard)
}
