//! Diagnostics for the tracker, via tracing-subscriber.
//!
//! The tracker's output proper (recorded washes, the status report, the
//! reset prompt) is printed to stdout by the binary. Everything logged here
//! is diagnostic: which settings file and ledger were used, schema checks,
//! retries. It goes to stderr unless `DETERGENT_LOG_FILE` names a file, in
//! which case lines are appended there so repeated runs build one history.
//!
//! Verbosity: `RUST_LOG` when set and valid, otherwise the level resolved
//! from `--log-level` / `DETERGENT_LOG_LEVEL` (default `warn`, which keeps a
//! normal run silent).

use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber. Call once, after `RuntimeConfig` is
/// resolved.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = filter_for(level)?;

    let writer = match log_file {
        Some(path) => BoxMakeWriter::new(open_log_file(path)?),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .map_err(|e| AppError::Logger(format!("tracing subscriber already installed: {e}")))
}

fn filter_for(level: &str) -> Result<EnvFilter, AppError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AppError::Logger(format!("cannot build a log filter from '{level}': {e}")))
}

/// Open `path` for appending, creating it if needed. Its directory must exist.
fn open_log_file(path: &Path) -> Result<File, AppError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::Logger(format!("cannot open log file {}: {e}", path.display())))
}

/// Check a level name from `--log-level` or `DETERGENT_LOG_LEVEL` before
/// anything is logged, so a typo fails the run instead of silencing it.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger(
            "log level is empty; check --log-level or DETERGENT_LOG_LEVEL".into(),
        ));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unknown log level '{level}'")))
}
