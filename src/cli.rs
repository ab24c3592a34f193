//! Command-line flags and the reset confirmation prompt.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::RuntimeOverrides;

/// Track how much liquid detergent each wash uses.
#[derive(Parser, Debug)]
#[command(
    name = "detergent-tracker",
    version,
    after_help = "Only --log and --status may be combined; --reset must be used alone.",
    group(ArgGroup::new("action").required(true).multiple(true).args(["log", "status", "reset"]))
)]
pub struct Cli {
    /// Log a wash that used N_CUPS measuring cups
    #[arg(short, long, value_name = "N_CUPS", allow_negative_numbers = true)]
    pub log: Option<f64>,

    /// Show how much detergent is left
    #[arg(short, long)]
    pub status: bool,

    /// Delete all logged washes (asks for confirmation)
    #[arg(long, conflicts_with_all = ["log", "status"])]
    pub reset: bool,

    /// Settings file (TOML, or JSON with a .json extension). Env: DETERGENT_CONFIG
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ledger database file. Env: DETERGENT_DB_PATH
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// error, warn, info, debug or trace. Env: DETERGENT_LOG_LEVEL
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            settings_path: self.config.clone(),
            db_path: self.db.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

pub const RESET_PROMPT: &str = "Do you really want to delete all your data [n/Y]: ";

/// Ask before wiping the ledger. Only an exact `Y` answer confirms; end of
/// input counts as no.
pub fn confirm_reset<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<bool> {
    output.write_all(RESET_PROMPT.as_bytes())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim_end_matches(['\r', '\n']) == "Y")
}
