//! Detergent tracker — command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse flags
//!   3. Resolve runtime paths and init logger
//!   4. Load and validate settings
//!   5. Initialize the ledger
//!   6. Run the requested action(s): log, status, or reset

use std::io;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use detergent_tracker::cli::{self, Cli};
use detergent_tracker::config::{self, RuntimeConfig, Settings};
use detergent_tracker::error::{AppError, LedgerError};
use detergent_tracker::ledger::{Ledger, StatusReport, UsageEvent};
use detergent_tracker::logger;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = Cli::parse();
    let runtime = RuntimeConfig::resolve(args.overrides())?;
    logger::init(&runtime.log_level, runtime.log_file.as_deref())?;

    let settings = config::load_settings_from(&runtime.settings_path)?;
    info!(
        path = %runtime.settings_path.display(),
        bottle_volume = settings.bottle_volume(),
        cup_volume = settings.cup_volume(),
        "settings loaded"
    );

    let ledger = Ledger::ensure_initialized(&runtime.db_path)?;

    if let Some(cups) = args.log {
        let event = log_wash(&ledger, cups, &settings)?;
        println!(
            "✓ Recorded {} cups ({:.3} used)",
            event.cups_used, event.volume_used
        );
    }

    if args.status {
        let summary = ledger.summary()?;
        println!("{}", StatusReport::new(&settings, &summary));
    }

    if args.reset {
        let confirmed = cli::confirm_reset(&mut io::stdin().lock(), &mut io::stdout())?;
        if confirmed {
            let removed = ledger.reset_all()?;
            println!("✓ Deleted {removed} logged washes");
        } else {
            println!("Reset cancelled, nothing was deleted");
        }
    }

    Ok(())
}

/// Record a wash, retrying once if another wash already holds this second.
fn log_wash(ledger: &Ledger, cups: f64, settings: &Settings) -> Result<UsageEvent, LedgerError> {
    match ledger.record_event(cups, settings) {
        Err(LedgerError::DuplicateTimestamp { timestamp }) => {
            warn!(timestamp, "a wash is already logged this second, retrying");
            thread::sleep(Duration::from_secs(1));
            ledger.record_event(cups, settings)
        }
        other => other,
    }
}
