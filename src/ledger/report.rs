//! Human-readable status of the current bottle.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::Settings;

use super::UsageSummary;

/// Derived figures for the `--status` action.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub bottle_volume: f64,
    pub used: f64,
    /// Never negative, even if the settings shrank after washes were logged.
    pub remaining: f64,
    pub washes: usize,
    pub average_per_wash: Option<f64>,
    pub washes_left: Option<u64>,
    pub last_wash: Option<(DateTime<Utc>, f64)>,
}

impl StatusReport {
    pub fn new(settings: &Settings, summary: &UsageSummary) -> Self {
        let bottle_volume = settings.bottle_volume();
        let used = summary.total_volume;
        let remaining = (bottle_volume - used).max(0.0);

        let average_per_wash = (summary.events > 0).then(|| used / summary.events as f64);
        let washes_left = average_per_wash
            .filter(|avg| *avg > 0.0)
            .map(|avg| (remaining / avg).floor() as u64);

        let last_wash = summary
            .last_event
            .as_ref()
            .and_then(|e| e.recorded_at().map(|at| (at, e.cups_used)));

        Self {
            bottle_volume,
            used,
            remaining,
            washes: summary.events,
            average_per_wash,
            washes_left,
            last_wash,
        }
    }

    pub fn percent_remaining(&self) -> f64 {
        self.remaining / self.bottle_volume * 100.0
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used_pct = 100.0 - self.percent_remaining();
        writeln!(f, "Detergent status")?;
        writeln!(f, "  bottle volume : {:.3}", self.bottle_volume)?;
        writeln!(f, "  used          : {:.3} ({used_pct:.1}%)", self.used)?;
        writeln!(
            f,
            "  remaining     : {:.3} ({:.1}%)",
            self.remaining,
            self.percent_remaining()
        )?;
        write!(f, "  washes logged : {}", self.washes)?;
        if let Some(avg) = self.average_per_wash {
            write!(f, "\n  avg per wash  : {avg:.3}")?;
        }
        if let Some(left) = self.washes_left {
            write!(f, "\n  washes left   : ~{left}")?;
        }
        if let Some((at, cups)) = self.last_wash {
            write!(f, "\n  last wash     : {} ({cups} cups)", at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }
}
