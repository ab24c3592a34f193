//! `ledger` — durable, single-table record of detergent used per wash.
//!
//! Layout: one SQLite file (default `database/detergent.db`) holding the
//! `usage_events` table. The directory must already exist; the ledger never
//! creates it.
//!
//! A [`Ledger`] is only a validated path. Every operation opens its own
//! connection with a 5 s busy timeout, so separate processes can share the
//! file. Files created here use WAL journaling; files found on disk keep
//! whatever journal mode they have. Logging a wash reads the running total, checks the remaining volume
//! and inserts the row inside one `BEGIN IMMEDIATE` transaction: two racing
//! writers serialize on the reserved lock and the second one sees the
//! first one's row.

mod report;
mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::LedgerError;

pub use report::StatusReport;

const BUSY_TIMEOUT_MS: i64 = 5000;

/// One logged wash as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    /// Seconds since the Unix epoch. Unique per ledger.
    pub timestamp: i64,
    pub cups_used: f64,
    /// `cups_used * cup_volume` at the time the wash was logged.
    pub volume_used: f64,
}

impl UsageEvent {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            timestamp: row.get(0)?,
            cups_used: row.get(1)?,
            volume_used: row.get(2)?,
        })
    }
}

/// Aggregate view of the ledger, read in a single snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsageSummary {
    pub events: usize,
    pub total_cups: f64,
    pub total_volume: f64,
    pub last_event: Option<UsageEvent>,
}

/// Handle to an initialized ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    db_path: PathBuf,
}

impl Ledger {
    /// Make sure a usable ledger exists at `location` and return a handle.
    ///
    /// A missing file is created with a fresh table. An existing file is
    /// opened and its table checked, never recreated or altered. Calling this
    /// again on the same file is a no-op.
    pub fn ensure_initialized(location: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db_path = location.as_ref().to_path_buf();
        // SQLite would silently hand out a temporary or in-memory database here.
        if db_path.file_name().is_none() || db_path.as_os_str() == ":memory:" {
            return Err(LedgerError::Create {
                path: db_path,
                source: "ledger path must name a database file".into(),
            });
        }
        let dir = match db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(LedgerError::Unavailable { dir });
        }

        let ledger = Self { db_path };
        if ledger.db_path.exists() {
            ledger.open_existing()?;
        } else {
            info!(path = %ledger.db_path.display(), "ledger not found, creating a new one");
            ledger.create()?;
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Sum of `volume_used` over all events; `0` when the ledger is empty.
    pub fn total_volume_used(&self) -> Result<f64, LedgerError> {
        let read_err = |source| LedgerError::Read { path: self.db_path.clone(), source };
        let conn = self.open_conn().map_err(read_err)?;
        sum_volume(&conn).map_err(read_err)
    }

    /// Log a wash of `cups_used` cups stamped with the current time.
    pub fn record_event(
        &self,
        cups_used: f64,
        settings: &Settings,
    ) -> Result<UsageEvent, LedgerError> {
        self.record_event_at(cups_used, settings, None)
    }

    /// Log a wash of `cups_used` cups, stamped with `timestamp` if given and
    /// with the current time otherwise.
    ///
    /// Rejects, in order: a negative or non-finite cup count, a single wash
    /// larger than a full bottle, a wash larger than what is left, and a
    /// timestamp that is already taken.
    pub fn record_event_at(
        &self,
        cups_used: f64,
        settings: &Settings,
        timestamp: Option<i64>,
    ) -> Result<UsageEvent, LedgerError> {
        if !cups_used.is_finite() || cups_used < 0.0 {
            return Err(LedgerError::InvalidQuantity { cups: cups_used });
        }

        let volume = cups_used * settings.cup_volume();
        if volume > settings.bottle_volume() {
            return Err(LedgerError::CapacityExceeded {
                cups: cups_used,
                cup_volume: settings.cup_volume(),
                volume,
                bottle_volume: settings.bottle_volume(),
            });
        }

        let write_err = |source| LedgerError::Write { path: self.db_path.clone(), source };

        let mut conn = self.open_conn().map_err(write_err)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_err)?;

        let remaining = settings.bottle_volume() - sum_volume(&tx).map_err(write_err)?;
        if remaining < volume {
            return Err(LedgerError::InsufficientRemaining { volume, remaining });
        }

        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
        tx.execute(
            "INSERT INTO usage_events (timestamp, cups_used, volume_used) VALUES (?1, ?2, ?3)",
            params![timestamp, cups_used, volume],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::DuplicateTimestamp { timestamp }
            } else {
                write_err(e)
            }
        })?;

        let event = tx
            .query_row(
                "SELECT timestamp, cups_used, volume_used FROM usage_events WHERE timestamp = ?1",
                params![timestamp],
                UsageEvent::from_row,
            )
            .map_err(write_err)?;
        tx.commit().map_err(write_err)?;

        debug!(
            timestamp = event.timestamp,
            cups = event.cups_used,
            volume = event.volume_used,
            remaining = remaining - volume,
            "wash recorded"
        );
        Ok(event)
    }

    /// Count, totals and most recent event in one read snapshot.
    pub fn summary(&self) -> Result<UsageSummary, LedgerError> {
        let read_err = |source| LedgerError::Read { path: self.db_path.clone(), source };

        let mut conn = self.open_conn().map_err(read_err)?;
        let tx = conn.transaction().map_err(read_err)?;

        let (events, total_cups, total_volume) = tx
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(cups_used), 0.0), COALESCE(SUM(volume_used), 0.0)
                 FROM usage_events",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )
            .map_err(read_err)?;

        let last_event = tx
            .query_row(
                "SELECT timestamp, cups_used, volume_used FROM usage_events
                 ORDER BY timestamp DESC LIMIT 1",
                [],
                UsageEvent::from_row,
            )
            .optional()
            .map_err(read_err)?;
        tx.commit().map_err(read_err)?;

        Ok(UsageSummary {
            events: usize::try_from(events).unwrap_or_default(),
            total_cups,
            total_volume,
            last_event,
        })
    }

    /// Delete every event. Confirmation is the caller's job; this always
    /// deletes. Returns the number of rows removed.
    pub fn reset_all(&self) -> Result<usize, LedgerError> {
        let write_err = |source| LedgerError::Write { path: self.db_path.clone(), source };

        let mut conn = self.open_conn().map_err(write_err)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_err)?;
        let removed = tx.execute("DELETE FROM usage_events", []).map_err(write_err)?;
        tx.commit().map_err(write_err)?;

        info!(path = %self.db_path.display(), removed, "ledger reset");
        Ok(removed)
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn create(&self) -> Result<(), LedgerError> {
        let create_err = |e: rusqlite::Error| LedgerError::Create {
            path: self.db_path.clone(),
            source: e.into(),
        };

        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(create_err)?;
        configure(&conn).map_err(create_err)?;
        // Persistent in the file; ledgers found on disk keep their journal mode.
        conn.pragma_update(None, "journal_mode", "WAL").map_err(create_err)?;
        conn.execute_batch(schema::CREATE_SQL).map_err(create_err)?;
        Ok(())
    }

    fn open_existing(&self) -> Result<(), LedgerError> {
        let open_err = |source: crate::error::Cause| LedgerError::Open {
            path: self.db_path.clone(),
            source,
        };

        let conn = self.open_conn().map_err(|e| open_err(e.into()))?;
        let version = schema::user_version(&conn).map_err(|e| open_err(e.into()))?;
        if version != 0 && version != schema::SCHEMA_VERSION {
            return Err(open_err(schema::SchemaError::UnsupportedVersion(version).into()));
        }

        if schema::table_exists(&conn).map_err(|e| open_err(e.into()))? {
            let found = schema::columns(&conn).map_err(|e| open_err(e.into()))?;
            schema::check_columns(found).map_err(|e| open_err(e.into()))?;
            debug!(path = %self.db_path.display(), "ledger opened");
        } else {
            info!(path = %self.db_path.display(), "ledger has no events table, creating it");
            conn.execute_batch(schema::CREATE_SQL)
                .map_err(|e| LedgerError::Create { path: self.db_path.clone(), source: e.into() })?;
        }
        Ok(())
    }

    /// Open the existing file read-write; never creates it.
    fn open_conn(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure(&conn)?;
        Ok(conn)
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
}

fn sum_volume(conn: &Connection) -> rusqlite::Result<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(volume_used), 0.0) FROM usage_events",
        [],
        |row| row.get(0),
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerErrorKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::ensure_initialized(dir.path().join("detergent.db")).unwrap();
        (dir, ledger)
    }

    fn settings() -> Settings {
        Settings::new(10.0, 2.0).unwrap()
    }

    #[test]
    fn creates_file_in_existing_dir() {
        let (dir, ledger) = setup();
        assert!(dir.path().join("detergent.db").exists());
        assert_eq!(ledger.path(), dir.path().join("detergent.db"));
    }

    #[test]
    fn missing_dir_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = Ledger::ensure_initialized(dir.path().join("nope").join("x.db")).unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::StorageUnavailable);
        assert!(!dir.path().join("nope").exists());
    }

    #[test]
    fn empty_ledger_totals_zero() {
        let (_dir, ledger) = setup();
        assert_eq!(ledger.total_volume_used().unwrap(), 0.0);
        assert_eq!(ledger.summary().unwrap(), UsageSummary::default());
    }

    #[test]
    fn record_returns_persisted_row() {
        let (_dir, ledger) = setup();
        let event = ledger.record_event_at(1.5, &settings(), Some(1_000)).unwrap();
        assert_eq!(
            event,
            UsageEvent { timestamp: 1_000, cups_used: 1.5, volume_used: 3.0 }
        );
        assert_eq!(ledger.total_volume_used().unwrap(), 3.0);
    }

    #[test]
    fn default_timestamp_is_now() {
        let (_dir, ledger) = setup();
        let before = Utc::now().timestamp();
        let event = ledger.record_event(1.0, &settings()).unwrap();
        let after = Utc::now().timestamp();
        assert!(event.timestamp >= before && event.timestamp <= after);
        assert!(event.recorded_at().is_some());
    }

    #[test]
    fn zero_cups_is_allowed() {
        let (_dir, ledger) = setup();
        let event = ledger.record_event_at(0.0, &settings(), Some(1)).unwrap();
        assert_eq!(event.volume_used, 0.0);
    }

    #[test]
    fn negative_and_nan_cups_are_invalid() {
        let (_dir, ledger) = setup();
        for cups in [-1.0, f64::NAN, f64::INFINITY] {
            let err = ledger.record_event_at(cups, &settings(), Some(1)).unwrap_err();
            assert_eq!(err.kind(), LedgerErrorKind::InvalidQuantity);
        }
        assert_eq!(ledger.summary().unwrap().events, 0);
    }

    #[test]
    fn single_wash_over_bottle_is_capacity_exceeded() {
        let (_dir, ledger) = setup();
        let err = ledger.record_event_at(6.0, &settings(), Some(1)).unwrap_err();
        match err {
            LedgerError::CapacityExceeded { cups, cup_volume, volume, bottle_volume } => {
                assert_eq!((cups, cup_volume, volume, bottle_volume), (6.0, 2.0, 12.0, 10.0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn remaining_volume_is_enforced() {
        let (_dir, ledger) = setup();
        let s = settings();
        ledger.record_event_at(3.0, &s, Some(1)).unwrap();

        match ledger.record_event_at(3.0, &s, Some(2)).unwrap_err() {
            LedgerError::InsufficientRemaining { volume, remaining } => {
                assert_eq!(volume, 6.0);
                assert_eq!(remaining, 4.0);
            }
            other => panic!("unexpected error: {other}"),
        }

        ledger.record_event_at(2.0, &s, Some(3)).unwrap();
        assert_eq!(ledger.total_volume_used().unwrap(), 10.0);
    }

    #[test]
    fn same_second_is_duplicate_timestamp() {
        let (_dir, ledger) = setup();
        ledger.record_event_at(1.0, &settings(), Some(42)).unwrap();
        let err = ledger.record_event_at(1.0, &settings(), Some(42)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTimestamp { timestamp: 42 }));
        assert!(err.is_retryable());
        assert_eq!(ledger.summary().unwrap().events, 1);
    }

    #[test]
    fn summary_reports_latest_event() {
        let (_dir, ledger) = setup();
        let s = settings();
        ledger.record_event_at(1.0, &s, Some(20)).unwrap();
        ledger.record_event_at(0.5, &s, Some(10)).unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.total_cups, 1.5);
        assert_eq!(summary.total_volume, 3.0);
        assert_eq!(summary.last_event.unwrap().timestamp, 20);
    }

    #[test]
    fn reset_clears_everything() {
        let (_dir, ledger) = setup();
        let s = settings();
        ledger.record_event_at(1.0, &s, Some(1)).unwrap();
        ledger.record_event_at(2.0, &s, Some(2)).unwrap();

        assert_eq!(ledger.reset_all().unwrap(), 2);
        assert_eq!(ledger.total_volume_used().unwrap(), 0.0);
        assert_eq!(ledger.reset_all().unwrap(), 0);
    }

    #[test]
    fn reinitializing_keeps_rows() {
        let (dir, ledger) = setup();
        ledger.record_event_at(1.0, &settings(), Some(7)).unwrap();

        let again = Ledger::ensure_initialized(dir.path().join("detergent.db")).unwrap();
        assert_eq!(again.total_volume_used().unwrap(), 2.0);
    }

    #[test]
    fn empty_path_is_rejected_before_touching_sqlite() {
        for location in ["", ":memory:", ".."] {
            let err = Ledger::ensure_initialized(location).unwrap_err();
            assert_eq!(err.kind(), LedgerErrorKind::StorageCreate, "location {location:?}");
        }
    }

    #[test]
    fn unopenable_new_file_is_create_error() {
        use std::error::Error;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("{}.db", "x".repeat(300)));
        let err = Ledger::ensure_initialized(&path).unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::StorageCreate);

        let source = err.source().expect("create error keeps its cause");
        assert!(source.downcast_ref::<rusqlite::Error>().is_some());
    }

    #[test]
    fn new_ledger_uses_wal() {
        let (dir, _ledger) = setup();
        let conn = Connection::open(dir.path().join("detergent.db")).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0)).unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn existing_ledger_keeps_its_journal_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detergent.db");
        Connection::open(&path).unwrap().execute_batch(schema::CREATE_SQL).unwrap();

        let ledger = Ledger::ensure_initialized(&path).unwrap();
        ledger.record_event_at(1.0, &settings(), Some(1)).unwrap();
        drop(ledger);

        let conn = Connection::open(&path).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0)).unwrap();
        assert_eq!(mode, "delete");
    }

    #[test]
    fn garbage_file_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detergent.db");
        std::fs::write(&path, b"this is not an sqlite database, just some text padding it out")
            .unwrap();
        let err = Ledger::ensure_initialized(&path).unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::StorageOpen);
    }

    #[test]
    fn foreign_table_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detergent.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE usage_events (date INTEGER, n_cups REAL, volume_used REAL);")
            .unwrap();
        drop(conn);

        let err = Ledger::ensure_initialized(&path).unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::StorageOpen);
        assert!(err.to_string().contains("date, n_cups, volume_used"));
    }

    #[test]
    fn future_schema_version_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detergent.db");
        Connection::open(&path).unwrap().execute_batch("PRAGMA user_version = 9;").unwrap();

        let err = Ledger::ensure_initialized(&path).unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::StorageOpen);
    }

    #[test]
    fn existing_db_without_table_gets_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detergent.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE notes (body TEXT);")
            .unwrap();

        let ledger = Ledger::ensure_initialized(&path).unwrap();
        assert_eq!(ledger.total_volume_used().unwrap(), 0.0);
    }
}
