//! On-disk layout of the usage ledger and the checks run when opening an
//! existing file.

use std::fmt;

use rusqlite::Connection;

pub(super) const TABLE: &str = "usage_events";
pub(super) const SCHEMA_VERSION: i64 = 1;

const COLUMNS: [&str; 3] = ["timestamp", "cups_used", "volume_used"];

pub(super) const CREATE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS usage_events (
        timestamp   INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
        cups_used   REAL    NOT NULL,
        volume_used REAL    NOT NULL,

        UNIQUE (timestamp),
        CONSTRAINT valid_cups   CHECK (cups_used >= 0),
        CONSTRAINT valid_volume CHECK (volume_used >= 0)
    );

    PRAGMA user_version = 1;
";

/// Why an existing ledger file was rejected.
#[derive(Debug)]
pub(super) enum SchemaError {
    UnsupportedVersion(i64),
    Columns(Vec<String>),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported schema version {v}, expected {SCHEMA_VERSION}")
            }
            Self::Columns(found) => write!(
                f,
                "table {TABLE} has columns ({}), expected ({})",
                found.join(", "),
                COLUMNS.join(", ")
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

pub(super) fn user_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
}

pub(super) fn table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [TABLE],
        |row| row.get(0),
    )
}

/// Column names of the events table in declaration order.
pub(super) fn columns(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([TABLE], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Accept an existing table only if its columns match the current layout.
pub(super) fn check_columns(found: Vec<String>) -> Result<(), SchemaError> {
    if found.iter().map(String::as_str).eq(COLUMNS) {
        Ok(())
    } else {
        Err(SchemaError::Columns(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_schema_has_expected_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SQL).unwrap();
        assert!(table_exists(&conn).unwrap());
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(check_columns(columns(&conn).unwrap()).is_ok());
    }

    #[test]
    fn constraints_reject_negative_values() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SQL).unwrap();
        let result = conn.execute(
            "INSERT INTO usage_events (timestamp, cups_used, volume_used) VALUES (1, -1.0, 0.0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn timestamp_defaults_to_now() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SQL).unwrap();
        conn.execute("INSERT INTO usage_events (cups_used, volume_used) VALUES (1.0, 1.0)", [])
            .unwrap();
        let ts: i64 = conn
            .query_row("SELECT timestamp FROM usage_events", [], |row| row.get(0))
            .unwrap();
        assert!(ts > 1_600_000_000);
    }

    #[test]
    fn foreign_table_layout_is_rejected() {
        let err = check_columns(vec!["date".into(), "n_cups".into(), "volume_used".into()])
            .unwrap_err();
        assert!(err.to_string().contains("date, n_cups, volume_used"));
    }
}
