//! Error types for the settings loader, the usage ledger and the binary.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed underlying cause carried by storage and config read failures.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

// ── settings ─────────────────────────────────────────────────────────────────

/// How a user settings mapping differs in shape from the reference schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatch {
    /// Different number of keys.
    KeyCount { expected: usize, actual: usize },
    /// Same number of keys, different names. Both lists are sorted.
    KeySet {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyCount { expected, actual } => {
                let rel = if actual > expected { "more" } else { "fewer" };
                write!(f, "there are {rel} keys (got {actual}) than expected ({expected})")
            }
            Self::KeySet { expected, actual } => write!(
                f,
                "the expected keys ({}) don't match the actual ones ({})",
                expected.join(", "),
                actual.join(", ")
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings from {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("invalid settings shape: {0}")]
    Shape(ShapeMismatch),

    #[error("setting '{key}' must be a real number, got {actual}")]
    Type { key: String, actual: &'static str },

    #[error("setting '{key}' must be a finite number greater than 0, got {value}")]
    Value { key: String, value: f64 },
}

/// Fieldless discriminant of [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Unreadable,
    Shape,
    Type,
    Value,
}

impl ConfigError {
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            Self::Unreadable { .. } => ConfigErrorKind::Unreadable,
            Self::Shape(_) => ConfigErrorKind::Shape,
            Self::Type { .. } => ConfigErrorKind::Type,
            Self::Value { .. } => ConfigErrorKind::Value,
        }
    }
}

// ── ledger ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(
        "ledger directory {} does not exist; create it (or mount a volume there) before running",
        dir.display()
    )]
    Unavailable { dir: PathBuf },

    #[error("failed to create ledger at {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("failed to open ledger at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("failed to read ledger at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("number of cups must be a non-negative number, got {cups}")]
    InvalidQuantity { cups: f64 },

    #[error(
        "a wash of {cups} cups * {cup_volume} = {volume} exceeds the bottle volume {bottle_volume}; \
         check cup_volume and bottle_volume in your settings"
    )]
    CapacityExceeded {
        cups: f64,
        cup_volume: f64,
        volume: f64,
        bottle_volume: f64,
    },

    #[error("a wash of volume {volume} exceeds the volume left in the bottle ({remaining})")]
    InsufficientRemaining { volume: f64, remaining: f64 },

    #[error("a wash is already logged at timestamp {timestamp}; try again in a second")]
    DuplicateTimestamp { timestamp: i64 },

    #[error("failed to write ledger at {}: {source}; try again later", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

/// Fieldless discriminant of [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    StorageUnavailable,
    StorageCreate,
    StorageOpen,
    StorageRead,
    InvalidQuantity,
    CapacityExceeded,
    InsufficientRemaining,
    DuplicateTimestamp,
    StorageWrite,
}

impl LedgerError {
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            Self::Unavailable { .. } => LedgerErrorKind::StorageUnavailable,
            Self::Create { .. } => LedgerErrorKind::StorageCreate,
            Self::Open { .. } => LedgerErrorKind::StorageOpen,
            Self::Read { .. } => LedgerErrorKind::StorageRead,
            Self::InvalidQuantity { .. } => LedgerErrorKind::InvalidQuantity,
            Self::CapacityExceeded { .. } => LedgerErrorKind::CapacityExceeded,
            Self::InsufficientRemaining { .. } => LedgerErrorKind::InsufficientRemaining,
            Self::DuplicateTimestamp { .. } => LedgerErrorKind::DuplicateTimestamp,
            Self::Write { .. } => LedgerErrorKind::StorageWrite,
        }
    }

    /// `true` when repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateTimestamp { .. } | Self::Write { .. })
    }
}

// ── application ──────────────────────────────────────────────────────────────

/// Application-wide error returned from the binary's `run`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
