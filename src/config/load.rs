//! Settings file reading and runtime path resolution.
//!
//! Settings files are flat TOML by default; a `.json` extension switches the
//! parser to JSON. Runtime paths come from CLI flags, then `DETERGENT_*`
//! env vars, then the defaults below.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{AppError, ConfigError};
use crate::logger;

use super::settings::{load_settings, ConfigMap, Settings};

const REFERENCE_TOML: &str = include_str!("../../config/reference.toml");

const DEFAULT_SETTINGS_PATH: &str = "config/settings.toml";
const DEFAULT_DB_PATH: &str = "database/detergent.db";
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Read a settings file into a flat mapping.
///
/// Any I/O or parse failure, or a top level that is not a table, is
/// reported as [`ConfigError::Unreadable`]. A TOML `nan` or `inf` is reported
/// as [`ConfigError::Value`] here, since the mapping cannot carry it.
pub fn read_config_map(path: &Path) -> Result<ConfigMap, ConfigError> {
    let unreadable = |source: crate::error::Cause| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let raw = fs::read_to_string(path).map_err(|e| unreadable(e.into()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(&raw).map_err(|e| unreadable(e.into()))?
    } else {
        let table: toml::Table = toml::from_str(&raw).map_err(|e| unreadable(e.into()))?;
        if let Some((key, value)) = non_finite_float(&table) {
            return Err(ConfigError::Value { key: key.to_string(), value });
        }
        serde_json::to_value(table).map_err(|e| unreadable(e.into()))?
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(unreadable("top level must be a table of settings".into())),
    }
}

fn non_finite_float(table: &toml::Table) -> Option<(&str, f64)> {
    table.iter().find_map(|(key, value)| match value {
        toml::Value::Float(f) if !f.is_finite() => Some((key.as_str(), *f)),
        _ => None,
    })
}

/// The reference schema shipped with the binary. Its key set defines what a
/// settings file must contain; its values are not inspected.
pub fn reference_schema() -> Result<ConfigMap, ConfigError> {
    toml::from_str::<ConfigMap>(REFERENCE_TOML).map_err(|e| ConfigError::Unreadable {
        path: PathBuf::from("config/reference.toml"),
        source: e.into(),
    })
}

/// Read the settings file at `path` and validate it against the reference
/// schema.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let user = read_config_map(path)?;
    let reference = reference_schema()?;
    load_settings(&user, &reference)
}

/// Explicit overrides, highest precedence first. The CLI fills these from
/// flags; tests pass them directly instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub settings_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Where this run reads settings from, writes the ledger to, and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub settings_path: PathBuf,
    pub db_path: PathBuf,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Resolve from `overrides`, then `DETERGENT_CONFIG`, `DETERGENT_DB_PATH`,
    /// `DETERGENT_LOG_LEVEL` and `DETERGENT_LOG_FILE`, then defaults.
    pub fn resolve(overrides: RuntimeOverrides) -> Result<Self, AppError> {
        let env_overrides = RuntimeOverrides {
            settings_path: env::var_os("DETERGENT_CONFIG").map(PathBuf::from),
            db_path: env::var_os("DETERGENT_DB_PATH").map(PathBuf::from),
            log_level: env::var("DETERGENT_LOG_LEVEL").ok(),
        };
        let log_file = env::var_os("DETERGENT_LOG_FILE").map(PathBuf::from);
        Self::resolve_from(overrides, env_overrides, log_file)
    }

    /// Internal resolver with every input explicit.
    pub fn resolve_from(
        flags: RuntimeOverrides,
        env: RuntimeOverrides,
        log_file: Option<PathBuf>,
    ) -> Result<Self, AppError> {
        let settings_path = flags
            .settings_path
            .or(env.settings_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
        let db_path = flags
            .db_path
            .or(env.db_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let log_level = flags
            .log_level
            .or(env.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        logger::parse_level(&log_level)?;

        Ok(Self {
            settings_path: expand_path(&settings_path),
            db_path: expand_path(&db_path),
            log_level,
            log_file: log_file.as_deref().map(expand_path),
        })
    }
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home(s),
        None => path.to_path_buf(),
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
