use serde_json::Value;

use crate::error::{ConfigError, ShapeMismatch};

/// A flat, already-parsed settings mapping. Both TOML and JSON files are
/// read into this shape.
pub type ConfigMap = serde_json::Map<String, Value>;

/// Validated detergent settings. Re-derived from the settings file on every
/// run; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    bottle_volume: f64,
    cup_volume: f64,
}

impl Settings {
    /// Build settings directly, applying the same positivity rule as
    /// [`load_settings`].
    pub fn new(bottle_volume: f64, cup_volume: f64) -> Result<Self, ConfigError> {
        ensure_positive("bottle_volume", bottle_volume)?;
        ensure_positive("cup_volume", cup_volume)?;
        Ok(Self { bottle_volume, cup_volume })
    }

    /// Total volume of a fresh bottle.
    pub fn bottle_volume(&self) -> f64 {
        self.bottle_volume
    }

    /// Volume dispensed by one measuring cup.
    pub fn cup_volume(&self) -> f64 {
        self.cup_volume
    }
}

/// Validate `user` against the key set of `reference` and extract settings.
///
/// Checks run in a fixed order: key count, key names, then per key (sorted)
/// the value type followed by its sign.
pub fn load_settings(user: &ConfigMap, reference: &ConfigMap) -> Result<Settings, ConfigError> {
    let (expected, actual) = (reference.len(), user.len());
    if expected != actual {
        return Err(ConfigError::Shape(ShapeMismatch::KeyCount { expected, actual }));
    }

    let expected_keys = sorted_keys(reference);
    let actual_keys = sorted_keys(user);
    if expected_keys != actual_keys {
        return Err(ConfigError::Shape(ShapeMismatch::KeySet {
            expected: expected_keys,
            actual: actual_keys,
        }));
    }

    for key in &actual_keys {
        let number = as_real(key, &user[key.as_str()])?;
        ensure_positive(key, number)?;
    }

    Settings::new(real(user, "bottle_volume")?, real(user, "cup_volume")?)
}

fn sorted_keys(map: &ConfigMap) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

/// Look up a key the reference schema must provide.
fn real(map: &ConfigMap, key: &str) -> Result<f64, ConfigError> {
    match map.get(key) {
        Some(value) => as_real(key, value),
        None => Err(ConfigError::Shape(ShapeMismatch::KeySet {
            expected: vec![key.to_string()],
            actual: sorted_keys(map),
        })),
    }
}

fn as_real(key: &str, value: &Value) -> Result<f64, ConfigError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| ConfigError::Type {
            key: key.to_string(),
            actual: type_name(value),
        }),
        other => Err(ConfigError::Type {
            key: key.to_string(),
            actual: type_name(other),
        }),
    }
}

fn ensure_positive(key: &str, value: f64) -> Result<(), ConfigError> {
    // NaN fails `> 0.0` as well.
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Value { key: key.to_string(), value })
    }
}

/// Type names as a settings file author would call them.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}
