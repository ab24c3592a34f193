//! Settings loading and runtime configuration.
//!
//! # Module layout
//!
//! - **settings** — The validated `Settings` record and the pure
//!   `load_settings` check of a parsed mapping against the reference schema.
//! - **load** — Reading settings files (TOML or JSON), the embedded reference
//!   schema, and `RuntimeConfig` resolution from flags and `DETERGENT_*`
//!   env overrides.

mod load;
mod settings;

pub use load::{
    expand_home, load_settings_from, read_config_map, reference_schema, RuntimeConfig,
    RuntimeOverrides,
};
pub use settings::{load_settings, ConfigMap, Settings};
