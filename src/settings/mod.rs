//! Persisted optimizer settings.
//!
//! Settings live in a flat, string-keyed store that the optimizer only reads.
//! `OptimizerConfig::from_store` turns them into a validated config once, at
//! run start.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::domain::{Axis, OptimizerConfig};
use crate::error::AppError;

pub const KEY_SCAN_POINTS: &str = "Scan_points";
pub const KEY_COUNT_TIME: &str = "Count_time";
pub const KEY_THRESHOLD_FRACTION: &str = "Threshold_fraction";

/// Environment variable naming the default settings file.
pub const SETTINGS_ENV: &str = "OPTIMIZER_SETTINGS";

/// Read-only settings lookup.
///
/// `Ok(None)` means the key is absent; a present value of the wrong type is an
/// error.
pub trait SettingsStore {
    fn get_f64(&self, key: &str) -> Result<Option<f64>, AppError>;

    fn get_usize(&self, key: &str) -> Result<Option<usize>, AppError> {
        match self.get_f64(key)? {
            None => Ok(None),
            Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as usize)),
            Some(v) => Err(AppError::config(format!(
                "Setting '{key}' must be a non-negative integer (got {v})."
            ))),
        }
    }
}

/// Settings backed by a flat JSON object, e.g. `{"Range_Vx": 0.2, "Scan_points": 31}`.
#[derive(Debug, Clone, Default)]
pub struct JsonSettings {
    values: Map<String, Value>,
}

impl JsonSettings {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::config(format!("Failed to open settings '{}': {e}", path.display()))
        })?;
        let value: Value = serde_json::from_reader(file).map_err(|e| {
            AppError::config(format!("Invalid settings JSON '{}': {e}", path.display()))
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, AppError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(AppError::config(format!(
                "Settings must be a JSON object (got {}).",
                json_kind(&other)
            ))),
        }
    }
}

impl SettingsStore for JsonSettings {
    fn get_f64(&self, key: &str) -> Result<Option<f64>, AppError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| AppError::config(format!("Setting '{key}' is not representable as f64."))),
            Some(other) => Err(AppError::config(format!(
                "Setting '{key}' must be a number (got {}).",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// In-memory settings.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, f64>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

impl SettingsStore for MemorySettings {
    fn get_f64(&self, key: &str) -> Result<Option<f64>, AppError> {
        Ok(self.values.get(key).copied())
    }
}

impl OptimizerConfig {
    /// Read every optimizer setting, falling back to defaults for missing keys.
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, AppError> {
        let mut config = Self::default();
        for axis in Axis::ALL {
            if let Some(range) = store.get_f64(axis.range_key())? {
                config.ranges[axis.index()] = range;
            }
        }
        if let Some(points) = store.get_usize(KEY_SCAN_POINTS)? {
            config.scan_points = points;
        }
        if let Some(ms) = store.get_f64(KEY_COUNT_TIME)? {
            config.count_time_ms = ms;
        }
        if let Some(fraction) = store.get_f64(KEY_THRESHOLD_FRACTION)? {
            config.threshold_fraction = fraction;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Settings file named by `OPTIMIZER_SETTINGS`, after loading `.env`.
pub fn settings_path_from_env() -> Option<PathBuf> {
    dotenvy::dotenv().ok();
    std::env::var_os(SETTINGS_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
