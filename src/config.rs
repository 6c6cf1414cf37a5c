//! Table configuration.
//!
//! Every table captures a [`TableConfig`] when it is built. The `locking`
//! field decides whether the table's buffers start read-only; its default
//! comes from a process-wide switch that can be flipped at runtime or seeded
//! from the `TABULAR_LOCKING` environment variable. Flipping the switch only
//! affects tables created afterwards.

use crate::error::{Result, TableError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Environment variable consulted for the initial locking default.
pub const LOCKING_ENV: &str = "TABULAR_LOCKING";

fn locking_switch() -> &'static AtomicBool {
    static SWITCH: OnceLock<AtomicBool> = OnceLock::new();
    SWITCH.get_or_init(|| {
        let initial = std::env::var(LOCKING_ENV)
            .ok()
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(true);
        log::debug!("table locking default initialised to {}", initial);
        AtomicBool::new(initial)
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Current process-wide locking default.
pub fn default_locking() -> bool {
    locking_switch().load(Ordering::SeqCst)
}

/// Change the process-wide locking default for tables created from now on.
pub fn set_default_locking(enabled: bool) {
    log::debug!("table locking default set to {}", enabled);
    locking_switch().store(enabled, Ordering::SeqCst);
}

/// Textual markers that denote a missing value when coercing raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingValues {
    /// Patterns to treat as missing
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,
}

impl Default for MissingValues {
    fn default() -> Self {
        Self {
            patterns: ["", "?", ".", "~", "nan", "NA", "N/A"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            trim_whitespace: true,
        }
    }
}

impl MissingValues {
    pub fn is_missing(&self, raw: &str) -> bool {
        let raw = if self.trim_whitespace { raw.trim() } else { raw };
        self.patterns.iter().any(|p| p == raw)
    }

    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }
}

/// Per-table settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Buffers start read-only and need an unlocked scope for writes.
    pub locking: bool,

    /// Markers treated as missing by `Table::from_list` and `add_column`.
    pub missing_values: MissingValues,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            locking: default_locking(),
            missing_values: MissingValues::default(),
        }
    }
}

impl TableConfig {
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn with_missing_values(mut self, missing_values: MissingValues) -> Self {
        self.missing_values = missing_values;
        self
    }

    /// Defaults, with `locking` overridden by `TABULAR_LOCKING` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(LOCKING_ENV) {
            config.locking = parse_flag(&raw).ok_or_else(|| {
                TableError::Config(format!("{} must be a boolean, got '{}'", LOCKING_ENV, raw))
            })?;
        }
        Ok(config)
    }

    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TableError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_patterns() {
        let missing = MissingValues::default();
        assert!(missing.is_missing(""));
        assert!(missing.is_missing(" ? "));
        assert!(missing.is_missing("NA"));
        assert!(!missing.is_missing("0"));
        assert!(!missing.is_missing("na"));
    }

    #[test]
    fn test_missing_without_trim() {
        let mut missing = MissingValues::default();
        missing.trim_whitespace = false;
        assert!(!missing.is_missing(" ? "));
        missing.add_pattern(" ? ");
        missing.add_pattern(" ? ");
        assert!(missing.is_missing(" ? "));
        assert_eq!(missing.patterns.iter().filter(|p| *p == " ? ").count(), 1);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_config_from_json() {
        let config = TableConfig::from_json(r#"{"locking": false}"#).unwrap();
        assert!(!config.locking);
        assert_eq!(config.missing_values, MissingValues::default());

        let config = TableConfig::from_json(
            r#"{"locking": true, "missing_values": {"patterns": ["-"], "trim_whitespace": false}}"#,
        )
        .unwrap();
        assert!(config.locking);
        assert!(config.missing_values.is_missing("-"));
        assert!(!config.missing_values.is_missing(""));
    }

    #[test]
    fn test_config_from_bad_json() {
        assert!(matches!(
            TableConfig::from_json("{locking"),
            Err(TableError::Config(_))
        ));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = TableConfig::default().with_locking(false);
        let restored = TableConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, restored);
    }
}
