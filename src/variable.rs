/// Typed variables (columns) of a domain.
///
/// A `Variable` is a cheap, shareable handle: cloning it clones an `Arc`.
/// Identity is the variable's name plus its kind tag. Discrete variables
/// additionally carry an ordered list of labels; a stored code `i` stands for
/// `values[i]`. Time variables hold seconds since the Unix epoch.
///
/// A variable can be *derived*: it carries a [`ComputeValue`] that produces
/// its column from a table on demand instead of reading stored data.

use crate::config::MissingValues;
use crate::error::{Result, TableError};
use crate::table::{ColumnData, Table};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Signature of a column-producing function.
pub type ComputeFn = dyn Fn(&Table) -> Result<ColumnData> + Send + Sync;

/// Shared handle to the function of a derived variable.
#[derive(Clone)]
pub struct ComputeValue(Arc<ComputeFn>);

impl ComputeValue {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Table) -> Result<ColumnData> + Send + Sync + 'static,
    {
        ComputeValue(Arc::new(f))
    }

    pub fn compute(&self, table: &Table) -> Result<ColumnData> {
        (self.0)(table)
    }

    pub fn ptr_eq(&self, other: &ComputeValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ComputeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<compute_value>")
    }
}

/// Kind of a variable, with its kind-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableKind {
    Continuous { number_of_decimals: Option<usize> },
    Discrete { values: Vec<String> },
    String,
    Time { have_date: bool, have_time: bool },
}

/// Kind tag, without settings. Part of a variable's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    Continuous,
    Discrete,
    String,
    Time,
}

impl VariableKind {
    pub fn var_type(&self) -> VarType {
        match self {
            VariableKind::Continuous { .. } => VarType::Continuous,
            VariableKind::Discrete { .. } => VarType::Discrete,
            VariableKind::String => VarType::String,
            VariableKind::Time { .. } => VarType::Time,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarType::Continuous => "continuous",
            VarType::Discrete => "discrete",
            VarType::String => "string",
            VarType::Time => "time",
        };
        write!(f, "{}", name)
    }
}

struct VariableInner {
    name: String,
    kind: VariableKind,
    compute_value: Option<ComputeValue>,
}

#[derive(Clone)]
pub struct Variable(Arc<VariableInner>);

impl Variable {
    fn from_parts(name: String, kind: VariableKind, compute_value: Option<ComputeValue>) -> Self {
        Variable(Arc::new(VariableInner {
            name,
            kind,
            compute_value,
        }))
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self::from_parts(
            name.into(),
            VariableKind::Continuous {
                number_of_decimals: None,
            },
            None,
        )
    }

    pub fn continuous_with_decimals(name: impl Into<String>, number_of_decimals: usize) -> Self {
        Self::from_parts(
            name.into(),
            VariableKind::Continuous {
                number_of_decimals: Some(number_of_decimals),
            },
            None,
        )
    }

    /// Discrete variable with the given ordered labels; labels must be distinct.
    pub fn discrete<I, S>(name: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        for (i, value) in values.iter().enumerate() {
            if values[..i].contains(value) {
                return Err(TableError::Schema(format!(
                    "discrete variable '{}' lists value '{}' more than once",
                    name, value
                )));
            }
        }
        Ok(Self::from_parts(name, VariableKind::Discrete { values }, None))
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), VariableKind::String, None)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::time_with(name, true, true)
    }

    pub fn time_with(name: impl Into<String>, have_date: bool, have_time: bool) -> Self {
        Self::from_parts(
            name.into(),
            VariableKind::Time {
                have_date,
                have_time,
            },
            None,
        )
    }

    pub(crate) fn from_kind(name: impl Into<String>, kind: VariableKind) -> Self {
        Self::from_parts(name.into(), kind, None)
    }

    /// A derived copy of this variable whose column is produced by `f`.
    pub fn with_compute_value<F>(&self, f: F) -> Self
    where
        F: Fn(&Table) -> Result<ColumnData> + Send + Sync + 'static,
    {
        Self::from_parts(
            self.0.name.clone(),
            self.0.kind.clone(),
            Some(ComputeValue::new(f)),
        )
    }

    /// A stored copy of this variable under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), self.0.kind.clone(), None)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &VariableKind {
        &self.0.kind
    }

    pub fn var_type(&self) -> VarType {
        self.0.kind.var_type()
    }

    pub fn compute_value(&self) -> Option<&ComputeValue> {
        self.0.compute_value.as_ref()
    }

    pub fn is_derived(&self) -> bool {
        self.0.compute_value.is_some()
    }

    /// Labels of a discrete variable; empty for every other kind.
    pub fn values(&self) -> &[String] {
        match &self.0.kind {
            VariableKind::Discrete { values } => values,
            _ => &[],
        }
    }

    /// Continuous, discrete and time variables store numbers.
    pub fn is_primitive(&self) -> bool {
        !self.is_string()
    }

    /// True for continuous and time variables.
    pub fn is_continuous(&self) -> bool {
        matches!(
            self.0.kind,
            VariableKind::Continuous { .. } | VariableKind::Time { .. }
        )
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self.0.kind, VariableKind::Discrete { .. })
    }

    pub fn is_string(&self) -> bool {
        matches!(self.0.kind, VariableKind::String)
    }

    pub fn is_time(&self) -> bool {
        matches!(self.0.kind, VariableKind::Time { .. })
    }

    /// Code of a discrete label.
    pub fn to_code(&self, label: &str) -> Option<usize> {
        self.values().iter().position(|v| v == label)
    }

    /// Coerce a raw value into this variable's storage representation.
    ///
    /// Primitive variables yield `Value::Number`, string variables yield
    /// `Value::Text`.
    pub fn coerce(&self, raw: &Value, missing: &MissingValues) -> Result<Value> {
        match &self.0.kind {
            VariableKind::String => Ok(match raw {
                Value::Text(s) => Value::Text(s.clone()),
                Value::Number(v) if v.is_nan() => Value::Text(String::new()),
                Value::Number(v) => Value::Text(v.to_string()),
            }),
            VariableKind::Continuous { .. } => match raw {
                Value::Number(v) => Ok(Value::Number(*v)),
                Value::Text(s) if missing.is_missing(s) => Ok(Value::missing()),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| TableError::parse(self.name(), s.as_str(), "not a number")),
            },
            VariableKind::Discrete { values } => match raw {
                Value::Number(v) if v.is_nan() => Ok(Value::missing()),
                Value::Number(v) => {
                    if v.fract() == 0.0 && *v >= 0.0 && (*v as usize) < values.len() {
                        Ok(Value::Number(*v))
                    } else {
                        Err(TableError::parse(
                            self.name(),
                            v.to_string(),
                            format!("not a code of {} values", values.len()),
                        ))
                    }
                }
                Value::Text(s) if missing.is_missing(s) => Ok(Value::missing()),
                Value::Text(s) => self
                    .to_code(s)
                    .map(|code| Value::Number(code as f64))
                    .ok_or_else(|| TableError::parse(self.name(), s.as_str(), "unknown value")),
            },
            VariableKind::Time { .. } => match raw {
                Value::Number(v) => Ok(Value::Number(*v)),
                Value::Text(s) if missing.is_missing(s) => Ok(Value::missing()),
                Value::Text(s) => parse_time(s)
                    .map(Value::Number)
                    .ok_or_else(|| TableError::parse(self.name(), s.as_str(), "not an ISO 8601 time")),
            },
        }
    }

    /// Coerce with the default missing-value markers.
    pub fn to_val(&self, raw: impl Into<Value>) -> Result<Value> {
        self.coerce(&raw.into(), &MissingValues::default())
    }

    /// Human-readable form of a stored value; `?` for missing.
    pub fn str_val(&self, value: &Value) -> String {
        if value.is_missing() {
            return "?".to_string();
        }
        match (&self.0.kind, value) {
            (_, Value::Text(s)) => s.clone(),
            (VariableKind::Continuous { number_of_decimals }, Value::Number(v)) => {
                match number_of_decimals {
                    Some(decimals) => format!("{:.*}", *decimals, v),
                    None => v.to_string(),
                }
            }
            (VariableKind::Discrete { values }, Value::Number(v)) => values
                .get(*v as usize)
                .cloned()
                .unwrap_or_else(|| "?".to_string()),
            (
                VariableKind::Time {
                    have_date,
                    have_time,
                },
                Value::Number(v),
            ) => format_time(*v, *have_date, *have_time),
            (VariableKind::String, Value::Number(v)) => v.to_string(),
        }
    }

    /// Constructor-style description listing the non-default fields.
    pub fn describe(&self) -> String {
        let mut out = match &self.0.kind {
            VariableKind::Continuous { number_of_decimals } => {
                let mut s = format!("ContinuousVariable(name='{}'", self.name());
                if let Some(d) = number_of_decimals {
                    s.push_str(&format!(", number_of_decimals={}", d));
                }
                s
            }
            VariableKind::Discrete { values } => {
                let labels: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                format!(
                    "DiscreteVariable(name='{}', values=[{}]",
                    self.name(),
                    labels.join(", ")
                )
            }
            VariableKind::String => format!("StringVariable(name='{}'", self.name()),
            VariableKind::Time {
                have_date,
                have_time,
            } => format!(
                "TimeVariable(name='{}', have_date={}, have_time={}",
                self.name(),
                have_date,
                have_time
            ),
        };
        if self.is_derived() {
            out.push_str(", compute_value=<fn>");
        }
        out.push(')');
        out
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let same_source = match (&self.0.compute_value, &other.0.compute_value) {
            (None, None) => true,
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        };
        same_source && self.0.name == other.0.name && self.var_type() == other.var_type()
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
        self.var_type().hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ==================== Time parsing ====================

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Seconds since the epoch for an ISO 8601 date, date-time or time of day.
/// Naive inputs are read as UTC; times of day count from midnight.
pub fn parse_time(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(seconds(dt.naive_utc()));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(seconds(dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(seconds);
    }
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(raw, fmt) {
            return Some(t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 * 1e-9);
        }
    }
    raw.parse::<f64>().ok()
}

fn seconds(dt: NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 * 1e-9
}

fn format_time(value: f64, have_date: bool, have_time: bool) -> String {
    let secs = value.floor();
    let nanos = (((value - secs) * 1e9).round() as u32).min(999_999_999);
    let dt = match DateTime::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt,
        None => return value.to_string(),
    };
    let fmt = match (have_date, have_time) {
        (true, false) => "%Y-%m-%d",
        (false, true) => "%H:%M:%S%.f",
        _ => "%Y-%m-%d %H:%M:%S%.f",
    };
    dt.format(fmt).to_string()
}
