/// Cell values stored in tables.
///
/// Numeric blocks (X, Y, W and numeric metas) hold plain `f64`, with NaN
/// marking a missing value. Object blocks (metas holding text) hold
/// [`Value`], where a missing entry is either a NaN number or an empty string.

use std::fmt;

/// A single cell of an object block.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// The canonical missing value.
    pub fn missing() -> Self {
        Value::Number(f64::NAN)
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Value::Number(v) => v.is_nan(),
            Value::Text(s) => s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) if v.is_nan() => write!(f, "?"),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Element types a storage buffer can hold.
pub trait Element: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The implicit value of an absent sparse entry.
    fn zero() -> Self;

    fn missing() -> Self;

    fn is_missing(&self) -> bool;

    fn is_zero(&self) -> bool;

    fn to_value(&self) -> Value;
}

impl Element for f64 {
    fn zero() -> Self {
        0.0
    }

    fn missing() -> Self {
        f64::NAN
    }

    fn is_missing(&self) -> bool {
        self.is_nan()
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }

    fn to_value(&self) -> Value {
        Value::Number(*self)
    }
}

impl Element for Value {
    fn zero() -> Self {
        Value::Number(0.0)
    }

    fn missing() -> Self {
        Value::missing()
    }

    fn is_missing(&self) -> bool {
        Value::is_missing(self)
    }

    fn is_zero(&self) -> bool {
        matches!(self, Value::Number(v) if *v == 0.0)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}
