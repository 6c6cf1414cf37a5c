//! Row filters.
//!
//! A filter computes a boolean indicator over the rows of a table and keeps
//! the rows where it is true. Selections that form one contiguous run share
//! storage with the input until the result is unlocked; anything else is
//! copied.
//!
//! Missing values (NaN, or the empty string) never satisfy a condition,
//! except for the explicit "is defined" checks. Filters are validated when
//! applied: a filter over a column the table lacks constructs fine and fails
//! on `apply`.
//!
//! ```
//! use tabular::filter::{FilterContinuous, FilterOperator, RowFilter};
//! use tabular::{Domain, Matrix, Table, Variable};
//!
//! let domain = Domain::new(vec![Variable::continuous("x")], vec![], vec![]).unwrap();
//! let table = Table::from_arrays(domain, Matrix::column_vector(vec![0.5, f64::NAN, 2.0]), None).unwrap();
//!
//! let kept = FilterContinuous::new("x", FilterOperator::Greater, 1.0).apply(&table).unwrap();
//! assert_eq!(kept.x().column(0), Some(vec![2.0]));
//! ```

use crate::domain::Key;
use crate::error::{Result, TableError};
use crate::table::{ColumnData, Table};
use crate::value::Value;
use crate::variable::Variable;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

// ==================== Operators ====================

/// Comparison operators of the continuous and string filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Between,
    Outside,
    IsDefined,
    Contains,
    StartsWith,
    EndsWith,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 12] = [
        FilterOperator::Equal,
        FilterOperator::NotEqual,
        FilterOperator::Less,
        FilterOperator::LessEqual,
        FilterOperator::Greater,
        FilterOperator::GreaterEqual,
        FilterOperator::Between,
        FilterOperator::Outside,
        FilterOperator::IsDefined,
        FilterOperator::Contains,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
    ];

    /// Operators that need `max` as well as `reference`.
    pub fn is_range(self) -> bool {
        matches!(self, FilterOperator::Between | FilterOperator::Outside)
    }

    fn is_textual(self) -> bool {
        matches!(
            self,
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith
        )
    }

    /// Compare by ordering only.
    fn holds(self, ord: Ordering, max_ord: Option<Ordering>) -> bool {
        match self {
            FilterOperator::Equal => ord == Ordering::Equal,
            FilterOperator::NotEqual => ord != Ordering::Equal,
            FilterOperator::Less => ord == Ordering::Less,
            FilterOperator::LessEqual => ord != Ordering::Greater,
            FilterOperator::Greater => ord == Ordering::Greater,
            FilterOperator::GreaterEqual => ord != Ordering::Less,
            FilterOperator::Between => ord != Ordering::Less && max_ord.map_or(false, |m| m != Ordering::Greater),
            FilterOperator::Outside => ord == Ordering::Less || max_ord.map_or(false, |m| m == Ordering::Greater),
            FilterOperator::IsDefined => true,
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => false,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ==================== Filter trait ====================

pub trait RowFilter {
    /// One flag per row of `table`.
    fn indicator(&self, table: &Table) -> Result<Vec<bool>>;

    fn apply(&self, table: &Table) -> Result<Table> {
        let mask = self.indicator(table)?;
        let out = table.filter_mask(&mask)?;
        log::debug!(
            "filter kept {} of {} rows of table '{}'",
            out.len(),
            table.len(),
            table.name()
        );
        Ok(out)
    }
}

fn negated(mask: Vec<bool>, negate: bool) -> Vec<bool> {
    if negate {
        mask.into_iter().map(|keep| !keep).collect()
    } else {
        mask
    }
}

/// AND of the per-column indicators; all rows when there are no columns.
fn all_of(n: usize, columns: impl Iterator<Item = Result<Vec<bool>>>) -> Result<Vec<bool>> {
    let mut mask = vec![true; n];
    for column in columns {
        for (keep, ok) in mask.iter_mut().zip(column?) {
            *keep &= ok;
        }
    }
    Ok(mask)
}

/// The named column, or every variable of the domain accepted by `kind`.
fn target_columns(
    table: &Table,
    column: Option<&Key>,
    kind: fn(&Variable) -> bool,
    what: &str,
) -> Result<Vec<(Variable, ColumnData)>> {
    match column {
        Some(key) => {
            let (var, data) = table.resolve_column(key)?;
            if !kind(&var) {
                return Err(TableError::Filter(format!(
                    "variable '{}' is not {}",
                    var.name(),
                    what
                )));
            }
            Ok(vec![(var, data)])
        }
        None => table
            .domain()
            .all_variables()
            .filter(|var| kind(var))
            .map(|var| Ok((var.clone(), table.get_column(var, false)?)))
            .collect(),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) if s.is_empty() => None,
        Value::Text(s) => Some(s.clone()),
        Value::Number(v) if v.is_nan() => None,
        Value::Number(v) => Some(v.to_string()),
    }
}

// ==================== IsDefined / HasClass ====================

/// Rows where every listed column (all columns when `None`) is defined.
#[derive(Debug, Clone, Default)]
pub struct IsDefined {
    pub columns: Option<Vec<Key>>,
    pub negate: bool,
}

impl IsDefined {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<K: Into<Key>>(columns: impl IntoIterator<Item = K>) -> Self {
        IsDefined {
            columns: Some(columns.into_iter().map(Into::into).collect()),
            negate: false,
        }
    }
}

impl RowFilter for IsDefined {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let columns: Vec<ColumnData> = match &self.columns {
            Some(keys) => keys
                .iter()
                .map(|key| table.resolve_column(key).map(|(_, data)| data))
                .collect::<Result<_>>()?,
            None => table
                .domain()
                .all_variables()
                .map(|var| table.get_column(var, false))
                .collect::<Result<_>>()?,
        };
        let mask = all_of(
            table.len(),
            columns
                .iter()
                .map(|data| Ok(data.missing_mask().into_iter().map(|missing| !missing).collect())),
        )?;
        Ok(negated(mask, self.negate))
    }
}

/// Rows with every class value defined.
#[derive(Debug, Clone, Default)]
pub struct HasClass {
    pub negate: bool,
}

impl RowFilter for HasClass {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let y = table.y();
        let mask = (0..table.len())
            .map(|r| y.row(r).unwrap_or_default().iter().all(|v| !v.is_nan()))
            .collect();
        Ok(negated(mask, self.negate))
    }
}

// ==================== Values ====================

/// Conjunction (or disjunction) of conditions.
#[derive(Debug, Clone)]
pub struct Values {
    pub conditions: Vec<Filter>,
    pub conjunction: bool,
    pub negate: bool,
}

impl Values {
    pub fn all(conditions: Vec<Filter>) -> Self {
        Values {
            conditions,
            conjunction: true,
            negate: false,
        }
    }

    pub fn any(conditions: Vec<Filter>) -> Self {
        Values {
            conditions,
            conjunction: false,
            negate: false,
        }
    }
}

impl RowFilter for Values {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let mut mask = vec![self.conjunction; table.len()];
        for condition in &self.conditions {
            let rows = condition.indicator(table)?;
            for (keep, ok) in mask.iter_mut().zip(rows) {
                if self.conjunction {
                    *keep &= ok;
                } else {
                    *keep |= ok;
                }
            }
        }
        Ok(negated(mask, self.negate))
    }
}

// ==================== Continuous ====================

/// Numeric comparison. Without a column the condition must hold for every
/// continuous and time variable.
#[derive(Debug, Clone)]
pub struct FilterContinuous {
    pub column: Option<Key>,
    pub oper: FilterOperator,
    pub reference: Option<f64>,
    pub max: Option<f64>,
}

impl FilterContinuous {
    pub fn new(column: impl Into<Key>, oper: FilterOperator, reference: f64) -> Self {
        FilterContinuous {
            column: Some(column.into()),
            oper,
            reference: Some(reference),
            max: None,
        }
    }

    pub fn between(column: impl Into<Key>, min: f64, max: f64) -> Self {
        FilterContinuous {
            column: Some(column.into()),
            oper: FilterOperator::Between,
            reference: Some(min),
            max: Some(max),
        }
    }

    /// The condition over every continuous variable.
    pub fn all_columns(oper: FilterOperator, reference: Option<f64>) -> Self {
        FilterContinuous {
            column: None,
            oper,
            reference,
            max: None,
        }
    }

    fn test(&self, value: f64, reference: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let ord = value.partial_cmp(&reference).unwrap_or(Ordering::Less);
        let max_ord = self.max.and_then(|max| value.partial_cmp(&max));
        self.oper.holds(ord, max_ord)
    }
}

impl RowFilter for FilterContinuous {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        if self.oper.is_textual() {
            return Err(TableError::Filter(format!(
                "operator {} does not apply to numbers",
                self.oper
            )));
        }
        let reference = match (self.oper, self.reference) {
            (FilterOperator::IsDefined, _) => 0.0,
            (_, Some(reference)) => reference,
            (oper, None) => {
                return Err(TableError::Filter(format!("operator {} needs a reference value", oper)))
            }
        };
        if self.oper.is_range() && self.max.is_none() {
            return Err(TableError::Filter(format!("operator {} needs a maximum", self.oper)));
        }
        let columns = target_columns(table, self.column.as_ref(), Variable::is_continuous, "continuous")?;
        all_of(
            table.len(),
            columns.iter().map(|(_, data)| {
                Ok(data
                    .to_f64()
                    .into_iter()
                    .map(|v| self.test(v, reference))
                    .collect())
            }),
        )
    }
}

// ==================== Discrete ====================

/// Membership of a discrete value in a set of labels or codes. With no
/// values, keeps rows where the value is defined.
#[derive(Debug, Clone)]
pub struct FilterDiscrete {
    pub column: Option<Key>,
    pub values: Option<Vec<Value>>,
}

impl FilterDiscrete {
    pub fn new<V: Into<Value>>(column: impl Into<Key>, values: impl IntoIterator<Item = V>) -> Self {
        FilterDiscrete {
            column: Some(column.into()),
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn defined(column: impl Into<Key>) -> Self {
        FilterDiscrete {
            column: Some(column.into()),
            values: None,
        }
    }
}

impl RowFilter for FilterDiscrete {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let key = self
            .column
            .as_ref()
            .ok_or_else(|| TableError::Filter("discrete filter needs a column".to_string()))?;
        let (var, data) = target_columns(table, Some(key), Variable::is_discrete, "discrete")?
            .into_iter()
            .next()
            .ok_or_else(|| TableError::Filter(format!("no column for {}", key)))?;

        let codes: Option<Vec<f64>> = match &self.values {
            None => None,
            Some(values) => Some(
                values
                    .iter()
                    .map(|value| match value {
                        Value::Number(code) => Ok(*code),
                        Value::Text(label) => var.to_code(label).map(|c| c as f64).ok_or_else(|| {
                            TableError::Filter(format!("'{}' is not a value of '{}'", label, var.name()))
                        }),
                    })
                    .collect::<Result<_>>()?,
            ),
        };
        Ok(data
            .to_f64()
            .into_iter()
            .map(|v| !v.is_nan() && codes.as_ref().map_or(true, |codes| codes.contains(&v)))
            .collect())
    }
}

// ==================== Strings ====================

/// Lexicographic comparison of text. Without a column the condition must
/// hold for every string variable.
#[derive(Debug, Clone)]
pub struct FilterString {
    pub column: Option<Key>,
    pub oper: FilterOperator,
    pub reference: Option<String>,
    pub max: Option<String>,
    pub case_sensitive: bool,
}

impl FilterString {
    pub fn new(column: impl Into<Key>, oper: FilterOperator, reference: impl Into<String>) -> Self {
        FilterString {
            column: Some(column.into()),
            oper,
            reference: Some(reference.into()),
            max: None,
            case_sensitive: true,
        }
    }

    pub fn between(column: impl Into<Key>, min: impl Into<String>, max: impl Into<String>) -> Self {
        FilterString {
            column: Some(column.into()),
            oper: FilterOperator::Between,
            reference: Some(min.into()),
            max: Some(max.into()),
            case_sensitive: true,
        }
    }

    pub fn all_columns(oper: FilterOperator, reference: Option<String>) -> Self {
        FilterString {
            column: None,
            oper,
            reference,
            max: None,
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }

    fn test(&self, value: Option<String>, reference: &str, max: Option<&str>) -> bool {
        let value = match value {
            Some(value) => self.fold(&value),
            None => return false,
        };
        match self.oper {
            FilterOperator::IsDefined => true,
            FilterOperator::Contains => value.contains(reference),
            FilterOperator::StartsWith => value.starts_with(reference),
            FilterOperator::EndsWith => value.ends_with(reference),
            oper => {
                let ord = value.as_str().cmp(reference);
                oper.holds(ord, max.map(|max| value.as_str().cmp(max)))
            }
        }
    }
}

impl RowFilter for FilterString {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let reference = match (self.oper, &self.reference) {
            (FilterOperator::IsDefined, _) => String::new(),
            (_, Some(reference)) => self.fold(reference),
            (oper, None) => {
                return Err(TableError::Filter(format!("operator {} needs a reference value", oper)))
            }
        };
        let max = self.max.as_deref().map(|max| self.fold(max));
        if self.oper.is_range() && max.is_none() {
            return Err(TableError::Filter(format!("operator {} needs a maximum", self.oper)));
        }
        let columns = target_columns(table, self.column.as_ref(), Variable::is_string, "a string variable")?;
        all_of(
            table.len(),
            columns.iter().map(|(_, data)| {
                Ok(data
                    .to_values()
                    .iter()
                    .map(|v| self.test(text_of(v), &reference, max.as_deref()))
                    .collect())
            }),
        )
    }
}

/// Membership of text in a list of strings.
#[derive(Debug, Clone)]
pub struct FilterStringList {
    pub column: Option<Key>,
    pub values: Vec<String>,
    pub case_sensitive: bool,
}

impl FilterStringList {
    pub fn new<S: Into<String>>(column: Option<Key>, values: impl IntoIterator<Item = S>) -> Self {
        FilterStringList {
            column,
            values: values.into_iter().map(Into::into).collect(),
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

impl RowFilter for FilterStringList {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let fold = |s: &str| if self.case_sensitive { s.to_string() } else { s.to_lowercase() };
        let values: Vec<String> = self.values.iter().map(|v| fold(v)).collect();
        let columns = target_columns(table, self.column.as_ref(), Variable::is_string, "a string variable")?;
        all_of(
            table.len(),
            columns.iter().map(|(_, data)| {
                Ok(data
                    .to_values()
                    .iter()
                    .map(|v| text_of(v).map_or(false, |s| values.contains(&fold(&s))))
                    .collect())
            }),
        )
    }
}

/// Rows whose text contains a match of `pattern`.
#[derive(Debug, Clone)]
pub struct FilterRegex {
    pub column: Option<Key>,
    pub pattern: String,
}

impl FilterRegex {
    pub fn new(column: Option<Key>, pattern: impl Into<String>) -> Self {
        FilterRegex {
            column,
            pattern: pattern.into(),
        }
    }
}

impl RowFilter for FilterRegex {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let regex = Regex::new(&self.pattern)?;
        let columns = target_columns(table, self.column.as_ref(), Variable::is_string, "a string variable")?;
        all_of(
            table.len(),
            columns.iter().map(|(_, data)| {
                Ok(data
                    .to_values()
                    .iter()
                    .map(|v| text_of(v).map_or(false, |s| regex.is_match(&s)))
                    .collect())
            }),
        )
    }
}

// ==================== SameValue ====================

/// Rows where a column equals a single value, given in the variable's
/// readable form or as its stored number.
#[derive(Debug, Clone)]
pub struct SameValue {
    pub column: Key,
    pub value: Value,
    pub negate: bool,
}

impl SameValue {
    pub fn new(column: impl Into<Key>, value: impl Into<Value>) -> Self {
        SameValue {
            column: column.into(),
            value: value.into(),
            negate: false,
        }
    }
}

impl RowFilter for SameValue {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        let (var, data) = table.resolve_column(&self.column)?;
        let target = var
            .coerce(&self.value, &table.config().missing_values)
            .map_err(|e| TableError::Filter(e.to_string()))?;
        let mask = data
            .to_values()
            .iter()
            .map(|v| match (v, &target) {
                (Value::Number(a), Value::Number(b)) => !a.is_nan() && a == b,
                (a, b) => !a.is_missing() && a == b,
            })
            .collect();
        Ok(negated(mask, self.negate))
    }
}

// ==================== Filter ====================

/// Names of the filter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    IsDefined,
    HasClass,
    Values,
    Continuous,
    Discrete,
    String,
    StringList,
    Regex,
    SameValue,
    Not,
}

impl FilterKind {
    pub const ALL: [FilterKind; 10] = [
        FilterKind::IsDefined,
        FilterKind::HasClass,
        FilterKind::Values,
        FilterKind::Continuous,
        FilterKind::Discrete,
        FilterKind::String,
        FilterKind::StringList,
        FilterKind::Regex,
        FilterKind::SameValue,
        FilterKind::Not,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::IsDefined => "IsDefined",
            FilterKind::HasClass => "HasClass",
            FilterKind::Values => "Values",
            FilterKind::Continuous => "FilterContinuous",
            FilterKind::Discrete => "FilterDiscrete",
            FilterKind::String => "FilterString",
            FilterKind::StringList => "FilterStringList",
            FilterKind::Regex => "FilterRegex",
            FilterKind::SameValue => "SameValue",
            FilterKind::Not => "Not",
        }
    }

    pub fn from_name(name: &str) -> Option<FilterKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

/// Any row filter.
#[derive(Debug, Clone)]
pub enum Filter {
    IsDefined(IsDefined),
    HasClass(HasClass),
    Values(Values),
    Continuous(FilterContinuous),
    Discrete(FilterDiscrete),
    String(FilterString),
    StringList(FilterStringList),
    Regex(FilterRegex),
    SameValue(SameValue),
    Not(Box<Filter>),
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::IsDefined(_) => FilterKind::IsDefined,
            Filter::HasClass(_) => FilterKind::HasClass,
            Filter::Values(_) => FilterKind::Values,
            Filter::Continuous(_) => FilterKind::Continuous,
            Filter::Discrete(_) => FilterKind::Discrete,
            Filter::String(_) => FilterKind::String,
            Filter::StringList(_) => FilterKind::StringList,
            Filter::Regex(_) => FilterKind::Regex,
            Filter::SameValue(_) => FilterKind::SameValue,
            Filter::Not(_) => FilterKind::Not,
        }
    }

    /// The complement of this filter.
    pub fn negate(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }
}

impl RowFilter for Filter {
    fn indicator(&self, table: &Table) -> Result<Vec<bool>> {
        match self {
            Filter::IsDefined(f) => f.indicator(table),
            Filter::HasClass(f) => f.indicator(table),
            Filter::Values(f) => f.indicator(table),
            Filter::Continuous(f) => f.indicator(table),
            Filter::Discrete(f) => f.indicator(table),
            Filter::String(f) => f.indicator(table),
            Filter::StringList(f) => f.indicator(table),
            Filter::Regex(f) => f.indicator(table),
            Filter::SameValue(f) => f.indicator(table),
            Filter::Not(inner) => Ok(negated(inner.indicator(table)?, true)),
        }
    }
}

macro_rules! impl_from_filter {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Filter {
                fn from(f: $ty) -> Self {
                    Filter::$variant(f)
                }
            }
        )*
    };
}

impl_from_filter!(
    IsDefined => IsDefined,
    HasClass => HasClass,
    Values => Values,
    FilterContinuous => Continuous,
    FilterDiscrete => Discrete,
    FilterString => String,
    FilterStringList => StringList,
    FilterRegex => Regex,
    SameValue => SameValue,
);

fn column_label(column: &Option<Key>) -> String {
    column.as_ref().map_or_else(|| "*".to_string(), |key| key.to_string())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::IsDefined(d) => {
                let columns = d.columns.as_ref().map_or_else(
                    || "*".to_string(),
                    |keys| keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", "),
                );
                write!(f, "{}({})", if d.negate { "IsUndefined" } else { "IsDefined" }, columns)
            }
            Filter::HasClass(h) => write!(f, "HasClass(negate={})", h.negate),
            Filter::Values(v) => {
                let glue = if v.conjunction { " AND " } else { " OR " };
                let parts: Vec<String> = v.conditions.iter().map(|c| c.to_string()).collect();
                if v.negate {
                    write!(f, "NOT ({})", parts.join(glue))
                } else {
                    write!(f, "({})", parts.join(glue))
                }
            }
            Filter::Continuous(c) => write!(
                f,
                "{} {} {}{}",
                column_label(&c.column),
                c.oper,
                c.reference.map_or_else(|| "?".to_string(), |r| r.to_string()),
                c.max.map_or_else(String::new, |m| format!("..{}", m))
            ),
            Filter::Discrete(d) => write!(f, "{} in {:?}", column_label(&d.column), d.values),
            Filter::String(s) => write!(
                f,
                "{} {} '{}'",
                column_label(&s.column),
                s.oper,
                s.reference.as_deref().unwrap_or("?")
            ),
            Filter::StringList(s) => write!(f, "{} in {:?}", column_label(&s.column), s.values),
            Filter::Regex(r) => write!(f, "{} ~ /{}/", column_label(&r.column), r.pattern),
            Filter::SameValue(s) => {
                write!(f, "{} {} {}", s.column, if s.negate { "!=" } else { "==" }, s.value)
            }
            Filter::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}
