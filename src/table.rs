/// Table Implementation
///
/// A Table binds row data to a [`Domain`]. Values live in four blocks:
/// X (attributes), Y (class variables), metas and W (weights), plus one id
/// per row. Blocks may be dense or sparse and may be views into another
/// table's storage. Every transforming operation returns a new table; blocks
/// that did not change are shared rather than copied.
///
/// Tables built with locking enabled are read-only until the caller enters an
/// unlocked scope (see [`crate::lock`]).
///
/// # Examples
///
/// ```
/// use tabular::{Domain, Table, Value, Variable};
///
/// let domain = Domain::new(
///     vec![Variable::continuous("height"), Variable::continuous("weight")],
///     vec![Variable::discrete("size", ["small", "large"]).unwrap()],
///     vec![Variable::string("name")],
/// ).unwrap();
///
/// let table = Table::from_list(
///     domain,
///     &[
///         vec![1.2.into(), 30.0.into(), "small".into(), "ann".into()],
///         vec![1.9.into(), 95.0.into(), "large".into(), "bob".into()],
///     ],
///     None,
/// ).unwrap();
///
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.y().get(1, 0), Some(1.0));
/// assert_eq!(table.metas().get(0, 0), Some(Value::from("ann")));
/// ```

use crate::config::TableConfig;
use crate::domain::{Domain, Key, Role};
use crate::error::{LockError, Result, TableError};
use crate::lock::{Part, Unlocked};
use crate::matrix::{Matrix, MetaBlock};
use crate::value::Value;
use crate::variable::Variable;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Name given to tables that were not named explicitly.
pub const DEFAULT_NAME: &str = "untitled";

static NEXT_ID: AtomicI64 = AtomicI64::new(0);

/// Reserve `n` fresh row ids. Ids are never reused within a process.
pub fn new_ids(n: usize) -> Vec<i64> {
    let start = NEXT_ID.fetch_add(n as i64, Ordering::SeqCst);
    (start..start + n as i64).collect()
}

// ==================== Column data ====================

/// A single column returned by [`Table::get_column`], as a one-column matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Matrix<f64>),
    Object(Matrix<Value>),
}

impl ColumnData {
    pub fn numeric(values: Vec<f64>) -> Self {
        ColumnData::Numeric(Matrix::column_vector(values))
    }

    pub fn object(values: Vec<Value>) -> Self {
        ColumnData::Object(Matrix::column_vector(values))
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(m) => m.nrows(),
            ColumnData::Object(m) => m.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_view(&self) -> bool {
        match self {
            ColumnData::Numeric(m) => m.is_view(),
            ColumnData::Object(m) => m.is_view(),
        }
    }

    pub fn as_numeric(&self) -> Option<&Matrix<f64>> {
        match self {
            ColumnData::Numeric(m) => Some(m),
            ColumnData::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Matrix<Value>> {
        match self {
            ColumnData::Object(m) => Some(m),
            ColumnData::Numeric(_) => None,
        }
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Numeric(m) => m.get(row, 0).map(Value::Number),
            ColumnData::Object(m) => m.get(row, 0),
        }
    }

    pub fn to_values(&self) -> Vec<Value> {
        match self {
            ColumnData::Numeric(m) => m.to_vec().into_iter().map(Value::Number).collect(),
            ColumnData::Object(m) => m.to_vec(),
        }
    }

    /// Numbers as stored; text cells read as NaN.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ColumnData::Numeric(m) => m.to_vec(),
            ColumnData::Object(m) => m
                .to_vec()
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect(),
        }
    }

    /// Per-row missing flags (NaN or empty text).
    pub fn missing_mask(&self) -> Vec<bool> {
        match self {
            ColumnData::Numeric(m) => m.to_vec().iter().map(|v| v.is_nan()).collect(),
            ColumnData::Object(m) => m.to_vec().iter().map(Value::is_missing).collect(),
        }
    }

    /// Owned copy of the data.
    pub fn copy(&self) -> ColumnData {
        match self {
            ColumnData::Numeric(m) => ColumnData::Numeric(m.copy()),
            ColumnData::Object(m) => ColumnData::Object(m.copy()),
        }
    }
}

// ==================== Builder ====================

/// Builder for tables from prepared blocks.
///
/// Omitted Y, metas and W become zero-width blocks; omitted ids are drawn
/// fresh. When Y is omitted and X is as wide as attributes plus class
/// variables, X is split in two.
pub struct TableBuilder {
    domain: Arc<Domain>,
    x: Option<Matrix<f64>>,
    y: Option<Matrix<f64>>,
    metas: Option<MetaBlock>,
    w: Option<Matrix<f64>>,
    ids: Option<Vec<i64>>,
    attributes: Map<String, JsonValue>,
    name: Option<String>,
    config: Option<TableConfig>,
}

impl TableBuilder {
    pub fn new(domain: impl Into<Arc<Domain>>) -> Self {
        TableBuilder {
            domain: domain.into(),
            x: None,
            y: None,
            metas: None,
            w: None,
            ids: None,
            attributes: Map::new(),
            name: None,
            config: None,
        }
    }

    pub fn x(mut self, x: Matrix<f64>) -> Self {
        self.x = Some(x);
        self
    }

    pub fn y(mut self, y: Matrix<f64>) -> Self {
        self.y = Some(y);
        self
    }

    pub fn metas(mut self, metas: impl Into<MetaBlock>) -> Self {
        self.metas = Some(metas.into());
        self
    }

    pub fn w(mut self, w: Matrix<f64>) -> Self {
        self.w = Some(w);
        self
    }

    pub fn weights(self, weights: Vec<f64>) -> Self {
        self.w(Matrix::column_vector(weights))
    }

    pub fn ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn attributes(mut self, attributes: Map<String, JsonValue>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Table> {
        let domain = self.domain;
        let n_attrs = domain.attributes().len();
        let n_class = domain.class_vars().len();
        let n_metas = domain.metas().len();

        let nrows = self
            .x
            .as_ref()
            .map(Matrix::nrows)
            .or_else(|| self.y.as_ref().map(Matrix::nrows))
            .or_else(|| self.metas.as_ref().map(MetaBlock::nrows))
            .or_else(|| self.w.as_ref().map(Matrix::nrows))
            .or_else(|| self.ids.as_ref().map(Vec::len))
            .unwrap_or(0);

        let mut x = self.x.unwrap_or_else(|| Matrix::zeros(nrows, 0));
        let y = match self.y {
            Some(y) => y,
            None if n_class > 0 && x.ncols() == n_attrs + n_class => {
                let y = x.cols_view(n_attrs..n_attrs + n_class)?.copy();
                x = x.cols_view(0..n_attrs)?.copy();
                y
            }
            None => Matrix::zeros(nrows, 0),
        };
        let mut metas = self.metas.unwrap_or_else(|| MetaBlock::empty(nrows));
        let w = self.w.unwrap_or_else(|| Matrix::zeros(nrows, 0));

        check_rows("X", x.nrows(), nrows)?;
        check_rows("Y", y.nrows(), nrows)?;
        check_rows("metas", metas.nrows(), nrows)?;
        check_rows("W", w.nrows(), nrows)?;
        check_width("attribute", x.ncols(), n_attrs)?;
        check_width("class", y.ncols(), n_class)?;
        check_width("meta attribute", metas.ncols(), n_metas)?;
        if w.ncols() > 1 {
            return Err(TableError::Shape(format!(
                "weights must be a single column, got {}",
                w.ncols()
            )));
        }

        let ids = match self.ids {
            Some(ids) => {
                check_rows("ids", ids.len(), nrows)?;
                ids
            }
            None => new_ids(nrows),
        };

        if !metas.is_object() && domain.metas().iter().any(Variable::is_string) {
            metas = MetaBlock::Object(metas.to_object());
        }

        let table = Table {
            domain,
            x,
            y,
            metas,
            w,
            ids,
            attributes: self.attributes,
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            config: self.config.unwrap_or_default(),
        };
        table.apply_locking();
        log::debug!(
            "built table '{}' with {} rows over {}",
            table.name,
            table.len(),
            table.domain
        );
        Ok(table)
    }
}

fn check_rows(block: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(TableError::Shape(format!(
            "{} has {} rows, expected {}",
            block, actual, expected
        )));
    }
    Ok(())
}

fn check_width(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(TableError::Shape(format!(
            "invalid number of {} columns ({} != {})",
            what, actual, expected
        )));
    }
    Ok(())
}

// ==================== Table ====================

pub struct Table {
    domain: Arc<Domain>,
    x: Matrix<f64>,
    y: Matrix<f64>,
    metas: MetaBlock,
    w: Matrix<f64>,
    ids: Vec<i64>,
    attributes: Map<String, JsonValue>,
    name: String,
    config: TableConfig,
}

impl Table {
    pub fn builder(domain: impl Into<Arc<Domain>>) -> TableBuilder {
        TableBuilder::new(domain)
    }

    /// Table from an attribute matrix and an optional class matrix.
    pub fn from_arrays(domain: impl Into<Arc<Domain>>, x: Matrix<f64>, y: Option<Matrix<f64>>) -> Result<Table> {
        let builder = TableBuilder::new(domain).x(x);
        match y {
            Some(y) => builder.y(y).build(),
            None => builder.build(),
        }
    }

    /// A table with no variables and no rows.
    pub fn empty() -> Table {
        Self::empty_with_domain(Domain::empty())
    }

    pub fn empty_with_domain(domain: impl Into<Arc<Domain>>) -> Table {
        let domain = domain.into();
        Table {
            x: Matrix::zeros(0, domain.attributes().len()),
            y: Matrix::zeros(0, domain.class_vars().len()),
            metas: if domain.metas().iter().any(Variable::is_string) {
                MetaBlock::Object(Matrix::zeros(0, domain.metas().len()))
            } else {
                MetaBlock::Numeric(Matrix::zeros(0, domain.metas().len()))
            },
            w: Matrix::zeros(0, 0),
            ids: Vec::new(),
            attributes: Map::new(),
            name: DEFAULT_NAME.to_string(),
            config: TableConfig::default(),
            domain,
        }
    }

    /// Build from rows of raw values in domain order: attributes, class
    /// variables, then metas. Each value is coerced by its variable.
    pub fn from_list(domain: impl Into<Arc<Domain>>, rows: &[Vec<Value>], weights: Option<&[f64]>) -> Result<Table> {
        Self::from_list_with_config(domain, rows, weights, TableConfig::default())
    }

    pub fn from_list_with_config(
        domain: impl Into<Arc<Domain>>,
        rows: &[Vec<Value>],
        weights: Option<&[f64]>,
        config: TableConfig,
    ) -> Result<Table> {
        let domain = domain.into();
        let n_attrs = domain.attributes().len();
        let n_class = domain.class_vars().len();
        let width = domain.len() + domain.metas().len();
        let object_metas = domain.metas().iter().any(Variable::is_string);

        let mut x = Vec::with_capacity(rows.len() * n_attrs);
        let mut y = Vec::with_capacity(rows.len() * n_class);
        let mut metas: Vec<Value> = Vec::with_capacity(rows.len() * domain.metas().len());

        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TableError::Shape(format!(
                    "row {} has {} values, domain has {} variables",
                    i,
                    row.len(),
                    width
                )));
            }
            for (col, (var, raw)) in domain.all_variables().zip(row).enumerate() {
                let value = var.coerce(raw, &config.missing_values)?;
                if col < n_attrs {
                    x.push(value.as_f64().unwrap_or(f64::NAN));
                } else if col < n_attrs + n_class {
                    y.push(value.as_f64().unwrap_or(f64::NAN));
                } else {
                    metas.push(value);
                }
            }
        }

        let n = rows.len();
        let metas = if object_metas {
            MetaBlock::Object(Matrix::dense(n, domain.metas().len(), metas)?)
        } else {
            let numeric = metas.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect();
            MetaBlock::Numeric(Matrix::dense(n, domain.metas().len(), numeric)?)
        };

        let mut builder = TableBuilder::new(Arc::clone(&domain))
            .x(Matrix::dense(n, n_attrs, x)?)
            .y(Matrix::dense(n, n_class, y)?)
            .metas(metas)
            .config(config);
        if let Some(weights) = weights {
            if weights.len() != n {
                return Err(TableError::Shape(format!(
                    "{} weights given for {} rows",
                    weights.len(),
                    n
                )));
            }
            builder = builder.weights(weights.to_vec());
        }
        builder.build()
    }

    // ==================== Accessors ====================

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn x(&self) -> &Matrix<f64> {
        &self.x
    }

    pub fn y(&self) -> &Matrix<f64> {
        &self.y
    }

    pub fn metas(&self) -> &MetaBlock {
        &self.metas
    }

    pub fn w(&self) -> &Matrix<f64> {
        &self.w
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn attributes(&self) -> &Map<String, JsonValue> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, JsonValue> {
        &mut self.attributes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_weights(&self) -> bool {
        self.w.ncols() > 0
    }

    /// Row weights; 1.0 everywhere when the table is unweighted.
    pub fn weights(&self) -> Vec<f64> {
        if self.has_weights() {
            self.w.column(0).unwrap_or_default()
        } else {
            vec![1.0; self.len()]
        }
    }

    /// Values of the single class variable.
    pub fn class_column(&self) -> Result<Vec<f64>> {
        match self.domain.class_var()? {
            Some(_) => Ok(self.y.column(0).unwrap_or_default()),
            None => Err(TableError::Schema("domain has no class variable".to_string())),
        }
    }

    // ==================== Locking ====================

    fn apply_locking(&self) {
        if self.config.locking {
            for part in Part::ALL {
                self.set_part_writable(part, false);
            }
        }
    }

    /// Whether a part currently accepts writes.
    pub fn is_writable(&self, part: Part) -> bool {
        self.part_writable(part)
    }

    pub(crate) fn part_writable(&self, part: Part) -> bool {
        match part {
            Part::X => self.x.is_writable(),
            Part::Y => self.y.is_writable(),
            Part::Metas => self.metas.is_writable(),
            Part::W => self.w.is_writable(),
        }
    }

    pub(crate) fn part_is_view(&self, part: Part) -> bool {
        match part {
            Part::X => self.x.is_view(),
            Part::Y => self.y.is_view(),
            Part::Metas => self.metas.is_view(),
            Part::W => self.w.is_view(),
        }
    }

    pub(crate) fn part_is_shared(&self, part: Part) -> bool {
        match part {
            Part::X => self.x.is_shared(),
            Part::Y => self.y.is_shared(),
            Part::Metas => self.metas.is_shared(),
            Part::W => self.w.is_shared(),
        }
    }

    /// Replace a part shared with another table by an owned copy.
    pub(crate) fn detach_part(&mut self, part: Part) {
        match part {
            Part::X => self.x = self.x.copy(),
            Part::Y => self.y = self.y.copy(),
            Part::Metas => self.metas = self.metas.copy(),
            Part::W => self.w = self.w.copy(),
        }
        log::debug!("copied shared {} of table '{}' before unlocking", part, self.name);
    }

    pub(crate) fn set_part_writable(&self, part: Part, writable: bool) {
        match part {
            Part::X => self.x.set_writable(writable),
            Part::Y => self.y.set_writable(writable),
            Part::Metas => self.metas.set_writable(writable),
            Part::W => self.w.set_writable(writable),
        }
    }

    /// Enter an unlocked scope over `parts` (all parts when empty).
    ///
    /// Fails when a locked part is a view of another buffer; parts unlocked
    /// before the failure are locked again.
    pub fn unlocked(&mut self, parts: &[Part]) -> Result<Unlocked<'_>> {
        Unlocked::acquire(self, parts, false)
    }

    /// Like [`Table::unlocked`], but also unlocks views. Writes through a
    /// forced view modify the buffer it views.
    pub fn force_unlocked(&mut self, parts: &[Part]) -> Result<Unlocked<'_>> {
        Unlocked::acquire(self, parts, true)
    }

    fn check_replace(&self, part: Part) -> Result<()> {
        if self.part_writable(part) {
            Ok(())
        } else {
            Err(LockError::ReadOnly(part).into())
        }
    }

    pub fn set_x(&mut self, x: Matrix<f64>) -> Result<()> {
        self.check_replace(Part::X)?;
        check_rows("X", x.nrows(), self.len())?;
        check_width("attribute", x.ncols(), self.domain.attributes().len())?;
        x.set_writable(true);
        self.x = x;
        Ok(())
    }

    pub fn set_y(&mut self, y: Matrix<f64>) -> Result<()> {
        self.check_replace(Part::Y)?;
        check_rows("Y", y.nrows(), self.len())?;
        check_width("class", y.ncols(), self.domain.class_vars().len())?;
        y.set_writable(true);
        self.y = y;
        Ok(())
    }

    pub fn set_metas(&mut self, metas: impl Into<MetaBlock>) -> Result<()> {
        let metas = metas.into();
        self.check_replace(Part::Metas)?;
        check_rows("metas", metas.nrows(), self.len())?;
        check_width("meta attribute", metas.ncols(), self.domain.metas().len())?;
        if !metas.is_object() && self.domain.metas().iter().any(Variable::is_string) {
            return Err(TableError::Schema(
                "metas with string variables need object storage".to_string(),
            ));
        }
        metas.set_writable(true);
        self.metas = metas;
        Ok(())
    }

    pub fn set_w(&mut self, w: Matrix<f64>) -> Result<()> {
        self.check_replace(Part::W)?;
        check_rows("W", w.nrows(), self.len())?;
        if w.ncols() > 1 {
            return Err(TableError::Shape("weights must be a single column".to_string()));
        }
        w.set_writable(true);
        self.w = w;
        Ok(())
    }

    pub fn set_ids(&mut self, ids: Vec<i64>) -> Result<()> {
        check_rows("ids", ids.len(), self.len())?;
        self.ids = ids;
        Ok(())
    }

    // ==================== Derived tables ====================

    fn share_matrix(&self, m: &Matrix<f64>) -> Matrix<f64> {
        if self.config.locking {
            m.share()
        } else {
            m.copy()
        }
    }

    fn share_metas(&self, metas: &MetaBlock) -> MetaBlock {
        if self.config.locking {
            metas.share()
        } else {
            metas.copy()
        }
    }

    fn derive(&self, x: Matrix<f64>, y: Matrix<f64>, metas: MetaBlock, w: Matrix<f64>, ids: Vec<i64>) -> Table {
        let table = Table {
            domain: Arc::clone(&self.domain),
            x,
            y,
            metas,
            w,
            ids,
            attributes: self.attributes.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
        };
        table.apply_locking();
        table
    }

    /// Deep copy: every buffer is duplicated, ids and attributes kept.
    pub fn copy(&self) -> Table {
        self.derive(
            self.x.copy(),
            self.y.copy(),
            self.metas.copy(),
            self.w.copy(),
            self.ids.clone(),
        )
    }

    /// Zero-copy slice of a contiguous row range.
    pub fn slice(&self, rows: Range<usize>) -> Result<Table> {
        let ids = self
            .ids
            .get(rows.clone())
            .ok_or_else(|| TableError::Shape(format!("row range {:?} out of bounds for {} rows", rows, self.len())))?
            .to_vec();
        Ok(self.derive(
            self.x.rows_view(rows.clone())?,
            self.y.rows_view(rows.clone())?,
            self.metas.rows_view(rows.clone())?,
            self.w.rows_view(rows)?,
            ids,
        ))
    }

    /// Rows by index. A contiguous ascending run becomes a zero-copy slice;
    /// anything else is copied.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Table> {
        if let Some(run) = contiguous_run(rows) {
            return self.slice(run);
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.len()) {
            return Err(TableError::Shape(format!("row {} out of bounds for {} rows", bad, self.len())));
        }
        let ids = rows.iter().map(|&r| self.ids[r]).collect();
        Ok(self.derive(
            self.x.take_rows(rows)?,
            self.y.take_rows(rows)?,
            self.metas.take_rows(rows)?,
            self.w.take_rows(rows)?,
            ids,
        ))
    }

    /// Rows whose mask entry is true.
    pub fn select_mask(&self, mask: &[bool]) -> Result<Table> {
        self.select_rows(&self.mask_rows(mask)?)
    }

    /// Rows whose mask entry is true, as a table that unlocks on its own.
    ///
    /// A contiguous run shares storage with `self` until the result first
    /// unlocks a part, which copies that part. Other selections are copied.
    pub fn filter_mask(&self, mask: &[bool]) -> Result<Table> {
        let rows = self.mask_rows(mask)?;
        let run = match contiguous_run(&rows) {
            Some(run) => run,
            None => return self.select_rows(&rows),
        };
        Ok(self.derive(
            self.share_matrix(&self.x.rows_view(run.clone())?),
            self.share_matrix(&self.y.rows_view(run.clone())?),
            self.share_metas(&self.metas.rows_view(run.clone())?),
            self.share_matrix(&self.w.rows_view(run.clone())?),
            self.ids[run].to_vec(),
        ))
    }

    fn mask_rows(&self, mask: &[bool]) -> Result<Vec<usize>> {
        if mask.len() != self.len() {
            return Err(TableError::Shape(format!(
                "mask of length {} for {} rows",
                mask.len(),
                self.len()
            )));
        }
        Ok(mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect())
    }

    /// New table with one more column, placed in attributes or metas.
    ///
    /// `to_metas = None` sends string variables to metas and every other
    /// kind to attributes. Unchanged blocks are shared with `self` under
    /// locking and copied on first unlock; without locking they are copied.
    pub fn add_column<V: Into<Value>>(&self, var: Variable, values: Vec<V>, to_metas: Option<bool>) -> Result<Table> {
        if values.len() != self.len() {
            return Err(TableError::Shape(format!(
                "column '{}' has {} values, table has {} rows",
                var.name(),
                values.len(),
                self.len()
            )));
        }
        let to_metas = to_metas.unwrap_or(!var.is_primitive());
        if !to_metas && var.is_string() {
            return Err(TableError::Schema(format!(
                "string variable '{}' can only be added to metas",
                var.name()
            )));
        }
        let coerced = values
            .into_iter()
            .map(|v| var.coerce(&v.into(), &self.config.missing_values))
            .collect::<Result<Vec<Value>>>()?;

        let mut attributes = self.domain.attributes().to_vec();
        let mut metas_vars = self.domain.metas().to_vec();
        let n = self.len();
        let (x, metas) = if to_metas {
            metas_vars.push(var.clone());
            let column: MetaBlock = if var.is_string() || self.metas.is_object() {
                MetaBlock::Object(Matrix::column_vector(coerced))
            } else {
                MetaBlock::Numeric(Matrix::column_vector(numbers(&coerced)))
            };
            (self.share_matrix(&self.x), MetaBlock::hstack(&[&self.metas, &column], n)?)
        } else {
            attributes.push(var.clone());
            let column = Matrix::column_vector(numbers(&coerced));
            (Matrix::hstack(&[&self.x, &column], n)?, self.share_metas(&self.metas))
        };
        let domain = Domain::new(attributes, self.domain.class_vars().to_vec(), metas_vars)?;
        log::debug!(
            "added column '{}' to {} of table '{}'",
            var.name(),
            if to_metas { "metas" } else { "attributes" },
            self.name
        );

        TableBuilder::new(domain)
            .x(x)
            .y(self.share_matrix(&self.y))
            .metas(metas)
            .w(self.share_matrix(&self.w))
            .ids(self.ids.clone())
            .attributes(self.attributes.clone())
            .name(self.name.clone())
            .config(self.config.clone())
            .build()
    }

    /// A table over another domain. Each target variable is read through
    /// [`Table::get_column`], so derived variables are computed and discrete
    /// values remapped. Ids and weights are kept.
    pub fn transform(&self, domain: impl Into<Arc<Domain>>) -> Result<Table> {
        let domain = domain.into();
        let n = self.len();

        let numeric_block = |vars: &[Variable]| -> Result<Matrix<f64>> {
            let columns = vars
                .iter()
                .map(|var| self.numeric_column(var))
                .collect::<Result<Vec<Matrix<f64>>>>()?;
            let parts: Vec<&Matrix<f64>> = columns.iter().collect();
            Matrix::hstack(&parts, n)
        };

        let x = numeric_block(domain.attributes())?;
        let y = numeric_block(domain.class_vars())?;
        let metas = if domain.metas().iter().any(Variable::is_string) {
            let columns = domain
                .metas()
                .iter()
                .map(|var| {
                    Ok(match self.get_column(var, false)? {
                        ColumnData::Numeric(m) => m.map(|v| Value::Number(*v)),
                        ColumnData::Object(m) => m,
                    })
                })
                .collect::<Result<Vec<Matrix<Value>>>>()?;
            let parts: Vec<&Matrix<Value>> = columns.iter().collect();
            MetaBlock::Object(Matrix::hstack(&parts, n)?)
        } else {
            MetaBlock::Numeric(numeric_block(domain.metas())?)
        };

        TableBuilder::new(domain)
            .x(x)
            .y(y)
            .metas(metas)
            .w(self.share_matrix(&self.w))
            .ids(self.ids.clone())
            .attributes(self.attributes.clone())
            .name(self.name.clone())
            .config(self.config.clone())
            .build()
    }

    /// Keep only the given variables, each in its current role.
    pub fn select_columns<K: Into<Key> + Clone>(&self, keys: &[K]) -> Result<Table> {
        self.transform(self.domain.select(keys)?)
    }

    fn numeric_column(&self, var: &Variable) -> Result<Matrix<f64>> {
        match self.get_column(var, false)? {
            ColumnData::Numeric(m) => Ok(m),
            ColumnData::Object(m) => Ok(m.map(|v| v.as_f64().unwrap_or(f64::NAN))),
        }
    }

    // ==================== Column access ====================

    /// One column as a one-column matrix.
    ///
    /// Stored dense columns come back as views of X, Y or metas unless
    /// `copy` is set. Derived variables this table does not store are
    /// computed from it. Computed columns, sparse columns, discrete columns
    /// read through a variable with other labels and numeric variables kept
    /// in object metas come back as owned data.
    pub fn get_column(&self, key: impl Into<Key>, copy: bool) -> Result<ColumnData> {
        let key = key.into();
        let index = match (self.domain.index(key.clone()), &key) {
            (Ok(index), _) => index,
            (Err(_), Key::Variable(var)) if var.is_derived() => return self.compute_column(var),
            (Err(e), _) => return Err(e),
        };
        let stored = self.domain.get(index)?.clone();
        let requested = match key {
            Key::Variable(var) => var,
            _ => stored.clone(),
        };

        let raw = self.stored_column(index)?;
        if requested.is_discrete() && stored.is_discrete() && requested.values() != stored.values() {
            return Ok(remap_discrete(&raw, &stored, &requested));
        }
        if requested.is_primitive() {
            if let ColumnData::Object(m) = &raw {
                let values = m
                    .to_vec()
                    .iter()
                    .map(|v| match v {
                        Value::Number(n) => Ok(*n),
                        Value::Text(_) => requested
                            .coerce(v, &self.config.missing_values)
                            .map(|c| c.as_f64().unwrap_or(f64::NAN)),
                    })
                    .collect::<Result<Vec<f64>>>()?;
                return Ok(ColumnData::numeric(values));
            }
        }
        if copy && raw.is_view() {
            return Ok(raw.copy());
        }
        Ok(raw)
    }

    fn stored_column(&self, index: isize) -> Result<ColumnData> {
        let n_attrs = self.domain.attributes().len();
        let numeric = |block: &Matrix<f64>, col: usize| -> Result<ColumnData> {
            if block.is_sparse() {
                log::debug!("densifying sparse column {} of table '{}'", col, self.name);
                Ok(ColumnData::Numeric(block.column_view(col)?.to_dense()))
            } else {
                Ok(ColumnData::Numeric(block.column_view(col)?))
            }
        };
        match self.domain.role_of(index)? {
            Role::Attribute => numeric(&self.x, index as usize),
            Role::ClassVar => numeric(&self.y, index as usize - n_attrs),
            Role::Meta => {
                let col = (-1 - index) as usize;
                match &self.metas {
                    MetaBlock::Numeric(m) => numeric(m, col),
                    MetaBlock::Object(m) if m.is_sparse() => Ok(ColumnData::Object(m.column_view(col)?.to_dense())),
                    MetaBlock::Object(m) => Ok(ColumnData::Object(m.column_view(col)?)),
                }
            }
        }
    }

    fn compute_column(&self, var: &Variable) -> Result<ColumnData> {
        let compute = var
            .compute_value()
            .ok_or_else(|| TableError::Schema(format!("variable '{}' is not derived", var.name())))?;
        let data = compute.compute(self)?;
        if data.len() != self.len() {
            return Err(TableError::Shape(format!(
                "derived variable '{}' produced {} values for {} rows",
                var.name(),
                data.len(),
                self.len()
            )));
        }
        log::debug!("computed derived column '{}' of table '{}'", var.name(), self.name);
        Ok(if data.is_view() { data.copy() } else { data })
    }

    /// The variable a key names in this table, with its column.
    pub(crate) fn resolve_column(&self, key: &Key) -> Result<(Variable, ColumnData)> {
        let var = match key {
            Key::Variable(var) if var.is_derived() => var.clone(),
            Key::Variable(var) => {
                self.domain.index(var)?;
                var.clone()
            }
            other => self.domain.get(other.clone())?.clone(),
        };
        let data = self.get_column(&var, false)?;
        Ok((var, data))
    }

    // ==================== Rows ====================

    /// Values of one row: attributes, class variables, then metas.
    pub fn row(&self, index: usize) -> Result<Vec<Value>> {
        if index >= self.len() {
            return Err(TableError::Shape(format!(
                "row {} out of bounds for {} rows",
                index,
                self.len()
            )));
        }
        let mut out = Vec::with_capacity(self.domain.len() + self.domain.metas().len());
        out.extend(self.x.row(index).unwrap_or_default().into_iter().map(Value::Number));
        out.extend(self.y.row(index).unwrap_or_default().into_iter().map(Value::Number));
        out.extend(self.metas.row(index).unwrap_or_default());
        Ok(out)
    }

    pub fn iter_rows(&self) -> TableRowIterator<'_> {
        TableRowIterator {
            table: self,
            index: 0,
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("rows", &self.len())
            .field("x", &self.x)
            .field("y", &self.y)
            .field("metas", &self.metas)
            .field("w", &self.w)
            .finish()
    }
}

/// Rows rendered with their variables, e.g. `[1.5, a | yes] {ann}`.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_attrs = self.domain.attributes().len();
        let n_prim = self.domain.len();
        write!(f, "[")?;
        for (i, row) in self.iter_rows().enumerate() {
            if i > 0 {
                write!(f, ",\n ")?;
            }
            let render = |range: Range<usize>| -> String {
                self.domain
                    .all_variables()
                    .zip(row.iter())
                    .skip(range.start)
                    .take(range.len())
                    .map(|(var, value)| var.str_val(value))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            write!(f, "[{}", render(0..n_attrs))?;
            if n_prim > n_attrs {
                write!(f, " | {}", render(n_attrs..n_prim))?;
            }
            write!(f, "]")?;
            if !self.domain.metas().is_empty() {
                write!(f, " {{{}}}", render(n_prim..row.len()))?;
            }
        }
        write!(f, "]")
    }
}

/// Iterator over table rows.
pub struct TableRowIterator<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Iterator for TableRowIterator<'a> {
    type Item = Vec<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.table.row(self.index).ok()?;
        self.index += 1;
        Some(row)
    }
}

fn contiguous_run(rows: &[usize]) -> Option<Range<usize>> {
    let (&first, &last) = (rows.first()?, rows.last()?);
    rows.windows(2).all(|w| w[1] == w[0] + 1).then_some(first..last + 1)
}

fn numbers(values: &[Value]) -> Vec<f64> {
    values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect()
}

/// Translate codes of `stored` into codes of `requested` by label.
fn remap_discrete(raw: &ColumnData, stored: &Variable, requested: &Variable) -> ColumnData {
    let lookup: Vec<f64> = stored
        .values()
        .iter()
        .map(|label| requested.to_code(label).map_or(f64::NAN, |c| c as f64))
        .collect();
    let mapped = raw
        .to_f64()
        .into_iter()
        .map(|code| {
            if code.is_nan() || code < 0.0 {
                f64::NAN
            } else {
                lookup.get(code as usize).copied().unwrap_or(f64::NAN)
            }
        })
        .collect();
    log::debug!(
        "remapped values of '{}' from {:?} to {:?}",
        stored.name(),
        stored.values(),
        requested.values()
    );
    ColumnData::numeric(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterContinuous, FilterOperator, IsDefined, RowFilter, SameValue};
    use crate::storage::SparseStorage;

    fn unlocked_config() -> TableConfig {
        TableConfig::default().with_locking(false)
    }

    fn locked_config() -> TableConfig {
        TableConfig::default().with_locking(true)
    }

    fn abc_domain() -> Domain {
        Domain::new(
            vec![Variable::continuous("a"), Variable::continuous("b")],
            vec![Variable::continuous("c")],
            vec![Variable::continuous("m")],
        )
        .unwrap()
    }

    fn abc_table() -> Table {
        Table::builder(abc_domain())
            .x(Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap())
            .y(Matrix::column_vector(vec![0.0, 1.0, 0.0]))
            .metas(Matrix::column_vector(vec![7.0, 8.0, 9.0]))
            .config(locked_config())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let domain = Domain::new(vec![Variable::continuous("a")], vec![], vec![]).unwrap();
        let table = Table::builder(domain)
            .x(Matrix::zeros(5, 1))
            .build()
            .unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.y().shape(), (5, 0));
        assert_eq!(table.metas().ncols(), 0);
        assert_eq!(table.w().shape(), (5, 0));
        assert!(!table.has_weights());
        assert_eq!(table.weights(), vec![1.0; 5]);
        assert_eq!(table.ids().len(), 5);
        assert_eq!(table.name(), DEFAULT_NAME);
    }

    #[test]
    fn test_builder_shape_errors() {
        let err = Table::builder(abc_domain())
            .x(Matrix::zeros(3, 2))
            .y(Matrix::zeros(2, 1))
            .metas(Matrix::<f64>::zeros(3, 1))
            .build();
        assert!(matches!(err, Err(TableError::Shape(_))));

        let err = Table::builder(abc_domain())
            .x(Matrix::zeros(3, 3))
            .y(Matrix::zeros(3, 1))
            .metas(Matrix::<f64>::zeros(3, 1))
            .build();
        assert!(matches!(err, Err(TableError::Shape(_))));

        let err = Table::builder(abc_domain())
            .x(Matrix::zeros(3, 2))
            .y(Matrix::zeros(3, 1))
            .build();
        assert!(err.is_err());

        let err = Table::builder(abc_domain())
            .x(Matrix::zeros(3, 2))
            .y(Matrix::zeros(3, 1))
            .metas(Matrix::<f64>::zeros(3, 1))
            .ids(vec![1, 2])
            .build();
        assert!(err.is_err());

        let err = Table::builder(abc_domain())
            .x(Matrix::zeros(3, 2))
            .y(Matrix::zeros(3, 1))
            .metas(Matrix::<f64>::zeros(3, 1))
            .weights(vec![1.0; 4])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_builder_splits_class_from_x() {
        let table = Table::builder(abc_domain())
            .x(Matrix::from_rows(vec![vec![1.0, 2.0, 0.0], vec![3.0, 4.0, 1.0]]).unwrap())
            .metas(Matrix::column_vector(vec![0.0, 0.0]))
            .config(unlocked_config())
            .build()
            .unwrap();
        assert_eq!(table.x().shape(), (2, 2));
        assert_eq!(table.class_column().unwrap(), vec![0.0, 1.0]);
        assert!(!table.x().is_view());
    }

    #[test]
    fn test_round_trip_from_arrays() {
        let x = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let y = Matrix::column_vector(vec![0.0, 1.0, 0.0]);
        let metas = Matrix::column_vector(vec![7.0, 8.0, 9.0]);
        let table = Table::builder(abc_domain())
            .x(x.clone())
            .y(y.clone())
            .metas(metas.clone())
            .build()
            .unwrap();
        assert_eq!(table.x(), &x);
        assert_eq!(table.y(), &y);
        assert_eq!(table.metas(), &MetaBlock::Numeric(metas));
        assert!(table.x().shares_memory(&x));
    }

    #[test]
    fn test_ids_are_fresh() {
        let a = abc_table();
        let b = abc_table();
        assert!(a.ids().iter().all(|id| !b.ids().contains(id)));
        let mut sorted = a.ids().to_vec();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_sparse_input_stays_sparse() {
        let x = SparseStorage::from_csr(3, 2, vec![0, 1, 1, 2], vec![0, 1], vec![1.0, 2.0]).unwrap();
        let table = Table::builder(abc_domain())
            .x(Matrix::sparse(x))
            .y(Matrix::zeros(3, 1))
            .metas(Matrix::<f64>::zeros(3, 1))
            .build()
            .unwrap();
        assert!(table.x().is_sparse());
        assert_eq!(table.x().stored_len(), 2);
    }

    #[test]
    fn test_string_metas_become_object() {
        let domain = Domain::new(vec![], vec![], vec![Variable::string("s")]).unwrap();
        let table = Table::builder(domain).metas(Matrix::column_vector(vec![1.0, 2.0])).build().unwrap();
        assert!(table.metas().is_object());
        assert_eq!(table.metas().get(1, 0), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_from_list() {
        let domain = Domain::new(
            vec![Variable::continuous("a"), Variable::discrete("d", ["x", "y"]).unwrap()],
            vec![Variable::discrete("cls", ["no", "yes"]).unwrap()],
            vec![Variable::string("name"), Variable::time("when")],
        )
        .unwrap();
        let rows = vec![
            vec![1.0.into(), "y".into(), "yes".into(), "ann".into(), "1970-01-01 00:00:10".into()],
            vec!["?".into(), "x".into(), "no".into(), "".into(), "?".into()],
        ];
        let table = Table::from_list(domain.clone(), &rows, Some(&[0.5, 2.0][..])).unwrap();
        assert_eq!(table.x().row(0), Some(vec![1.0, 1.0]));
        assert!(table.x().get(1, 0).unwrap().is_nan());
        assert_eq!(table.class_column().unwrap(), vec![1.0, 0.0]);
        assert_eq!(table.metas().get(0, 0), Some(Value::from("ann")));
        assert_eq!(table.metas().get(0, 1), Some(Value::Number(10.0)));
        assert!(table.metas().get(1, 1).unwrap().is_missing());
        assert_eq!(table.weights(), vec![0.5, 2.0]);

        let short = vec![vec![Value::from(1.0)]];
        assert!(matches!(Table::from_list(domain.clone(), &short, None), Err(TableError::Shape(_))));
        let bad = vec![vec![1.0.into(), "z".into(), "yes".into(), "".into(), "".into()]];
        assert!(matches!(Table::from_list(domain.clone(), &bad, None), Err(TableError::Parse { .. })));
        assert!(Table::from_list(domain, &rows, Some(&[1.0][..])).is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let table = abc_table();
        let mut copy = table.copy();
        assert_eq!(copy.ids(), table.ids());
        {
            let t = copy.unlocked(&[]).unwrap();
            t.x().set(0, 0, 100.0).unwrap();
            t.metas().set(0, 0, Value::Number(100.0)).unwrap();
        }
        copy.set_ids(vec![0, 0, 0]).unwrap();
        assert_eq!(table.x().get(0, 0), Some(1.0));
        assert_eq!(table.metas().get(0, 0), Some(Value::Number(7.0)));
        assert_ne!(table.ids(), copy.ids());
        assert!(!copy.x().shares_memory(table.x()));
    }

    #[test]
    fn test_slice_and_select_rows() {
        let table = abc_table();
        let slice = table.select_rows(&[1, 2]).unwrap();
        assert!(slice.x().is_view());
        assert!(slice.x().shares_memory(table.x()));
        assert_eq!(slice.ids(), &table.ids()[1..3]);

        let picked = table.select_rows(&[2, 0]).unwrap();
        assert!(!picked.x().is_view());
        assert_eq!(picked.x().row(0), Some(vec![5.0, 6.0]));
        assert_eq!(picked.ids(), &[table.ids()[2], table.ids()[0]]);

        let none = table.select_mask(&[false, false, false]).unwrap();
        assert_eq!(none.len(), 0);
        assert_eq!(none.x().ncols(), 2);
        assert!(table.select_rows(&[5, 1]).is_err());
        assert!(table.select_mask(&[true]).is_err());
    }

    #[test]
    fn test_slice_views_refuse_unlock() {
        let table = abc_table();
        let mut slice = table.slice(0..2).unwrap();
        assert!(!slice.is_writable(Part::X));
        assert!(slice.unlocked(&[Part::X]).is_err());
        {
            let s = slice.force_unlocked(&[Part::X]).unwrap();
            s.x().set(0, 0, -1.0).unwrap();
        }
        assert_eq!(table.x().get(0, 0), Some(-1.0));
        assert!(!table.is_writable(Part::X));
    }

    #[test]
    fn test_setters_need_unlock() {
        let mut table = abc_table();
        assert!(matches!(
            table.set_w(Matrix::column_vector(vec![1.0, 2.0, 3.0])),
            Err(TableError::Lock(LockError::ReadOnly(Part::W)))
        ));
        {
            let mut t = table.unlocked(&[Part::W]).unwrap();
            t.set_w(Matrix::column_vector(vec![1.0, 2.0, 3.0])).unwrap();
            assert!(t.set_w(Matrix::column_vector(vec![1.0])).is_err());
            t.w().set(0, 0, 4.0).unwrap();
        }
        assert_eq!(table.weights(), vec![4.0, 2.0, 3.0]);
        assert!(!table.is_writable(Part::W));
    }

    #[test]
    fn test_add_column_to_attributes_and_metas() {
        let table = abc_table();
        let with_attr = table.add_column(Variable::continuous("d"), vec![1.0, 2.0, 3.0], None).unwrap();
        assert_eq!(with_attr.domain().attributes().len(), 3);
        assert_eq!(with_attr.x().column(2), Some(vec![1.0, 2.0, 3.0]));
        assert!(with_attr.y().shares_memory(table.y()));
        assert_eq!(with_attr.ids(), table.ids());

        let with_meta = table.add_column(Variable::continuous("n"), vec![1.0, 2.0, 3.0], Some(true)).unwrap();
        assert_eq!(with_meta.domain().metas().len(), 2);
        assert!(!with_meta.metas().is_object());

        let with_string = table.add_column(Variable::string("s"), vec!["a", "b", "c"], None).unwrap();
        assert!(with_string.metas().is_object());
        assert_eq!(with_string.metas().get(2, 1), Some(Value::from("c")));
        assert_eq!(with_string.metas().get(0, 0), Some(Value::Number(7.0)));
        assert!(with_string.x().shares_memory(table.x()));

        assert!(table.add_column(Variable::string("s"), vec!["a", "b", "c"], Some(false)).is_err());
        assert!(table.add_column(Variable::continuous("d"), vec![1.0], None).is_err());
        assert!(table.add_column(Variable::continuous("a"), vec![1.0, 2.0, 3.0], None).is_err());
    }

    #[test]
    fn test_add_column_to_empty_table() {
        let table = Table::empty();
        let out = table.add_column(Variable::continuous("a"), Vec::<f64>::new(), None).unwrap();
        assert_eq!(out.len(), 0);
        assert_eq!(out.x().shape(), (0, 1));
    }

    #[test]
    fn test_add_discrete_column_by_label() {
        let table = abc_table();
        let d = Variable::discrete("d", ["lo", "hi"]).unwrap();
        let out = table.add_column(d, vec!["hi", "lo", "?"], None).unwrap();
        let col = out.x().column(2).unwrap();
        assert_eq!(&col[..2], &[1.0, 0.0]);
        assert!(col[2].is_nan());
    }

    #[test]
    fn test_get_column_views_and_copies() {
        let table = abc_table();
        let col = table.get_column("a", false).unwrap();
        assert!(col.is_view());
        assert!(col.as_numeric().unwrap().shares_memory(table.x()));
        assert_eq!(col.to_f64(), vec![1.0, 3.0, 5.0]);

        let copied = table.get_column(0, true).unwrap();
        assert!(!copied.is_view());
        assert_eq!(copied.to_f64(), vec![1.0, 3.0, 5.0]);

        assert_eq!(table.get_column(2, false).unwrap().to_f64(), vec![0.0, 1.0, 0.0]);
        assert!(table.get_column(2, false).unwrap().as_numeric().unwrap().shares_memory(table.y()));
        assert_eq!(table.get_column(-1, false).unwrap().to_f64(), vec![7.0, 8.0, 9.0]);

        assert!(matches!(table.get_column("zz", false), Err(TableError::UnknownVariable(_))));
        assert!(matches!(table.get_column(5, false), Err(TableError::IndexOutOfRange(5))));
        assert!(table.get_column(Variable::continuous("zz"), false).is_err());
    }

    #[test]
    fn test_get_column_remaps_discrete() {
        let d = Variable::discrete("d", ["a", "b"]).unwrap();
        let domain = Domain::new(vec![d], vec![], vec![]).unwrap();
        let x = Matrix::column_vector(vec![0.0, 0.0, 1.0, f64::NAN]);
        let dense = Table::from_arrays(domain.clone(), x.clone(), None).unwrap();
        let sparse = Table::from_arrays(domain, x.to_sparse(), None).unwrap();

        let same = Variable::discrete("d", ["a", "b", "c"]).unwrap();
        let other = Variable::discrete("d", ["a", "c", "b"]).unwrap();
        for table in [&dense, &sparse] {
            let col = table.get_column(&same, false).unwrap().to_f64();
            assert_eq!(&col[..3], &[0.0, 0.0, 1.0]);
            let col = table.get_column(&other, false).unwrap();
            assert!(!col.is_view());
            let col = col.to_f64();
            assert_eq!(&col[..3], &[0.0, 0.0, 2.0]);
            assert!(col[3].is_nan());
        }
        let dropped = Variable::discrete("d", ["b"]).unwrap();
        let col = dense.get_column(&dropped, false).unwrap().to_f64();
        assert!(col[0].is_nan());
        assert_eq!(col[2], 0.0);
    }

    #[test]
    fn test_get_column_densifies_sparse() {
        let x = Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 0.0]]).unwrap().to_sparse();
        let domain = Domain::new(vec![Variable::continuous("a"), Variable::continuous("b")], vec![], vec![]).unwrap();
        let table = Table::from_arrays(domain, x, None).unwrap();
        let col = table.get_column("b", false).unwrap();
        let m = col.as_numeric().unwrap();
        assert!(!m.is_sparse());
        assert!(!m.is_view());
        assert_eq!(m.to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_get_column_numeric_meta_in_object_block() {
        let domain = Domain::new(
            vec![],
            vec![],
            vec![Variable::string("s"), Variable::continuous("n")],
        )
        .unwrap();
        let rows = vec![vec!["a".into(), 1.0.into()], vec!["b".into(), "?".into()]];
        let table = Table::from_list(domain, &rows, None).unwrap();
        assert!(table.metas().is_object());
        let col = table.get_column("n", false).unwrap();
        assert!(col.as_numeric().is_some());
        assert_eq!(col.to_f64()[0], 1.0);
        assert!(col.to_f64()[1].is_nan());
        let s = table.get_column("s", false).unwrap();
        assert_eq!(s.to_values(), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_get_column_computes_derived() {
        let table = abc_table();
        let doubled = Variable::continuous("a2").with_compute_value(|t: &Table| {
            let a = t.get_column("a", false)?.to_f64();
            Ok(ColumnData::numeric(a.iter().map(|v| v * 2.0).collect()))
        });
        let col = table.get_column(&doubled, false).unwrap();
        assert_eq!(col.to_f64(), vec![2.0, 6.0, 10.0]);

        let view = Variable::continuous("a_view").with_compute_value(|t: &Table| t.get_column("a", false));
        let col = table.get_column(&view, false).unwrap();
        assert!(!col.is_view());

        let wrong = Variable::continuous("bad").with_compute_value(|_: &Table| Ok(ColumnData::numeric(vec![1.0])));
        assert!(matches!(table.get_column(&wrong, false), Err(TableError::Shape(_))));
    }

    #[test]
    fn test_transform_materialises() {
        let table = abc_table();
        let sum = Variable::continuous("sum").with_compute_value(|t: &Table| {
            let a = t.get_column("a", false)?.to_f64();
            let b = t.get_column("b", false)?.to_f64();
            Ok(ColumnData::numeric(a.iter().zip(&b).map(|(x, y)| x + y).collect()))
        });
        let domain = Domain::new(vec![Variable::continuous("b"), sum], vec![], vec![Variable::continuous("c")]).unwrap();
        let out = table.transform(domain).unwrap();
        assert_eq!(out.x().to_rows(), vec![vec![2.0, 3.0], vec![4.0, 7.0], vec![6.0, 11.0]]);
        assert_eq!(out.metas().get(1, 0), Some(Value::Number(1.0)));
        assert_eq!(out.ids(), table.ids());

        let selected = table.select_columns(&["m", "b"]).unwrap();
        assert_eq!(selected.domain().to_string(), "[b] {m}");
        assert_eq!(selected.x().column(0), Some(vec![2.0, 4.0, 6.0]));
    }

    #[test]
    fn test_stored_derived_column_is_read_back() {
        let table = abc_table();
        let sum = Variable::continuous("sum").with_compute_value(|t: &Table| {
            let a = t.get_column("a", false)?.to_f64();
            let b = t.get_column("b", false)?.to_f64();
            Ok(ColumnData::numeric(a.iter().zip(&b).map(|(x, y)| x + y).collect()))
        });
        let out = table.transform(Domain::new(vec![sum.clone()], vec![], vec![]).unwrap()).unwrap();
        assert_eq!(out.x().to_rows(), vec![vec![3.0], vec![7.0], vec![11.0]]);

        assert_eq!(out.get_column("sum", false).unwrap().to_f64(), vec![3.0, 7.0, 11.0]);
        assert_eq!(out.get_column(0, false).unwrap().to_f64(), vec![3.0, 7.0, 11.0]);
        let by_var = out.get_column(&sum, false).unwrap();
        assert!(by_var.as_numeric().unwrap().shares_memory(out.x()));

        let defined = IsDefined::new().apply(&out).unwrap();
        assert_eq!(defined.len(), 3);
        let large = FilterContinuous::new("sum", FilterOperator::Greater, 5.0).apply(&out).unwrap();
        assert_eq!(large.ids(), &table.ids()[1..]);
        let same = SameValue::new(sum, 7.0).apply(&out).unwrap();
        assert_eq!(same.ids(), &[table.ids()[1]]);
    }

    #[test]
    fn test_derived_table_keeps_source_lock_state() {
        let mut table = abc_table();
        {
            let scope = table.unlocked(&[Part::Y]).unwrap();
            let out = scope.add_column(Variable::continuous("d"), vec![1.0, 2.0, 3.0], None).unwrap();
            assert!(!out.is_writable(Part::Y));
            scope.y().set(0, 0, 9.0).unwrap();
            assert_eq!(out.y().get(0, 0), Some(9.0));
        }
        assert!(!table.is_writable(Part::Y));

        let mut out = table.add_column(Variable::continuous("d"), vec![1.0, 2.0, 3.0], None).unwrap();
        assert!(out.y().is_shared());
        {
            let scope = out.unlocked(&[Part::Y, Part::W]).unwrap();
            assert!(!table.is_writable(Part::Y));
            scope.y().set(0, 0, 42.0).unwrap();
            scope.w().fill(0.0).unwrap();
        }
        assert_eq!(out.y().get(0, 0), Some(42.0));
        assert!(!out.y().shares_memory(table.y()));
        assert!(!out.is_writable(Part::Y));
        assert_eq!(table.y().get(0, 0), Some(9.0));
        assert!(!table.is_writable(Part::Y));

        let mut moved = table.transform(abc_domain()).unwrap();
        assert!(moved.w().is_shared());
        {
            let scope = moved.force_unlocked(&[Part::W]).unwrap();
            assert!(!scope.w().is_shared());
        }
        assert!(!table.is_writable(Part::W));
    }

    #[test]
    fn test_derived_table_without_locking_copies() {
        let table = Table::builder(abc_domain())
            .x(Matrix::zeros(2, 2))
            .y(Matrix::column_vector(vec![0.0, 1.0]))
            .metas(Matrix::<f64>::zeros(2, 1))
            .config(unlocked_config())
            .build()
            .unwrap();
        let out = table.add_column(Variable::continuous("d"), vec![1.0, 2.0], None).unwrap();
        assert!(out.is_writable(Part::Y));
        out.y().set(0, 0, 5.0).unwrap();
        assert_eq!(table.y().get(0, 0), Some(0.0));
    }

    #[test]
    fn test_rows_and_display() {
        let domain = Domain::new(
            vec![Variable::continuous("a")],
            vec![Variable::discrete("y", ["no", "yes"]).unwrap()],
            vec![Variable::string("s")],
        )
        .unwrap();
        let rows = vec![vec![1.5.into(), "yes".into(), "x".into()], vec!["?".into(), "no".into(), "".into()]];
        let table = Table::from_list(domain, &rows, None).unwrap();
        assert_eq!(table.row(0).unwrap(), vec![Value::Number(1.5), Value::Number(1.0), Value::from("x")]);
        assert!(table.row(2).is_err());
        assert_eq!(table.iter_rows().count(), 2);
        assert_eq!(table.to_string(), "[[1.5 | yes] {x},\n [? | no] {?}]");
    }

    #[test]
    fn test_table_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Table>();
    }
}
