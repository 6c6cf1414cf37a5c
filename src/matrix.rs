/// Matrix handles over shared storage.
///
/// A [`Matrix`] is a window (row range x column range) onto a storage buffer
/// shared through `Arc<RwLock<..>>`. Each handle is tagged at creation as
/// either owning its buffer or being a view of another buffer; views are
/// produced by row slicing and column access and never copy data.
///
/// Cloning a handle yields the same buffer with the same lock flag. Views get
/// a flag of their own, initialised from their base. Handles passed from one
/// table to another are shared: they get their own read-only flag and the
/// receiving table copies them before it first unlocks them.

use crate::error::{LockError, Result, TableError};
use crate::lock::LockFlag;
use crate::storage::{DenseStorage, Layout, SparseStorage, Storage};
use crate::value::{Element, Value};
use parking_lot::RwLock;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Whether a handle owns its buffer, views part of another one, or shares
/// a whole buffer with another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    View,
    Shared,
}

#[derive(Clone)]
pub struct Matrix<T: Element> {
    storage: Arc<RwLock<Storage<T>>>,
    rows: Range<usize>,
    cols: Range<usize>,
    ownership: Ownership,
    flag: Arc<LockFlag>,
}

impl<T: Element> Matrix<T> {
    pub fn from_storage(storage: Storage<T>) -> Self {
        let (nrows, ncols) = storage.shape();
        Matrix {
            storage: Arc::new(RwLock::new(storage)),
            rows: 0..nrows,
            cols: 0..ncols,
            ownership: Ownership::Owned,
            flag: Arc::new(LockFlag::new(true)),
        }
    }

    /// Row-major data of the given shape.
    pub fn dense(nrows: usize, ncols: usize, data: Vec<T>) -> Result<Self> {
        Ok(Self::from_storage(Storage::Dense(DenseStorage::new(nrows, ncols, data)?)))
    }

    /// Build from rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        let nrows = rows.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != ncols {
                return Err(TableError::Shape(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    ncols
                )));
            }
            data.extend(row);
        }
        Self::dense(nrows, ncols, data)
    }

    /// A single-column matrix.
    pub fn column_vector(values: Vec<T>) -> Self {
        let nrows = values.len();
        Self::from_storage(Storage::Dense(DenseStorage::from_parts(nrows, 1, values)))
    }

    pub fn filled(nrows: usize, ncols: usize, value: T) -> Self {
        Self::from_storage(Storage::Dense(DenseStorage::filled(nrows, ncols, value)))
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::filled(nrows, ncols, T::zero())
    }

    pub fn sparse(storage: SparseStorage<T>) -> Self {
        Self::from_storage(Storage::Sparse(storage))
    }

    // ==================== Shape & flags ====================

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// True when the matrix holds no cells.
    pub fn is_empty(&self) -> bool {
        self.nrows() == 0 || self.ncols() == 0
    }

    pub fn is_sparse(&self) -> bool {
        self.storage.read().is_sparse()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_view(&self) -> bool {
        self.ownership == Ownership::View
    }

    pub fn is_shared(&self) -> bool {
        self.ownership == Ownership::Shared
    }

    pub fn is_writable(&self) -> bool {
        self.flag.is_writable()
    }

    pub(crate) fn set_writable(&self, writable: bool) {
        self.flag.set_writable(writable);
    }

    /// Whether both handles point into the same buffer.
    pub fn shares_memory(&self, other: &Matrix<T>) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Number of physically stored entries in the underlying buffer.
    pub fn stored_len(&self) -> usize {
        self.storage.read().stored_len()
    }

    // ==================== Reads ====================

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.nrows() || col >= self.ncols() {
            return None;
        }
        self.storage.read().get(self.rows.start + row, self.cols.start + col)
    }

    pub fn row(&self, row: usize) -> Option<Vec<T>> {
        if row >= self.nrows() {
            return None;
        }
        let storage = self.storage.read();
        Some(self.read_row(&storage, row))
    }

    fn read_row(&self, storage: &Storage<T>, row: usize) -> Vec<T> {
        let r = self.rows.start + row;
        match storage {
            Storage::Dense(dense) => dense.row_slice(r, self.cols.clone()).to_vec(),
            Storage::Sparse(sparse) => {
                let mut out = vec![T::zero(); self.ncols()];
                for (col, value) in sparse.row_entries(r) {
                    if self.cols.contains(&col) {
                        out[col - self.cols.start] = value.clone();
                    }
                }
                out
            }
        }
    }

    /// Non-zero (column, value) pairs of a row, relative to this window.
    pub fn row_entries(&self, row: usize) -> Vec<(usize, T)> {
        if row >= self.nrows() {
            return Vec::new();
        }
        let storage = self.storage.read();
        let r = self.rows.start + row;
        match &*storage {
            Storage::Dense(dense) => dense
                .row_slice(r, self.cols.clone())
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_zero())
                .map(|(c, v)| (c, v.clone()))
                .collect(),
            Storage::Sparse(sparse) => sparse
                .row_entries(r)
                .filter(|(c, _)| self.cols.contains(c))
                .map(|(c, v)| (c - self.cols.start, v.clone()))
                .collect(),
        }
    }

    pub fn column(&self, col: usize) -> Option<Vec<T>> {
        if col >= self.ncols() {
            return None;
        }
        let storage = self.storage.read();
        let c = self.cols.start + col;
        Some(
            self.rows
                .clone()
                .map(|r| storage.get(r, c).unwrap_or_else(T::zero))
                .collect(),
        )
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        let storage = self.storage.read();
        (0..self.nrows()).map(|r| self.read_row(&storage, r)).collect()
    }

    /// All cells in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        self.to_rows().into_iter().flatten().collect()
    }

    // ==================== Writes ====================

    fn check_writable(&self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(LockError::ReadOnlyBuffer.into())
        }
    }

    pub fn set(&self, row: usize, col: usize, value: T) -> Result<()> {
        self.check_writable()?;
        if row >= self.nrows() || col >= self.ncols() {
            return Err(TableError::Shape(format!(
                "position ({}, {}) out of bounds for {}x{} matrix",
                row,
                col,
                self.nrows(),
                self.ncols()
            )));
        }
        self.storage
            .write()
            .set(self.rows.start + row, self.cols.start + col, value)
    }

    pub fn fill(&self, value: T) -> Result<()> {
        self.map_inplace(|_| value.clone())
    }

    pub fn map_inplace<F: Fn(&T) -> T>(&self, f: F) -> Result<()> {
        self.check_writable()?;
        let mut storage = self.storage.write();
        for r in self.rows.clone() {
            for c in self.cols.clone() {
                let current = storage.get(r, c).unwrap_or_else(T::zero);
                storage.set(r, c, f(&current))?;
            }
        }
        Ok(())
    }

    // ==================== Views & copies ====================

    fn view(&self, rows: Range<usize>, cols: Range<usize>) -> Matrix<T> {
        Matrix {
            storage: Arc::clone(&self.storage),
            rows,
            cols,
            ownership: Ownership::View,
            flag: Arc::new(LockFlag::new(self.is_writable())),
        }
    }

    /// Handle on the same window for another table: read-only, with a flag
    /// of its own.
    pub(crate) fn share(&self) -> Matrix<T> {
        Matrix {
            storage: Arc::clone(&self.storage),
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            ownership: Ownership::Shared,
            flag: Arc::new(LockFlag::new(false)),
        }
    }

    /// Zero-copy view of a contiguous row range.
    pub fn rows_view(&self, rows: Range<usize>) -> Result<Matrix<T>> {
        if rows.start > rows.end || rows.end > self.nrows() {
            return Err(TableError::Shape(format!(
                "row range {:?} out of bounds for {} rows",
                rows,
                self.nrows()
            )));
        }
        let start = self.rows.start;
        Ok(self.view(start + rows.start..start + rows.end, self.cols.clone()))
    }

    /// Zero-copy view of a contiguous column range.
    pub fn cols_view(&self, cols: Range<usize>) -> Result<Matrix<T>> {
        if cols.start > cols.end || cols.end > self.ncols() {
            return Err(TableError::Shape(format!(
                "column range {:?} out of bounds for {} columns",
                cols,
                self.ncols()
            )));
        }
        let start = self.cols.start;
        Ok(self.view(self.rows.clone(), start + cols.start..start + cols.end))
    }

    pub fn column_view(&self, col: usize) -> Result<Matrix<T>> {
        self.cols_view(col..col + 1)
    }

    /// Owned, writable copy of this window, keeping the storage format.
    pub fn copy(&self) -> Matrix<T> {
        let rows: Vec<usize> = self.rows.clone().collect();
        let extracted = self.storage.read().extract(&rows, self.cols.clone());
        Matrix::from_storage(extracted)
    }

    /// Owned copy of the listed rows.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Matrix<T>> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.nrows()) {
            return Err(TableError::Shape(format!(
                "row {} out of bounds for {} rows",
                bad,
                self.nrows()
            )));
        }
        let absolute: Vec<usize> = rows.iter().map(|r| r + self.rows.start).collect();
        let extracted = self.storage.read().extract(&absolute, self.cols.clone());
        Ok(Matrix::from_storage(extracted))
    }

    /// Owned dense copy.
    pub fn to_dense(&self) -> Matrix<T> {
        if self.is_sparse() {
            let data = self.to_vec();
            Self::from_storage(Storage::Dense(DenseStorage::from_parts(self.nrows(), self.ncols(), data)))
        } else {
            self.copy()
        }
    }

    /// Owned sparse copy.
    pub fn to_sparse(&self) -> Matrix<T> {
        match self.copy() {
            m if m.is_sparse() => m,
            m => {
                let storage = m.storage.read();
                match &*storage {
                    Storage::Dense(dense) => Matrix::sparse(SparseStorage::from_dense(dense)),
                    Storage::Sparse(sparse) => Matrix::sparse(sparse.clone()),
                }
            }
        }
    }

    /// Owned dense matrix of mapped values.
    pub fn map<U: Element, F: Fn(&T) -> U>(&self, f: F) -> Matrix<U> {
        let data: Vec<U> = self.to_vec().iter().map(f).collect();
        Matrix::from_storage(Storage::Dense(DenseStorage::from_parts(self.nrows(), self.ncols(), data)))
    }

    // ==================== Stacking ====================

    /// Place matrices side by side. Sparse if any input is sparse.
    pub fn hstack(parts: &[&Matrix<T>], nrows: usize) -> Result<Matrix<T>> {
        if let Some(bad) = parts.iter().find(|m| m.nrows() != nrows) {
            return Err(TableError::Shape(format!(
                "cannot stack {} rows beside {} rows",
                bad.nrows(),
                nrows
            )));
        }
        let ncols: usize = parts.iter().map(|m| m.ncols()).sum();
        if parts.iter().any(|m| m.is_sparse()) {
            let mut row_ptrs = vec![0];
            let mut col_indices = Vec::new();
            let mut values = Vec::new();
            for r in 0..nrows {
                let mut offset = 0;
                for part in parts {
                    for (c, v) in part.row_entries(r) {
                        col_indices.push(offset + c);
                        values.push(v);
                    }
                    offset += part.ncols();
                }
                row_ptrs.push(values.len());
            }
            let sparse = SparseStorage::from_csr(nrows, ncols, row_ptrs, col_indices, values)?;
            return Ok(Matrix::sparse(sparse));
        }
        let part_rows: Vec<Vec<Vec<T>>> = parts.iter().map(|m| m.to_rows()).collect();
        let mut data = Vec::with_capacity(nrows * ncols);
        for r in 0..nrows {
            for rows in &part_rows {
                data.extend(rows[r].iter().cloned());
            }
        }
        Matrix::dense(nrows, ncols, data)
    }

    /// Stack matrices on top of each other. Sparse if any input is sparse.
    pub fn vstack(parts: &[&Matrix<T>], ncols: usize) -> Result<Matrix<T>> {
        if let Some(bad) = parts.iter().find(|m| m.ncols() != ncols) {
            return Err(TableError::Shape(format!(
                "cannot stack {} columns below {} columns",
                bad.ncols(),
                ncols
            )));
        }
        let nrows: usize = parts.iter().map(|m| m.nrows()).sum();
        if parts.iter().any(|m| m.is_sparse()) {
            let mut row_ptrs = vec![0];
            let mut col_indices = Vec::new();
            let mut values = Vec::new();
            for part in parts {
                for r in 0..part.nrows() {
                    for (c, v) in part.row_entries(r) {
                        col_indices.push(c);
                        values.push(v);
                    }
                    row_ptrs.push(values.len());
                }
            }
            let sparse = SparseStorage::from_csr(nrows, ncols, row_ptrs, col_indices, values)?;
            return Ok(Matrix::sparse(sparse));
        }
        let data: Vec<T> = parts.iter().flat_map(|m| m.to_vec()).collect();
        Matrix::dense(nrows, ncols, data)
    }

    pub(crate) fn with_storage<R>(&self, f: impl FnOnce(&Storage<T>, &Range<usize>, &Range<usize>) -> R) -> R {
        let storage = self.storage.read();
        f(&storage, &self.rows, &self.cols)
    }
}

impl<T: Element> PartialEq for Matrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.to_vec() == other.to_vec()
    }
}

impl<T: Element> fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("shape", &self.shape())
            .field("sparse", &self.is_sparse())
            .field("ownership", &self.ownership)
            .field("writable", &self.is_writable())
            .finish()
    }
}

// ==================== Meta block ====================

/// Storage of the metas part: numeric while every meta is primitive,
/// object once text is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaBlock {
    Numeric(Matrix<f64>),
    Object(Matrix<Value>),
}

impl From<Matrix<f64>> for MetaBlock {
    fn from(m: Matrix<f64>) -> Self {
        MetaBlock::Numeric(m)
    }
}

impl From<Matrix<Value>> for MetaBlock {
    fn from(m: Matrix<Value>) -> Self {
        MetaBlock::Object(m)
    }
}

impl MetaBlock {
    pub fn empty(nrows: usize) -> Self {
        MetaBlock::Numeric(Matrix::zeros(nrows, 0))
    }

    pub fn nrows(&self) -> usize {
        match self {
            MetaBlock::Numeric(m) => m.nrows(),
            MetaBlock::Object(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            MetaBlock::Numeric(m) => m.ncols(),
            MetaBlock::Object(m) => m.ncols(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, MetaBlock::Object(_))
    }

    pub fn is_sparse(&self) -> bool {
        match self {
            MetaBlock::Numeric(m) => m.is_sparse(),
            MetaBlock::Object(m) => m.is_sparse(),
        }
    }

    pub fn is_view(&self) -> bool {
        match self {
            MetaBlock::Numeric(m) => m.is_view(),
            MetaBlock::Object(m) => m.is_view(),
        }
    }

    pub fn is_shared(&self) -> bool {
        match self {
            MetaBlock::Numeric(m) => m.is_shared(),
            MetaBlock::Object(m) => m.is_shared(),
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            MetaBlock::Numeric(m) => m.is_writable(),
            MetaBlock::Object(m) => m.is_writable(),
        }
    }

    pub(crate) fn set_writable(&self, writable: bool) {
        match self {
            MetaBlock::Numeric(m) => m.set_writable(writable),
            MetaBlock::Object(m) => m.set_writable(writable),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Value> {
        match self {
            MetaBlock::Numeric(m) => m.get(row, col).map(Value::Number),
            MetaBlock::Object(m) => m.get(row, col),
        }
    }

    pub fn row(&self, row: usize) -> Option<Vec<Value>> {
        match self {
            MetaBlock::Numeric(m) => m.row(row).map(|r| r.into_iter().map(Value::Number).collect()),
            MetaBlock::Object(m) => m.row(row),
        }
    }

    /// Write one cell. Numeric blocks accept numbers only.
    pub fn set(&self, row: usize, col: usize, value: Value) -> Result<()> {
        match (self, value) {
            (MetaBlock::Numeric(m), Value::Number(v)) => m.set(row, col, v),
            (MetaBlock::Numeric(_), Value::Text(s)) => Err(TableError::Schema(format!(
                "cannot store text '{}' in numeric metas",
                s
            ))),
            (MetaBlock::Object(m), value) => m.set(row, col, value),
        }
    }

    /// Object-typed copy (or handle, when already object).
    pub fn to_object(&self) -> Matrix<Value> {
        match self {
            MetaBlock::Numeric(m) => m.map(|v| Value::Number(*v)),
            MetaBlock::Object(m) => m.clone(),
        }
    }

    pub fn copy(&self) -> MetaBlock {
        match self {
            MetaBlock::Numeric(m) => MetaBlock::Numeric(m.copy()),
            MetaBlock::Object(m) => MetaBlock::Object(m.copy()),
        }
    }

    pub(crate) fn share(&self) -> MetaBlock {
        match self {
            MetaBlock::Numeric(m) => MetaBlock::Numeric(m.share()),
            MetaBlock::Object(m) => MetaBlock::Object(m.share()),
        }
    }

    pub fn rows_view(&self, rows: Range<usize>) -> Result<MetaBlock> {
        Ok(match self {
            MetaBlock::Numeric(m) => MetaBlock::Numeric(m.rows_view(rows)?),
            MetaBlock::Object(m) => MetaBlock::Object(m.rows_view(rows)?),
        })
    }

    pub fn column_view(&self, col: usize) -> Result<MetaBlock> {
        Ok(match self {
            MetaBlock::Numeric(m) => MetaBlock::Numeric(m.column_view(col)?),
            MetaBlock::Object(m) => MetaBlock::Object(m.column_view(col)?),
        })
    }

    pub fn take_rows(&self, rows: &[usize]) -> Result<MetaBlock> {
        Ok(match self {
            MetaBlock::Numeric(m) => MetaBlock::Numeric(m.take_rows(rows)?),
            MetaBlock::Object(m) => MetaBlock::Object(m.take_rows(rows)?),
        })
    }

    pub fn hstack(blocks: &[&MetaBlock], nrows: usize) -> Result<MetaBlock> {
        let numeric: Option<Vec<&Matrix<f64>>> = blocks
            .iter()
            .map(|b| match b {
                MetaBlock::Numeric(m) => Some(m),
                MetaBlock::Object(_) => None,
            })
            .collect();
        match numeric {
            Some(parts) => Ok(MetaBlock::Numeric(Matrix::hstack(&parts, nrows)?)),
            None => {
                let objects: Vec<Matrix<Value>> = blocks.iter().map(|b| b.to_object()).collect();
                let parts: Vec<&Matrix<Value>> = objects.iter().collect();
                Ok(MetaBlock::Object(Matrix::hstack(&parts, nrows)?))
            }
        }
    }

    pub fn vstack(blocks: &[&MetaBlock], ncols: usize) -> Result<MetaBlock> {
        let numeric: Option<Vec<&Matrix<f64>>> = blocks
            .iter()
            .map(|b| match b {
                MetaBlock::Numeric(m) => Some(m),
                MetaBlock::Object(_) => None,
            })
            .collect();
        match numeric {
            Some(parts) => Ok(MetaBlock::Numeric(Matrix::vstack(&parts, ncols)?)),
            None => {
                let objects: Vec<Matrix<Value>> = blocks.iter().map(|b| b.to_object()).collect();
                let parts: Vec<&Matrix<Value>> = objects.iter().collect();
                Ok(MetaBlock::Object(Matrix::vstack(&parts, ncols)?))
            }
        }
    }
}
