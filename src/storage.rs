/// Storage Implementation
///
/// The storage layer holds the raw 2-D buffers behind every table block.
/// Supports two implementations behind one `Layout` trait:
/// - DenseStorage: contiguous row-major buffer, O(1) access
/// - SparseStorage: compressed sparse rows (CSR), O(log k) access within a row
///
/// Absent sparse entries read as `Element::zero()`. Missing values (NaN) are
/// stored explicitly.

use crate::error::{Result, TableError};
use crate::value::Element;
use std::ops::Range;

/// Trait for 2-D storage operations
pub trait Layout<T: Element> {
    /// Number of rows
    fn nrows(&self) -> usize;

    /// Number of columns
    fn ncols(&self) -> usize;

    /// Get value at (row, col) - clones the value
    fn get(&self, row: usize, col: usize) -> Option<T>;

    /// Set value at (row, col)
    fn set(&mut self, row: usize, col: usize, value: T) -> Result<()>;

    /// Number of physically stored entries
    fn stored_len(&self) -> usize;

    /// Copy out a sub-region: the listed rows, restricted to a column range.
    fn extract(&self, rows: &[usize], cols: Range<usize>) -> Storage<T>;

    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }
}

fn out_of_bounds(row: usize, col: usize, shape: (usize, usize)) -> TableError {
    TableError::Shape(format!(
        "position ({}, {}) out of bounds for {}x{} buffer",
        row, col, shape.0, shape.1
    ))
}

/// Contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseStorage<T> {
    data: Vec<T>,
    nrows: usize,
    ncols: usize,
}

impl<T: Element> DenseStorage<T> {
    pub fn new(nrows: usize, ncols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != nrows * ncols {
            return Err(TableError::Shape(format!(
                "{} values cannot fill a {}x{} buffer",
                data.len(),
                nrows,
                ncols
            )));
        }
        Ok(DenseStorage { data, nrows, ncols })
    }

    /// Caller guarantees `data.len() == nrows * ncols`.
    pub(crate) fn from_parts(nrows: usize, ncols: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), nrows * ncols);
        DenseStorage { data, nrows, ncols }
    }

    pub fn filled(nrows: usize, ncols: usize, value: T) -> Self {
        DenseStorage {
            data: vec![value; nrows * ncols],
            nrows,
            ncols,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Values of one row restricted to a column range.
    pub fn row_slice(&self, row: usize, cols: Range<usize>) -> &[T] {
        let start = row * self.ncols;
        &self.data[start + cols.start..start + cols.end]
    }
}

impl<T: Element> Layout<T> for DenseStorage<T> {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        self.data.get(row * self.ncols + col).cloned()
    }

    fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.nrows || col >= self.ncols {
            return Err(out_of_bounds(row, col, self.shape()));
        }
        self.data[row * self.ncols + col] = value;
        Ok(())
    }

    fn stored_len(&self) -> usize {
        self.data.len()
    }

    fn extract(&self, rows: &[usize], cols: Range<usize>) -> Storage<T> {
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for &row in rows {
            data.extend_from_slice(self.row_slice(row, cols.clone()));
        }
        Storage::Dense(DenseStorage {
            data,
            nrows: rows.len(),
            ncols: cols.len(),
        })
    }
}

/// Compressed sparse row buffer.
///
/// For row `i`, the stored values are `values[row_ptrs[i]..row_ptrs[i + 1]]`
/// with their columns in `col_indices` at the same positions, sorted ascending.
/// Column-compressed (CSC) input is converted to this layout on construction
/// and can be exported again with [`SparseStorage::to_csc`].
#[derive(Debug, Clone, PartialEq)]
pub struct SparseStorage<T> {
    values: Vec<T>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
    nrows: usize,
    ncols: usize,
}

impl<T: Element> SparseStorage<T> {
    /// An all-zero sparse buffer.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        SparseStorage {
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; nrows + 1],
            nrows,
            ncols,
        }
    }

    /// Build from raw CSR arrays, validating their structure.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self> {
        let malformed = |msg: &str| TableError::Shape(format!("malformed CSR buffer: {}", msg));
        if row_ptrs.len() != nrows + 1 {
            return Err(malformed("row pointer count must be rows + 1"));
        }
        if col_indices.len() != values.len() || row_ptrs.last().copied() != Some(values.len()) {
            return Err(malformed("index and value counts disagree"));
        }
        for row in 0..nrows {
            let (start, end) = (row_ptrs[row], row_ptrs[row + 1]);
            if start > end {
                return Err(malformed("row pointers must not decrease"));
            }
            let cols = &col_indices[start..end];
            if cols.iter().any(|&c| c >= ncols) || cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(malformed("column indices must be in range and strictly increasing"));
            }
        }
        Ok(SparseStorage {
            values,
            col_indices,
            row_ptrs,
            nrows,
            ncols,
        })
    }

    /// Build from raw CSC arrays: `values[col_ptrs[j]..col_ptrs[j + 1]]`
    /// hold column `j`, with their rows in `row_indices`.
    pub fn from_csc(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self> {
        Ok(Self::from_csr(ncols, nrows, col_ptrs, row_indices, values)?.transpose())
    }

    /// Column pointers, row indices and values of the CSC form.
    pub fn to_csc(&self) -> (Vec<usize>, Vec<usize>, Vec<T>) {
        let t = self.transpose();
        (t.row_ptrs, t.col_indices, t.values)
    }

    fn transpose(&self) -> SparseStorage<T> {
        let mut row_ptrs = vec![0; self.ncols + 1];
        for &col in &self.col_indices {
            row_ptrs[col + 1] += 1;
        }
        for i in 0..self.ncols {
            row_ptrs[i + 1] += row_ptrs[i];
        }
        let mut next = row_ptrs.clone();
        let mut col_indices = vec![0; self.values.len()];
        let mut values = vec![T::zero(); self.values.len()];
        for row in 0..self.nrows {
            for (col, value) in self.row_entries(row) {
                let pos = next[col];
                col_indices[pos] = row;
                values[pos] = value.clone();
                next[col] += 1;
            }
        }
        SparseStorage {
            values,
            col_indices,
            row_ptrs,
            nrows: self.ncols,
            ncols: self.nrows,
        }
    }

    /// Compress a dense buffer, dropping zero entries.
    pub fn from_dense(dense: &DenseStorage<T>) -> Self {
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = Vec::with_capacity(dense.nrows + 1);
        row_ptrs.push(0);
        for row in 0..dense.nrows {
            for (col, value) in dense.row_slice(row, 0..dense.ncols).iter().enumerate() {
                if !value.is_zero() {
                    col_indices.push(col);
                    values.push(value.clone());
                }
            }
            row_ptrs.push(values.len());
        }
        SparseStorage {
            values,
            col_indices,
            row_ptrs,
            nrows: dense.nrows,
            ncols: dense.ncols,
        }
    }

    pub fn to_dense(&self) -> DenseStorage<T> {
        let mut dense = DenseStorage::filled(self.nrows, self.ncols, T::zero());
        for row in 0..self.nrows {
            for (col, value) in self.row_entries(row) {
                dense.data[row * self.ncols + col] = value.clone();
            }
        }
        dense
    }

    /// Stored (column, value) pairs of a row.
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, &T)> {
        let range = self.row_ptrs[row]..self.row_ptrs[row + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter())
    }

    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    fn position(&self, row: usize, col: usize) -> std::result::Result<usize, usize> {
        let start = self.row_ptrs[row];
        let end = self.row_ptrs[row + 1];
        self.col_indices[start..end]
            .binary_search(&col)
            .map(|i| start + i)
            .map_err(|i| start + i)
    }
}

impl<T: Element> Layout<T> for SparseStorage<T> {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        match self.position(row, col) {
            Ok(pos) => Some(self.values[pos].clone()),
            Err(_) => Some(T::zero()),
        }
    }

    fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.nrows || col >= self.ncols {
            return Err(out_of_bounds(row, col, self.shape()));
        }
        match self.position(row, col) {
            Ok(pos) => self.values[pos] = value,
            Err(pos) => {
                self.values.insert(pos, value);
                self.col_indices.insert(pos, col);
                for ptr in &mut self.row_ptrs[row + 1..] {
                    *ptr += 1;
                }
            }
        }
        Ok(())
    }

    fn stored_len(&self) -> usize {
        self.values.len()
    }

    fn extract(&self, rows: &[usize], cols: Range<usize>) -> Storage<T> {
        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = Vec::with_capacity(rows.len() + 1);
        row_ptrs.push(0);
        for &row in rows {
            for (col, value) in self.row_entries(row) {
                if cols.contains(&col) {
                    col_indices.push(col - cols.start);
                    values.push(value.clone());
                }
            }
            row_ptrs.push(values.len());
        }
        Storage::Sparse(SparseStorage {
            values,
            col_indices,
            row_ptrs,
            nrows: rows.len(),
            ncols: cols.len(),
        })
    }
}

/// Either storage format.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage<T> {
    Dense(DenseStorage<T>),
    Sparse(SparseStorage<T>),
}

impl<T: Element> Storage<T> {
    pub fn is_sparse(&self) -> bool {
        matches!(self, Storage::Sparse(_))
    }

    fn inner(&self) -> &dyn Layout<T> {
        match self {
            Storage::Dense(d) => d,
            Storage::Sparse(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Layout<T> {
        match self {
            Storage::Dense(d) => d,
            Storage::Sparse(s) => s,
        }
    }
}

impl<T: Element> Layout<T> for Storage<T> {
    fn nrows(&self) -> usize {
        self.inner().nrows()
    }

    fn ncols(&self) -> usize {
        self.inner().ncols()
    }

    fn get(&self, row: usize, col: usize) -> Option<T> {
        self.inner().get(row, col)
    }

    fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.inner_mut().set(row, col, value)
    }

    fn stored_len(&self) -> usize {
        self.inner().stored_len()
    }

    fn extract(&self, rows: &[usize], cols: Range<usize>) -> Storage<T> {
        self.inner().extract(rows, cols)
    }
}
