/// Table persistence.
///
/// Tables are written as self-describing JSON documents: the domain, every
/// block in its storage format, row ids, name and attributes. Missing numbers
/// (NaN) are written as `null` and infinities as `{"inf": 1}` or
/// `{"inf": -1}`. Sparse blocks stay sparse.
///
/// Derived variables carry a function and cannot be written.

use crate::config::TableConfig;
use crate::domain::Domain;
use crate::error::{Result, TableError};
use crate::matrix::{Matrix, MetaBlock};
use crate::storage::{SparseStorage, Storage};
use crate::table::{Table, TableBuilder};
use crate::value::{Element, Value};
use crate::variable::{Variable, VariableKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Map;

// ==================== Snapshots ====================

#[derive(Debug, Serialize, Deserialize)]
struct TableSnapshot {
    name: String,
    #[serde(default)]
    attributes: Map<String, serde_json::Value>,
    domain: DomainSnapshot,
    x: BlockSnapshot<NumberCell>,
    y: BlockSnapshot<NumberCell>,
    metas: MetaSnapshot,
    w: BlockSnapshot<NumberCell>,
    ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DomainSnapshot {
    attributes: Vec<VariableSnapshot>,
    class_vars: Vec<VariableSnapshot>,
    metas: Vec<VariableSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VariableSnapshot {
    name: String,
    kind: VariableKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
enum BlockSnapshot<C> {
    Dense {
        nrows: usize,
        ncols: usize,
        data: Vec<C>,
    },
    Sparse {
        nrows: usize,
        ncols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<C>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "storage", content = "block", rename_all = "lowercase")]
enum MetaSnapshot {
    Numeric(BlockSnapshot<NumberCell>),
    Object(BlockSnapshot<CellSnapshot>),
}

/// A number cell. JSON has no literal for NaN or infinity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum NumberCell {
    Finite(f64),
    Infinite { inf: i8 },
    Missing,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum CellSnapshot {
    Number(NumberCell),
    Text(String),
}

/// Elements that have a JSON cell representation.
trait Persist: Element {
    type Cell: Serialize + DeserializeOwned;

    fn to_cell(&self) -> Self::Cell;
    fn from_cell(cell: Self::Cell) -> Self;
}

impl Persist for f64 {
    type Cell = NumberCell;

    fn to_cell(&self) -> NumberCell {
        if self.is_nan() {
            NumberCell::Missing
        } else if self.is_infinite() {
            NumberCell::Infinite {
                inf: if *self > 0.0 { 1 } else { -1 },
            }
        } else {
            NumberCell::Finite(*self)
        }
    }

    fn from_cell(cell: NumberCell) -> f64 {
        match cell {
            NumberCell::Finite(v) => v,
            NumberCell::Infinite { inf } if inf < 0 => f64::NEG_INFINITY,
            NumberCell::Infinite { .. } => f64::INFINITY,
            NumberCell::Missing => f64::NAN,
        }
    }
}

impl Persist for Value {
    type Cell = CellSnapshot;

    fn to_cell(&self) -> CellSnapshot {
        match self {
            Value::Number(v) => CellSnapshot::Number(v.to_cell()),
            Value::Text(s) => CellSnapshot::Text(s.clone()),
        }
    }

    fn from_cell(cell: CellSnapshot) -> Value {
        match cell {
            CellSnapshot::Number(v) => Value::Number(f64::from_cell(v)),
            CellSnapshot::Text(s) => Value::Text(s),
        }
    }
}

fn block_snapshot<T: Persist>(m: &Matrix<T>) -> BlockSnapshot<T::Cell> {
    let (nrows, ncols) = m.shape();
    if !m.is_sparse() {
        return BlockSnapshot::Dense {
            nrows,
            ncols,
            data: m.to_vec().iter().map(T::to_cell).collect(),
        };
    }
    // The copy starts at row 0, so its row pointers are usable as they are.
    m.copy().with_storage(|storage, _, _| match storage {
        Storage::Sparse(s) => BlockSnapshot::Sparse {
            nrows,
            ncols,
            row_ptrs: s.row_ptrs().to_vec(),
            col_indices: s.col_indices().to_vec(),
            values: s.values().iter().map(T::to_cell).collect(),
        },
        Storage::Dense(d) => BlockSnapshot::Dense {
            nrows,
            ncols,
            data: d.as_slice().iter().map(T::to_cell).collect(),
        },
    })
}

fn restore_block<T: Persist>(snapshot: BlockSnapshot<T::Cell>) -> Result<Matrix<T>> {
    match snapshot {
        BlockSnapshot::Dense { nrows, ncols, data } => {
            Matrix::dense(nrows, ncols, data.into_iter().map(T::from_cell).collect())
        }
        BlockSnapshot::Sparse {
            nrows,
            ncols,
            row_ptrs,
            col_indices,
            values,
        } => {
            let values = values.into_iter().map(T::from_cell).collect();
            Ok(Matrix::sparse(SparseStorage::from_csr(nrows, ncols, row_ptrs, col_indices, values)?))
        }
    }
}

fn variable_snapshots(vars: &[Variable]) -> Result<Vec<VariableSnapshot>> {
    vars.iter()
        .map(|var| {
            if var.is_derived() {
                return Err(TableError::Schema(format!(
                    "derived variable '{}' cannot be serialized",
                    var.name()
                )));
            }
            Ok(VariableSnapshot {
                name: var.name().to_string(),
                kind: var.kind().clone(),
            })
        })
        .collect()
}

fn restore_variables(snapshots: Vec<VariableSnapshot>) -> Result<Vec<Variable>> {
    snapshots
        .into_iter()
        .map(|v| match v.kind {
            VariableKind::Discrete { values } => Variable::discrete(v.name, values),
            kind => Ok(Variable::from_kind(v.name, kind)),
        })
        .collect()
}

// ==================== Table entry points ====================

impl Table {
    fn snapshot(&self) -> Result<TableSnapshot> {
        let domain = self.domain();
        Ok(TableSnapshot {
            name: self.name().to_string(),
            attributes: self.attributes().clone(),
            domain: DomainSnapshot {
                attributes: variable_snapshots(domain.attributes())?,
                class_vars: variable_snapshots(domain.class_vars())?,
                metas: variable_snapshots(domain.metas())?,
            },
            x: block_snapshot(self.x()),
            y: block_snapshot(self.y()),
            metas: match self.metas() {
                MetaBlock::Numeric(m) => MetaSnapshot::Numeric(block_snapshot(m)),
                MetaBlock::Object(m) => MetaSnapshot::Object(block_snapshot(m)),
            },
            w: block_snapshot(self.w()),
            ids: self.ids().to_vec(),
        })
    }

    fn restore(snapshot: TableSnapshot, config: TableConfig) -> Result<Table> {
        let domain = Domain::new(
            restore_variables(snapshot.domain.attributes)?,
            restore_variables(snapshot.domain.class_vars)?,
            restore_variables(snapshot.domain.metas)?,
        )?;
        let metas = match snapshot.metas {
            MetaSnapshot::Numeric(block) => MetaBlock::Numeric(restore_block(block)?),
            MetaSnapshot::Object(block) => MetaBlock::Object(restore_block(block)?),
        };
        TableBuilder::new(domain)
            .x(restore_block(snapshot.x)?)
            .y(restore_block(snapshot.y)?)
            .metas(metas)
            .w(restore_block(snapshot.w)?)
            .ids(snapshot.ids)
            .attributes(snapshot.attributes)
            .name(snapshot.name)
            .config(config)
            .build()
    }

    /// Serialize the table to a JSON document.
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(&self.snapshot()?)?;
        log::debug!("serialized table '{}' ({} bytes)", self.name(), json.len());
        Ok(json)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_json()?.into_bytes())
    }

    /// Restore a table written by [`Table::to_json`]. Every buffer of the
    /// result is owned; locking follows the process default.
    pub fn from_json(json: &str) -> Result<Table> {
        Self::from_json_with_config(json, TableConfig::default())
    }

    pub fn from_json_with_config(json: &str, config: TableConfig) -> Result<Table> {
        let snapshot: TableSnapshot = serde_json::from_str(json)?;
        let table = Self::restore(snapshot, config)?;
        log::debug!("restored table '{}' with {} rows", table.name(), table.len());
        Ok(table)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Table> {
        Self::from_bytes_with_config(bytes, TableConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], config: TableConfig) -> Result<Table> {
        let snapshot: TableSnapshot = serde_json::from_slice(bytes)?;
        Self::restore(snapshot, config)
    }
}
