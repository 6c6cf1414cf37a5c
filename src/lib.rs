//! Tabular - typed columnar data tables
//!
//! A [`Table`] binds row data to a [`Domain`] of typed [`Variable`]s. Values
//! live in dense or sparse blocks (attributes, class variables, metas,
//! weights) that may be shared between tables as zero-copy views. Tables
//! are read-only outside of explicit unlocked scopes, and can be filtered by
//! row predicates built in code or parsed from text.

pub mod concat;
pub mod config;
pub mod domain;
pub mod error;
pub mod expr;
pub mod filter;
pub mod lock;
pub mod matrix;
mod persist;
pub mod storage;
pub mod table;
pub mod value;
pub mod variable;

pub use concat::Axis;
pub use config::{MissingValues, TableConfig};
pub use domain::{Domain, Key, Role};
pub use error::{LockError, Result, TableError};
pub use expr::parse_filter;
pub use filter::{Filter, FilterKind, FilterOperator, RowFilter};
pub use lock::{Part, Unlocked};
pub use matrix::{Matrix, MetaBlock, Ownership};
pub use storage::{DenseStorage, Layout, SparseStorage, Storage};
pub use table::{ColumnData, Table, TableBuilder, TableRowIterator};
pub use value::{Element, Value};
pub use variable::{ComputeValue, VarType, Variable, VariableKind};
