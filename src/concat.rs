/// Table concatenation.
///
/// Horizontal concatenation (`Axis::Columns`) places tables with equal row
/// counts side by side, merging their domains role by role. Vertical
/// concatenation (`Axis::Rows`) stacks tables over the same domain.

use crate::domain::Domain;
use crate::error::{Result, TableError};
use crate::matrix::{Matrix, MetaBlock};
use crate::table::{Table, TableBuilder, DEFAULT_NAME};
use crate::variable::Variable;
use serde_json::Map;
use std::sync::Arc;

/// Direction of concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Stack rows (axis 0).
    Rows,
    /// Place columns side by side (axis 1).
    Columns,
}

impl TryFrom<usize> for Axis {
    type Error = TableError;

    fn try_from(axis: usize) -> Result<Self> {
        match axis {
            0 => Ok(Axis::Rows),
            1 => Ok(Axis::Columns),
            other => Err(TableError::InvalidAxis(other)),
        }
    }
}

impl Table {
    /// Concatenate tables along `axis`.
    ///
    /// ```
    /// use tabular::{Axis, Domain, Matrix, Table, Variable};
    ///
    /// let left = Table::from_arrays(
    ///     Domain::new(vec![Variable::continuous("a")], vec![], vec![]).unwrap(),
    ///     Matrix::column_vector(vec![1.0, 2.0]),
    ///     None,
    /// ).unwrap();
    /// let right = Table::from_arrays(
    ///     Domain::new(vec![Variable::continuous("b")], vec![], vec![]).unwrap(),
    ///     Matrix::column_vector(vec![3.0, 4.0]),
    ///     None,
    /// ).unwrap();
    ///
    /// let both = Table::concatenate(&[&left, &right], Axis::Columns).unwrap();
    /// assert_eq!(both.x().row(1), Some(vec![2.0, 4.0]));
    /// ```
    pub fn concatenate(tables: &[&Table], axis: Axis) -> Result<Table> {
        Self::concatenate_with(tables, axis, false)
    }

    /// Like [`Table::concatenate`]. With `ignore_domains`, vertical
    /// concatenation takes the first table's domain without comparing it to
    /// the others; the blocks must still have matching widths.
    ///
    /// `ignore_domains` has no effect on `Axis::Columns`: horizontal
    /// concatenation always merges the domains, so variables that clash by
    /// name still fail with a schema error.
    pub fn concatenate_with(tables: &[&Table], axis: Axis, ignore_domains: bool) -> Result<Table> {
        if tables.is_empty() {
            return Err(TableError::Shape("need at least one table to concatenate".to_string()));
        }
        let table = match axis {
            Axis::Columns => concat_columns(tables)?,
            Axis::Rows => concat_rows(tables, ignore_domains)?,
        };
        log::debug!(
            "concatenated {} tables along {:?} into {} rows over {}",
            tables.len(),
            axis,
            table.len(),
            table.domain()
        );
        Ok(table)
    }
}

// ==================== Shared pieces ====================

fn merged_name(tables: &[&Table]) -> String {
    tables
        .iter()
        .map(|t| t.name())
        .find(|name| *name != DEFAULT_NAME)
        .unwrap_or(DEFAULT_NAME)
        .to_string()
}

fn merged_attributes(tables: &[&Table]) -> Map<String, serde_json::Value> {
    let mut out = Map::new();
    for table in tables {
        for (key, value) in table.attributes() {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

// ==================== Horizontal ====================

/// Variables of one role not seen earlier, with the (table, column) they come from.
fn collect_role<'a>(tables: &[&'a Table], vars_of: impl Fn(&'a Table) -> &'a [Variable]) -> (Vec<Variable>, Vec<(usize, usize)>) {
    let mut vars: Vec<Variable> = Vec::new();
    let mut sources = Vec::new();
    for (t, &table) in tables.iter().enumerate() {
        for (c, var) in vars_of(table).iter().enumerate() {
            if !vars.contains(var) {
                vars.push(var.clone());
                sources.push((t, c));
            }
        }
    }
    (vars, sources)
}

fn stack_numeric(
    tables: &[&Table],
    sources: &[(usize, usize)],
    block_of: impl Fn(&Table) -> &Matrix<f64>,
    nrows: usize,
) -> Result<Matrix<f64>> {
    let columns = sources
        .iter()
        .map(|&(t, c)| block_of(tables[t]).column_view(c))
        .collect::<Result<Vec<_>>>()?;
    let parts: Vec<&Matrix<f64>> = columns.iter().collect();
    Matrix::hstack(&parts, nrows)
}

fn concat_columns(tables: &[&Table]) -> Result<Table> {
    let first = tables[0];
    let nrows = first.len();
    if let Some(bad) = tables.iter().find(|t| t.len() != nrows) {
        return Err(TableError::Shape(format!(
            "cannot concatenate a table of {} rows beside one of {} rows",
            bad.len(),
            nrows
        )));
    }

    let (attributes, x_sources) = collect_role(tables, |t| t.domain().attributes());
    let (class_vars, y_sources) = collect_role(tables, |t| t.domain().class_vars());
    let (metas, m_sources) = collect_role(tables, |t| t.domain().metas());
    let domain = Domain::new(attributes, class_vars, metas)?;

    let x = stack_numeric(tables, &x_sources, |t| t.x(), nrows)?;
    let y = stack_numeric(tables, &y_sources, |t| t.y(), nrows)?;
    let meta_columns = m_sources
        .iter()
        .map(|&(t, c)| tables[t].metas().column_view(c))
        .collect::<Result<Vec<_>>>()?;
    let meta_parts: Vec<&MetaBlock> = meta_columns.iter().collect();
    let metas = MetaBlock::hstack(&meta_parts, nrows)?;

    let mut builder = TableBuilder::new(domain)
        .x(x)
        .y(y)
        .metas(metas)
        .ids(first.ids().to_vec())
        .attributes(merged_attributes(tables))
        .name(merged_name(tables))
        .config(first.config().clone());
    if let Some(weighted) = tables.iter().find(|t| t.has_weights()) {
        builder = builder.w(weighted.w().copy());
    }
    builder.build()
}

// ==================== Vertical ====================

fn concat_rows(tables: &[&Table], ignore_domains: bool) -> Result<Table> {
    let first = tables[0];
    let domain: &Arc<Domain> = first.domain();
    if !ignore_domains {
        if let Some(other) = tables.iter().find(|t| t.domain().as_ref() != domain.as_ref()) {
            return Err(TableError::Schema(format!(
                "cannot stack rows over different domains {} and {}",
                domain,
                other.domain()
            )));
        }
    }

    let xs: Vec<&Matrix<f64>> = tables.iter().map(|t| t.x()).collect();
    let ys: Vec<&Matrix<f64>> = tables.iter().map(|t| t.y()).collect();
    let metas: Vec<&MetaBlock> = tables.iter().map(|t| t.metas()).collect();
    let x = Matrix::vstack(&xs, first.x().ncols())?;
    let y = Matrix::vstack(&ys, first.y().ncols())?;
    let metas = MetaBlock::vstack(&metas, first.metas().ncols())?;
    let ids: Vec<i64> = tables.iter().flat_map(|t| t.ids().iter().copied()).collect();

    let weighted = tables.iter().filter(|t| t.has_weights()).count();
    let mut builder = TableBuilder::new(Arc::clone(domain))
        .x(x)
        .y(y)
        .metas(metas)
        .ids(ids)
        .attributes(merged_attributes(tables))
        .name(merged_name(tables))
        .config(first.config().clone());
    if weighted == tables.len() {
        let ws: Vec<&Matrix<f64>> = tables.iter().map(|t| t.w()).collect();
        builder = builder.w(Matrix::vstack(&ws, 1)?);
    } else if weighted > 0 {
        return Err(TableError::Shape(format!(
            "{} of {} tables have weights; stack all weighted or none",
            weighted,
            tables.len()
        )));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::lock::Part;
    use crate::value::Value;
    use serde_json::json;

    fn config() -> TableConfig {
        TableConfig::default().with_locking(true)
    }

    fn table(attrs: &[&str], class: &[&str], x: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> Table {
        let domain = Domain::new(
            attrs.iter().map(|a| Variable::continuous(*a)).collect(),
            class.iter().map(|c| Variable::continuous(*c)).collect(),
            vec![],
        )
        .unwrap();
        let n = x.len();
        let y = if class.is_empty() {
            Matrix::zeros(n, 0)
        } else {
            Matrix::from_rows(y).unwrap()
        };
        Table::builder(domain)
            .x(Matrix::from_rows(x).unwrap())
            .y(y)
            .config(config())
            .build()
            .unwrap()
    }

    #[test]
    fn test_axis_from_usize() {
        assert_eq!(Axis::try_from(0).unwrap(), Axis::Rows);
        assert_eq!(Axis::try_from(1).unwrap(), Axis::Columns);
        assert!(matches!(Axis::try_from(2), Err(TableError::InvalidAxis(2))));
    }

    #[test]
    fn test_no_tables() {
        assert!(Table::concatenate(&[], Axis::Rows).is_err());
        assert!(Table::concatenate(&[], Axis::Columns).is_err());
    }

    #[test]
    fn test_horizontal_stacks_blocks() {
        let a = table(&["a1", "a2"], &["y1"], vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![vec![0.0], vec![1.0]]);
        let b = table(&["b1"], &["y2"], vec![vec![5.0], vec![6.0]], vec![vec![1.0], vec![0.0]]);
        let out = Table::concatenate(&[&a, &b], Axis::Columns).unwrap();
        assert_eq!(out.domain().to_string(), "[a1, a2, b1 | y1, y2]");
        assert_eq!(out.x().to_rows(), vec![vec![1.0, 2.0, 5.0], vec![3.0, 4.0, 6.0]]);
        assert_eq!(out.y().to_rows(), vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(out.ids(), a.ids());
        assert!(!out.is_writable(Part::X));
    }

    #[test]
    fn test_horizontal_drops_duplicate_variables() {
        let a = table(&["a", "b"], &[], vec![vec![1.0, 2.0]], vec![]);
        let b = table(&["b", "c"], &[], vec![vec![20.0, 3.0]], vec![]);
        let out = Table::concatenate(&[&a, &b], Axis::Columns).unwrap();
        assert_eq!(out.domain().to_string(), "[a, b, c]");
        assert_eq!(out.x().to_rows(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_horizontal_kind_clash() {
        let a = table(&["a"], &[], vec![vec![1.0]], vec![]);
        let domain = Domain::new(vec![Variable::discrete("a", ["x"]).unwrap()], vec![], vec![]).unwrap();
        let b = Table::from_arrays(domain, Matrix::column_vector(vec![0.0]), None).unwrap();
        assert!(matches!(Table::concatenate(&[&a, &b], Axis::Columns), Err(TableError::Schema(_))));
        assert!(matches!(
            Table::concatenate_with(&[&a, &b], Axis::Columns, true),
            Err(TableError::Schema(_))
        ));

        let c = table(&["c"], &[], vec![vec![2.0]], vec![]);
        let merged = Table::concatenate_with(&[&a, &c], Axis::Columns, true).unwrap();
        assert_eq!(merged.domain().to_string(), "[a, c]");
    }

    #[test]
    fn test_horizontal_row_mismatch() {
        let a = table(&["a"], &[], vec![vec![1.0]], vec![]);
        let b = table(&["b"], &[], vec![vec![1.0], vec![2.0]], vec![]);
        assert!(matches!(Table::concatenate(&[&a, &b], Axis::Columns), Err(TableError::Shape(_))));
    }

    #[test]
    fn test_horizontal_weights_name_and_attributes() {
        let mut a = table(&["a"], &[], vec![vec![1.0], vec![2.0]], vec![]);
        let mut b = table(&["b"], &[], vec![vec![1.0], vec![2.0]], vec![]);
        let mut c = table(&["c"], &[], vec![vec![1.0], vec![2.0]], vec![]);
        {
            let mut t = b.unlocked(&[]).unwrap();
            t.set_w(Matrix::column_vector(vec![0.5, 0.25])).unwrap();
        }
        {
            let mut t = c.unlocked(&[]).unwrap();
            t.set_w(Matrix::column_vector(vec![9.0, 9.0])).unwrap();
        }
        a.attributes_mut().insert("source".into(), json!("a"));
        a.attributes_mut().insert("kept".into(), json!(1));
        b.attributes_mut().insert("source".into(), json!("b"));
        b.set_name("second");
        c.set_name("third");

        let out = Table::concatenate(&[&a, &b, &c], Axis::Columns).unwrap();
        assert_eq!(out.weights(), vec![0.5, 0.25]);
        assert!(!out.w().shares_memory(b.w()));
        assert_eq!(out.name(), "second");
        assert_eq!(out.attributes()["source"], json!("b"));
        assert_eq!(out.attributes()["kept"], json!(1));
    }

    #[test]
    fn test_horizontal_metas_mix_numeric_and_text() {
        let numeric = Domain::new(vec![], vec![], vec![Variable::continuous("n")]).unwrap();
        let a = Table::builder(numeric)
            .metas(Matrix::column_vector(vec![1.0, 2.0]))
            .build()
            .unwrap();
        let text = Domain::new(vec![], vec![], vec![Variable::string("s")]).unwrap();
        let b = Table::builder(text)
            .metas(Matrix::column_vector(vec![Value::from("p"), Value::from("q")]))
            .ids(a.ids().to_vec())
            .build()
            .unwrap();
        let out = Table::concatenate(&[&a, &b], Axis::Columns).unwrap();
        assert!(out.metas().is_object());
        assert_eq!(out.metas().row(1), Some(vec![Value::Number(2.0), Value::from("q")]));
    }

    #[test]
    fn test_vertical_stacks_rows() {
        let a = table(&["a"], &["y"], vec![vec![1.0], vec![2.0]], vec![vec![0.0], vec![1.0]]);
        let b = table(&["a"], &["y"], vec![vec![3.0]], vec![vec![1.0]]);
        let out = Table::concatenate(&[&a, &b], Axis::Rows).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.x().column(0), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(out.class_column().unwrap(), vec![0.0, 1.0, 1.0]);
        let mut ids = a.ids().to_vec();
        ids.extend_from_slice(b.ids());
        assert_eq!(out.ids(), &ids[..]);
        assert!(!out.has_weights());
    }

    #[test]
    fn test_vertical_domain_checks() {
        let a = table(&["a"], &[], vec![vec![1.0]], vec![]);
        let b = table(&["b"], &[], vec![vec![2.0]], vec![]);
        assert!(matches!(Table::concatenate(&[&a, &b], Axis::Rows), Err(TableError::Schema(_))));

        let out = Table::concatenate_with(&[&a, &b], Axis::Rows, true).unwrap();
        assert_eq!(out.domain().as_ref(), a.domain().as_ref());
        assert_eq!(out.x().column(0), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_vertical_weights() {
        let mut a = table(&["a"], &[], vec![vec![1.0]], vec![]);
        let mut b = table(&["a"], &[], vec![vec![2.0]], vec![]);
        {
            let mut t = a.unlocked(&[Part::W]).unwrap();
            t.set_w(Matrix::column_vector(vec![2.0])).unwrap();
        }
        assert!(matches!(Table::concatenate(&[&a, &b], Axis::Rows), Err(TableError::Shape(_))));
        {
            let mut t = b.unlocked(&[Part::W]).unwrap();
            t.set_w(Matrix::column_vector(vec![3.0])).unwrap();
        }
        let out = Table::concatenate(&[&a, &b], Axis::Rows).unwrap();
        assert_eq!(out.weights(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_vertical_keeps_sparse() {
        let domain = Domain::new(vec![Variable::continuous("a"), Variable::continuous("b")], vec![], vec![]).unwrap();
        let x = Matrix::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        let a = Table::from_arrays(domain.clone(), x.to_sparse(), None).unwrap();
        let b = Table::from_arrays(domain, x, None).unwrap();
        let out = Table::concatenate(&[&a, &b], Axis::Rows).unwrap();
        assert!(out.x().is_sparse());
        assert_eq!(out.x().to_rows(), vec![vec![0.0, 1.0], vec![0.0, 1.0]]);
    }
}
