/// Basic Table Operations Example
///
/// This example demonstrates:
/// - Declaring a domain of typed variables
/// - Building a table from rows of values
/// - Adding columns and reading them back
/// - Concatenating tables and round-tripping through JSON

use tabular::{Axis, Domain, Table, Value, Variable};

fn main() -> tabular::Result<()> {
    env_logger::init();

    println!("=== Tabular Basic Table Example ===\n");

    // 1. Declare the domain
    println!("1. Creating domain...");
    let domain = Domain::new(
        vec![Variable::continuous("sepal_length"), Variable::continuous("petal_width")],
        vec![Variable::discrete("iris", ["setosa", "versicolor", "virginica"])?],
        vec![Variable::string("note")],
    )?;
    println!("   Domain: {}\n", domain);

    // 2. Build a table from rows
    println!("2. Building table from rows...");
    let rows: Vec<Vec<Value>> = vec![
        vec![5.1.into(), 0.2.into(), "setosa".into(), "first".into()],
        vec![7.0.into(), 1.4.into(), "versicolor".into(), "".into()],
        vec!["?".into(), 2.5.into(), "virginica".into(), "odd one".into()],
        vec![4.9.into(), 0.2.into(), "setosa".into(), "last".into()],
    ];
    let iris = Table::from_list(domain, &rows, None)?;
    println!("   {} rows, ids {:?}", iris.len(), iris.ids());
    println!("{}\n", iris);

    // 3. Read columns
    println!("3. Reading columns...");
    let widths = iris.get_column("petal_width", false)?;
    println!("   petal_width: {:?}", widths.to_f64());
    let classes = iris.get_column("iris", false)?;
    println!("   iris codes:  {:?}", classes.to_f64());
    let reordered = Variable::discrete("iris", ["virginica", "versicolor", "setosa"])?;
    println!("   remapped:    {:?}\n", iris.get_column(&reordered, false)?.to_f64());

    // 4. Add a column
    println!("4. Adding a column...");
    let with_ratio = iris.add_column(Variable::continuous("ratio"), vec![25.5, 5.0, f64::NAN, 24.5], None)?;
    println!("   Domain now: {}", with_ratio.domain());
    println!("   Metas row 0: {:?}\n", with_ratio.metas().row(0));

    // 5. Concatenate
    println!("5. Concatenating...");
    let stacked = Table::concatenate(&[&iris, &iris.slice(0..2)?], Axis::Rows)?;
    println!("   Vertical: {} rows", stacked.len());
    let extra = with_ratio.select_columns(&["ratio"])?;
    let wide = Table::concatenate(&[&iris, &extra], Axis::Columns)?;
    println!("   Horizontal: {}\n", wide.domain());

    // 6. Serialize
    println!("6. Serializing...");
    let bytes = iris.to_bytes()?;
    let restored = Table::from_bytes(&bytes)?;
    println!("   {} bytes, restored {} rows", bytes.len(), restored.len());
    println!("   Restored row 2: {:?}", restored.row(2)?);

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
