/// Locking Example
///
/// Tables are read-only by default. Writes happen inside an unlocked scope,
/// which restores the previous state when it ends.

use tabular::{Domain, Matrix, Part, Table, TableConfig, Variable};

fn main() -> tabular::Result<()> {
    env_logger::init();

    println!("=== Tabular Locking Example ===\n");

    let domain = Domain::new(vec![Variable::continuous("a"), Variable::continuous("b")], vec![], vec![])?;
    let x = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])?;
    let mut table = Table::builder(domain)
        .x(x)
        .config(TableConfig::default().with_locking(true))
        .build()?;

    // 1. Locked writes fail
    println!("1. Writing to a locked table...");
    match table.x().set(0, 0, 10.0) {
        Ok(()) => println!("   unexpected success"),
        Err(e) => println!("   refused: {}", e),
    }

    // 2. Unlocked scope
    println!("\n2. Writing inside an unlocked scope...");
    {
        let t = table.unlocked(&[Part::X])?;
        t.x().set(0, 0, 10.0)?;
        println!("   X writable inside scope: {}", t.is_writable(Part::X));
    }
    println!("   X writable after scope:  {}", table.is_writable(Part::X));
    println!("   X[0,0] = {:?}", table.x().get(0, 0));

    // 3. Views
    println!("\n3. Views share memory with their base...");
    let mut view = table.slice(1..3)?;
    println!("   shares memory: {}", view.x().shares_memory(table.x()));
    match view.unlocked(&[Part::X]) {
        Ok(_) => println!("   unexpected success"),
        Err(e) => println!("   unlocking view refused: {}", e),
    }
    {
        let v = view.force_unlocked(&[Part::X])?;
        v.x().set(0, 0, -3.0)?;
    }
    println!("   base X[1,0] after forced write through view = {:?}", table.x().get(1, 0));

    // 4. Copies own their data
    println!("\n4. Copies are independent...");
    let mut copy = view.copy();
    {
        let c = copy.unlocked(&[])?;
        c.x().fill(0.0)?;
    }
    println!("   copy X:  {:?}", copy.x().to_rows());
    println!("   table X: {:?}", table.x().to_rows());

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
