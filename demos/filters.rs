/// Row Filter Example
///
/// Filters built directly, composed, negated and parsed from text.

use tabular::filter::{FilterContinuous, FilterDiscrete, FilterRegex, FilterString, HasClass, IsDefined, Values};
use tabular::{parse_filter, Domain, Filter, FilterOperator, RowFilter, Table, Value, Variable};

fn main() -> tabular::Result<()> {
    env_logger::init();

    println!("=== Tabular Filters Example ===\n");

    let domain = Domain::new(
        vec![Variable::continuous("age"), Variable::discrete("smoker", ["no", "yes"])?],
        vec![Variable::discrete("outcome", ["healthy", "ill"])?],
        vec![Variable::string("name")],
    )?;
    let rows: Vec<Vec<Value>> = vec![
        vec![34.0.into(), "no".into(), "healthy".into(), "ann".into()],
        vec![61.0.into(), "yes".into(), "ill".into(), "bob".into()],
        vec!["?".into(), "yes".into(), "healthy".into(), "cyd".into()],
        vec![47.0.into(), "?".into(), "?".into(), "dee".into()],
        vec![29.0.into(), "no".into(), "ill".into(), "abe".into()],
    ];
    let patients = Table::from_list(domain.clone(), &rows, None)?;
    println!("Source table:\n{}\n", patients);

    let show = |label: &str, table: &Table| {
        let names: Vec<String> = table
            .get_column("name", false)
            .map(|c| c.to_values().iter().map(|v| v.to_string()).collect())
            .unwrap_or_default();
        println!("   {:<28} -> {:?}", label, names);
    };

    // 1. Simple filters
    println!("1. Simple filters...");
    show("complete rows", &IsDefined::new().apply(&patients)?);
    show("with class", &HasClass::default().apply(&patients)?);
    show("age >= 40", &FilterContinuous::new("age", FilterOperator::GreaterEqual, 40.0).apply(&patients)?);
    show("name starts with 'a'", &FilterString::new("name", FilterOperator::StartsWith, "a").apply(&patients)?);
    show("name matches /e$/", &FilterRegex::new(Some("name".into()), "e$").apply(&patients)?);
    println!();

    // 2. Composition and negation
    println!("2. Composed filters...");
    let young_or_ill = Values::any(vec![
        FilterContinuous::new("age", FilterOperator::Less, 35.0).into(),
        FilterDiscrete::new("outcome", ["ill"]).into(),
    ]);
    let filter: Filter = young_or_ill.into();
    println!("   {}", filter);
    show("young or ill", &filter.apply(&patients)?);
    let negated = filter.negate();
    println!("   {}", negated);
    show("neither", &negated.apply(&patients)?);
    println!();

    // 3. Parsed expressions
    println!("3. Parsed expressions...");
    for text in [
        "age > 30 AND smoker == 'yes'",
        "outcome != 'ill'",
        "(age >= 30 AND age <= 50) OR name == 'abe'",
        "age IS NULL",
    ] {
        let filter = parse_filter(text, &domain)?;
        show(text, &filter.apply(&patients)?);
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
