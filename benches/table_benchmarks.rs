use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabular::filter::{FilterContinuous, FilterString, IsDefined};
use tabular::*;

fn make_table(rows: usize) -> Table {
    let domain = Domain::new(
        vec![Variable::continuous("a"), Variable::continuous("b"), Variable::discrete("d", ["x", "y", "z"]).unwrap()],
        vec![Variable::continuous("target")],
        vec![Variable::string("name")],
    )
    .unwrap();
    let mut x = Vec::with_capacity(rows * 3);
    for i in 0..rows {
        let missing = if i % 17 == 0 { f64::NAN } else { i as f64 };
        x.extend_from_slice(&[missing, (i % 100) as f64, (i % 3) as f64]);
    }
    let names: Vec<Value> = (0..rows).map(|i| Value::from(format!("row{}", i))).collect();
    Table::builder(domain)
        .x(Matrix::dense(rows, 3, x).unwrap())
        .y(Matrix::column_vector((0..rows).map(|i| (i % 2) as f64).collect()))
        .metas(Matrix::column_vector(names))
        .build()
        .unwrap()
}

fn bench_get_column(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_column");

    for size in [1_000, 10_000, 100_000].iter() {
        let table = make_table(*size);
        let remapped = Variable::discrete("d", ["z", "y", "x"]).unwrap();
        group.bench_with_input(BenchmarkId::new("view", size), size, |b, _| {
            b.iter(|| table.get_column(black_box("b"), false).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("remap", size), size, |b, _| {
            b.iter(|| table.get_column(black_box(&remapped), false).unwrap())
        });
    }
    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    for size in [1_000, 10_000, 100_000].iter() {
        let table = make_table(*size);
        group.bench_with_input(BenchmarkId::new("continuous", size), size, |b, _| {
            let filter = FilterContinuous::new("b", FilterOperator::Less, 50.0);
            b.iter(|| filter.apply(black_box(&table)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("is_defined", size), size, |b, _| {
            let filter = IsDefined::new();
            b.iter(|| filter.apply(black_box(&table)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("string_prefix", size), size, |b, _| {
            let filter = FilterString::new("name", FilterOperator::StartsWith, "row1");
            b.iter(|| filter.apply(black_box(&table)).unwrap())
        });
    }
    group.finish();
}

fn bench_concatenate(c: &mut Criterion) {
    let mut group = c.benchmark_group("concatenate");

    for size in [1_000, 10_000].iter() {
        let left = make_table(*size);
        let right = make_table(*size);
        group.bench_with_input(BenchmarkId::new("rows", size), size, |b, _| {
            b.iter(|| Table::concatenate(black_box(&[&left, &right]), Axis::Rows).unwrap())
        });
        let extra = left.add_column(Variable::continuous("extra"), vec![1.0; *size], None).unwrap();
        let extra = extra.select_columns(&["extra"]).unwrap();
        group.bench_with_input(BenchmarkId::new("columns", size), size, |b, _| {
            b.iter(|| Table::concatenate(black_box(&[&left, &extra]), Axis::Columns).unwrap())
        });
    }
    group.finish();
}

fn bench_copy_and_slice(c: &mut Criterion) {
    let table = make_table(100_000);

    c.bench_function("copy_100k", |b| b.iter(|| black_box(&table).copy()));
    c.bench_function("slice_100k", |b| b.iter(|| black_box(&table).slice(1_000..90_000).unwrap()));
}

fn bench_serialization(c: &mut Criterion) {
    let table = make_table(10_000);
    let bytes = table.to_bytes().unwrap();

    c.bench_function("to_bytes_10k", |b| b.iter(|| black_box(&table).to_bytes().unwrap()));
    c.bench_function("from_bytes_10k", |b| b.iter(|| Table::from_bytes(black_box(&bytes)).unwrap()));
}

criterion_group!(
    benches,
    bench_get_column,
    bench_filters,
    bench_concatenate,
    bench_copy_and_slice,
    bench_serialization,
);

criterion_main!(benches);
