//! Benchmarks for opdeck core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opdeck::audit::hasher::hash_text;
use opdeck::core::parser::{parse_definition, parse_operation, DISPATCH_BEGIN, DISPATCH_END};
use opdeck::core::registry::display_label;
use opdeck::resources::ingest::ingest_text;

fn bench_display_label(c: &mut Criterion) {
    let names = [
        "list_sql_tables",
        "count_mongo_db_documents",
        "insert_mongo_db_record",
        "quarterly_revenue_by_region_v2",
    ];
    c.bench_function("display_label", |b| {
        b.iter(|| {
            for name in &names {
                black_box(display_label(black_box(name)));
            }
        });
    });
}

fn bench_parse_operation(c: &mut Criterion) {
    let source = "fn order_totals(cursor, record_id, limit: int, ratio: float) {\n    \
                  SELECT id, total * :ratio AS scaled\n    \
                  FROM orders WHERE customer = :record_id LIMIT :limit;\n}\n";
    c.bench_function("parse_operation", |b| {
        b.iter(|| {
            black_box(parse_operation(black_box(source)).unwrap());
        });
    });
}

fn bench_parse_definition(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_definition");
    for n in [10, 50, 100] {
        let mut ops = String::new();
        let mut bindings = String::new();
        for i in 0..n {
            ops.push_str(&format!(
                "fn report_{i:04}(cursor, x: int) {{\n    SELECT :x AS value;\n}}\n\n"
            ));
            bindings.push_str(&format!("binding report_{i:04} {{\n    x: stepper\n}}\n"));
        }
        let text = format!("{ops}{DISPATCH_BEGIN}\n{bindings}{DISPATCH_END}\n");
        group.bench_with_input(BenchmarkId::from_parameter(n), &text, |b, text| {
            b.iter(|| {
                black_box(parse_definition(black_box(text)).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_ingest_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_text");
    for n in [100, 1000, 10000] {
        let text: String = (0..n)
            .map(|i| if i % 7 == 0 { "\n".to_string() } else { format!("  item-{i}  \n") })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &text, |b, text| {
            b.iter(|| {
                black_box(ingest_text(black_box(text)));
            });
        });
    }
    group.finish();
}

fn bench_blake3_definition(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_definition");
    for size in [1024, 16384, 262144] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                black_box(hash_text(black_box(input)));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_display_label,
    bench_parse_operation,
    bench_parse_definition,
    bench_ingest_text,
    bench_blake3_definition
);
criterion_main!(benches);
