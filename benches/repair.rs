//! Auto-Repair Benchmarks
//!
//! Measures closest-identifier search and the full rewrite for a misspelled
//! column, across a schema with a thousand candidate columns.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use askdb::repair::best_match;
use askdb::{AutoRepairEngine, Column, Schema};

fn wide_schema() -> Schema {
    let mut schema = Schema::new();
    for t in 0..40 {
        let columns = (0..25).map(|c| Column::named(format!("metric_{t}_{c}"))).collect();
        schema = schema.with_table(format!("table_{t}"), columns);
    }
    schema.with_table(
        "orders",
        vec![Column::named("id"), Column::named("customerId"), Column::named("total")],
    )
}

fn bench_best_match(c: &mut Criterion) {
    let schema = wide_schema();
    let columns = schema.all_columns();

    c.bench_function("best_match_all_columns", |b| {
        b.iter(|| best_match(black_box("metrik_39_24"), columns.iter().copied()));
    });
}

fn bench_repair(c: &mut Criterion) {
    let schema = wide_schema();
    let repairer = AutoRepairEngine::new('"');
    let sql = "SELECT customer_id, \"total\" FROM \"orders\" WHERE \"total\" > 10";
    let message = "column \"customer_id\" does not exist";

    c.bench_function("repair_snake_to_camel", |b| {
        b.iter(|| repairer.repair(black_box(sql), black_box(&schema), black_box(message)));
    });

    let unknown = "column \"shipping_address\" does not exist";
    c.bench_function("repair_no_candidate", |b| {
        b.iter(|| repairer.repair(black_box(sql), black_box(&schema), black_box(unknown)));
    });
}

criterion_group!(benches, bench_best_match, bench_repair);
criterion_main!(benches);
