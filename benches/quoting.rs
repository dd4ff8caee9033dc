//! Identifier Quoting and Safety Screen Benchmarks
//!
//! Both run on every request before the first database round trip, so they are
//! measured over a schema of realistic width.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use askdb::{Column, DatabaseType, IdentifierQuoter, SafetyScreen, Schema};

fn wide_schema() -> Schema {
    let mut schema = Schema::new();
    for t in 0..40 {
        let columns = (0..25).map(|c| Column::named(format!("col_{t}_{c}"))).collect();
        schema = schema.with_table(format!("table_{t}"), columns);
    }
    schema.with_table(
        "orders",
        vec![Column::named("id"), Column::named("customer_id"), Column::named("total")],
    )
}

const QUERY: &str = "select o.id, o.total, col_3_7 from orders o \
                     join table_3 t on t.col_3_0 = o.customer_id \
                     where o.total > 100 and t.col_3_4 like '%orders%' \
                     order by o.total desc";

fn bench_quote(c: &mut Criterion) {
    let schema = wide_schema();
    let quoter = IdentifierQuoter::new('"');

    c.bench_function("quote_join_query", |b| {
        b.iter(|| quoter.quote(black_box(QUERY), black_box(&schema)));
    });

    let quoted = quoter.quote(QUERY, &schema);
    c.bench_function("quote_already_quoted", |b| {
        b.iter(|| quoter.quote(black_box(&quoted), black_box(&schema)));
    });
}

fn bench_screen(c: &mut Criterion) {
    let schema = wide_schema();
    let quoted = IdentifierQuoter::new('"').quote(QUERY, &schema);
    let screen = SafetyScreen::new(DatabaseType::Postgres);

    c.bench_function("screen_join_query", |b| {
        b.iter(|| screen.screen(black_box(&quoted), black_box(&schema)));
    });
}

criterion_group!(benches, bench_quote, bench_screen);
criterion_main!(benches);
