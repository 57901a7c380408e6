//! Criterion benchmarks for rust_db_support

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_db_support::core::placeholder;
use rust_db_support::prelude::*;

// ============================================================================
// Parameter Binding Benchmarks
// ============================================================================

fn statement(columns: usize) -> (String, Vec<Parameter>) {
    let names: Vec<String> = (0..columns).map(|i| format!("col{}", i)).collect();
    let sql = format!(
        "INSERT INTO t ({}) VALUES ({})",
        names.join(", "),
        names.iter().map(|n| format!("@{}", n)).collect::<Vec<_>>().join(", ")
    );
    let params = names
        .iter()
        .enumerate()
        .map(|(i, n)| Parameter::new(n, i as i64))
        .collect();
    (sql, params)
}

fn bench_bind(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder_bind");

    for columns in [1usize, 10, 50] {
        let (sql, params) = statement(columns);
        group.throughput(Throughput::Elements(columns as u64));
        for dialect in [Dialect::SqlServer, Dialect::Oracle, Dialect::Sqlite, Dialect::Postgres] {
            group.bench_with_input(
                BenchmarkId::new(dialect.to_str(), columns),
                &(&sql, &params),
                |b, (sql, params)| {
                    b.iter(|| placeholder::bind(black_box(sql), black_box(params), dialect));
                },
            );
        }
    }

    group.bench_function("quoted_literals", |b| {
        let sql = "SELECT * FROM t WHERE a = '@not_a_param' AND b = @b -- @c\nAND d = @d";
        let params = vec![Parameter::new("b", 1), Parameter::new("d", "x")];
        b.iter(|| placeholder::bind(black_box(sql), black_box(&params), Dialect::Postgres));
    });

    group.finish();
}

// ============================================================================
// Clause Builder Benchmarks
// ============================================================================

fn bench_clause_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("clause_builder");

    group.bench_function("search_screen", |b| {
        let range = DateRange::days(NaiveDate::from_ymd_opt(2024, 1, 1), NaiveDate::from_ymd_opt(2024, 12, 31));
        b.iter(|| {
            ClauseBuilder::new()
                .eq(Conjunction::Where, "o.status", "status", black_box("OPEN"))
                .like(Conjunction::And, "o.customer", "customer", black_box("ACME*"))
                .in_values(Conjunction::And, "o.region", "region", black_box("N, S, E, W"))
                .date_range(Conjunction::And, "o.placed", "from", "to", range, false)
                .group(Conjunction::And, |g| {
                    g.eq(Conjunction::Or, "o.priority", "p1", "HIGH")
                        .eq(Conjunction::Or, "o.priority", "p2", "URGENT")
                })
                .into_clause(Dialect::Oracle)
        });
    });

    group.bench_function("all_absent", |b| {
        b.iter(|| {
            ClauseBuilder::new()
                .eq(Conjunction::Where, "a", "a", black_box(""))
                .like(Conjunction::And, "b", "b", black_box(""))
                .in_values(Conjunction::And, "c", "c", black_box(""))
                .date_range(Conjunction::And, "d", "d1", "d2", DateRange::default(), true)
                .into_clause(Dialect::Oracle)
        });
    });

    for count in [10usize, 100, 1000] {
        let values: Vec<i64> = (0..count as i64).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("in_array", count), &values, |b, values| {
            b.iter(|| {
                ClauseBuilder::new()
                    .in_array(Conjunction::Where, "id", "id", black_box(values))
                    .into_clause(Dialect::SqlServer)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Value Coercion Benchmarks
// ============================================================================

fn bench_value_coercion(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_coercion");
    group.throughput(Throughput::Elements(1));

    group.bench_function("coerce_blank_string", |b| {
        b.iter(|| DatabaseValue::from(black_box("   ")).coerce_null());
    });

    group.bench_function("coerce_min_long", |b| {
        b.iter(|| DatabaseValue::from(black_box(i64::MIN)).coerce_null());
    });

    group.bench_function("as_datetime_from_string", |b| {
        let value = DatabaseValue::from("2024-03-09 14:30:00");
        b.iter(|| black_box(&value).as_datetime());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_bind,
    bench_clause_builder,
    bench_value_coercion
);
criterion_main!(benches);
