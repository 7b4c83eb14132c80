use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hub_core::ResultRow;

fn build_rows(n: usize) -> Vec<ResultRow> {
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let mut r = ResultRow::blank(i as i64 + 1);
        r.name = format!("Afiliado {}", i % 17);
        r.date = NaiveDate::from_ymd_opt(2026, (i % 12) as u32 + 1, (i % 27) as u32 + 1);
        r.wa_group = 100 + (i as i64 % 50);
        r.attendees = 40;
        r.trials = 20;
        r.nps = (i as i64) % 9;
        r.projected_nps = 6;
        r.confirmed = i % 3 == 0;
        r.fixed = 100_000;
        r.variable = 50_000;
        r.pauta = 25_000;
        rows.push(r);
    }
    rows
}

fn bench_rollup(c: &mut Criterion) {
    let rows = build_rows(5_000);
    c.bench_function("quarter rollup 5k rows", |b| {
        b.iter(|| {
            let rollups = hub_metrics::rollup_by_quarter(black_box(&rows));
            black_box(rollups);
        })
    });
    c.bench_function("row metrics 5k rows", |b| {
        b.iter(|| {
            for r in &rows {
                black_box(hub_metrics::RowMetrics::of(black_box(r)));
            }
        })
    });
}

criterion_group!(benches, bench_rollup);
criterion_main!(benches);
