use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use ga_report::prelude::*;
use ga_report::transport::ColumnHeader;

fn sample_api() -> ReportingApi {
    let mut columns = vec![
        Column::new("ga:date", ColumnKind::Dimension, DataType::String).with_name("Date"),
        Column::new("ga:medium", ColumnKind::Dimension, DataType::String).with_name("Medium"),
        Column::new("ga:source", ColumnKind::Dimension, DataType::String).with_name("Source"),
        Column::new("ga:pageviews", ColumnKind::Metric, DataType::Integer).with_name("Pageviews"),
        Column::new("ga:sessions", ColumnKind::Metric, DataType::Integer).with_name("Sessions"),
    ];
    for i in 1..=200 {
        columns.push(
            Column::new(format!("ga:goal{i}Completions"), ColumnKind::Metric, DataType::Integer)
                .with_name(format!("Goal {i} Completions")),
        );
    }
    ReportingApi::new(
        "67890",
        ColumnRegistry::new(columns).unwrap(),
        ColumnRegistry::default(),
        SegmentRegistry::default(),
        Arc::new(ReplayTransport::default()),
        ClientConfig::default(),
    )
}

fn sample_page(rows: usize) -> RawPage {
    RawPage {
        column_headers: ["ga:date", "ga:medium", "ga:pageviews"]
            .into_iter()
            .map(ColumnHeader::new)
            .collect(),
        rows: Some(
            (0..rows)
                .map(|i| {
                    vec![
                        format!("201407{:02}", i % 28 + 1),
                        if i % 2 == 0 { "organic" } else { "cpc" }.into(),
                        (i * 7).to_string(),
                    ]
                })
                .collect(),
        ),
        ..RawPage::default()
    }
}

fn bench_build(c: &mut Criterion) {
    let api = sample_api();
    c.bench_function("build_filtered_query", |b| {
        b.iter(|| {
            let q = api
                .query()
                .metrics(black_box(["pageviews", "sessions", "goal150Completions"]))
                .unwrap()
                .dimensions(["medium", "source"])
                .unwrap()
                .daily(RangeSpec::new("2014-07-01").months(1))
                .unwrap()
                .filter(Selection::new().with("medium", "cpc").with("pageviews__gt", 10))
                .unwrap()
                .sort(["-pageviews"])
                .unwrap();
            black_box(q.signature());
        })
    });
}

fn bench_materialize(c: &mut Criterion) {
    let api = sample_api();
    let page = sample_page(1000);
    c.bench_function("append_page_1000_rows", |b| {
        b.iter_batched(
            Report::new,
            |mut report| {
                report.append(&page, api.columns(), BTreeMap::new()).unwrap();
                black_box(report.len());
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(query_build, bench_build, bench_materialize);
criterion_main!(query_build);
