mod util;

use std::sync::Arc;

use ga_report::prelude::*;
use ga_report::query::{describe, refine};
use ga_report::throttle::ManualClock;
use serde_json::json;
use util::RecordingTransport;

fn blueprint() -> Blueprint {
    Blueprint::from_path(&util::fixture("blueprint.yml")).unwrap()
}

fn api() -> ReportingApi {
    util::api(
        Arc::new(ReplayTransport::default()),
        Arc::new(ManualClock::new()),
    )
}

#[test]
fn blueprint_scope_and_titles() {
    let bp = blueprint();
    assert_eq!(bp.profile().as_deref(), Some("67890"));
    assert_eq!(
        bp.identity.as_ref().map(|i| i.fields()["identity"].clone()),
        Some("marketing".to_string())
    );
    assert_eq!(
        bp.titles().collect::<Vec<_>>(),
        [
            "Daily pageviews by medium",
            "Paid sessions by source",
            "Top pages last week"
        ]
    );
}

#[test]
fn every_query_inherits_the_defaults() {
    let queries = blueprint().queries(&api()).unwrap();
    assert_eq!(queries.len(), 3);
    for q in &queries {
        assert_eq!(q.endpoint(), Endpoint::Core);
        assert!(
            q.build()
                .get_str("metrics")
                .is_some_and(|m| m.starts_with("ga:pageviews"))
        );
    }

    let paid = queries[1].build();
    assert_eq!(paid.get_str("metrics").as_deref(), Some("ga:pageviews,ga:sessions"));
    assert_eq!(paid.get_str("dimensions").as_deref(), Some("ga:source"));
    assert_eq!(paid.get_str("filters").as_deref(), Some("ga:medium==cpc"));
    assert_eq!(paid.get_str("end_date").as_deref(), Some("2014-07-15"));
    assert!(paid.cache_key().is_some());

    let top = queries[2].build();
    assert_eq!(top.get_str("start_date").as_deref(), Some("7daysAgo"));
    assert_eq!(top.get_str("sort").as_deref(), Some("-ga:pageviews"));
    assert_eq!(top.get_str("max_results").as_deref(), Some("10"));
    assert!(top.cache_key().is_none());
    assert_eq!(queries[2].title(), "Top pages last week");
}

#[test]
fn described_queries_match_builder_chains() {
    let api = api();
    let bp = blueprint();
    let described = bp.query(&api, "Daily pageviews by medium").unwrap();
    let built = api
        .query()
        .metrics(["pageviews"])
        .unwrap()
        .daily(RangeSpec::new("2014-07-01").days(15))
        .unwrap()
        .dimensions(["medium"])
        .unwrap();
    assert_eq!(described.build(), built.build());
    assert_eq!(
        described.envelope().dimensions,
        ["Date".to_string(), "Medium".to_string()]
    );
}

#[test]
fn unknown_titles_list_the_known_ones() {
    let err = blueprint().query(&api(), "Bounce rate").unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert!(err.to_string().contains("Top pages last week"));
}

#[test]
fn blueprint_queries_run_end_to_end() {
    let clock = Arc::new(ManualClock::new());
    let transport = Arc::new(RecordingTransport::new(util::daily_pages(), clock.clone()));
    let api = util::api(transport.clone(), clock);

    let report = blueprint()
        .query(&api, "Daily pageviews by medium")
        .unwrap()
        .get()
        .unwrap();
    assert_eq!(report.len(), 15);
    assert_eq!(transport.calls().len(), 3);
    assert_eq!(transport.calls()[0].params["dimensions"], "ga:date,ga:medium");
}

#[test]
fn describe_picks_the_endpoint_from_type() {
    let api = api();
    let rt = describe(&api, &json!({"type": "realtime", "metrics": "activeUsers"})).unwrap();
    assert_eq!(rt.endpoint(), Endpoint::Realtime);
    assert_eq!(rt.build().get_str("metrics").as_deref(), Some("rt:activeUsers"));

    let err = refine(&rt, &json!({"daily": {"start": "2014-07-01"}})).unwrap_err();
    assert_eq!(err.kind(), "invalid_request");

    let err = describe(&api, &json!({"metrics": "pageviews", "frobnicate": 1})).unwrap_err();
    assert!(err.to_string().contains("frobnicate"));
}

#[test]
fn malformed_blueprints_are_config_errors() {
    let err = Blueprint::parse("queries: [unclosed").unwrap_err();
    assert_eq!(err.kind(), "config");
    assert!(Blueprint::from_path(&util::fixture("missing.yml")).is_err());
}
