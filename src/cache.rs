//! Report cache seam.
//!
//! Only queries with a [`cache_key`](crate::query::Queryable::cache_key),
//! that is, both date bounds absolute, are ever offered to a cache. The crate
//! ships no storage of its own; callers plug one in through [`ReportCache`].

use tracing::debug;

use crate::error::QueryResult;
use crate::query::Queryable;
use crate::report::Report;

/// Storage for materialized reports, keyed by query signature.
pub trait ReportCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Report>;

    fn put(&self, key: &str, report: &Report);
}

/// A cache that never hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ReportCache for NoCache {
    fn get(&self, _key: &str) -> Option<Report> {
        None
    }

    fn put(&self, _key: &str, _report: &Report) {}
}

/// Execute `query`, reading from and writing to `cache` when the query is
/// cacheable. Incomplete reports are not stored.
pub fn get_cached<Q: Queryable>(query: &Q, cache: &dyn ReportCache) -> QueryResult<Report> {
    let Some(key) = query.cache_key() else {
        return query.get();
    };
    if let Some(report) = cache.get(&key) {
        debug!(key = %key, rows = report.len(), "report cache hit");
        return Ok(report);
    }
    let report = query.get()?;
    if report.is_complete() {
        cache.put(&key, &report);
    }
    Ok(report)
}
