//! Queries against the core reporting endpoint.

use std::sync::Arc;

use crate::columns::{Segment, SegmentRef};
use crate::error::{QueryError, QueryResult};
use crate::expr::segments::{self, MetricScope, SegmentScope};
use crate::expr::{AND, Selection};

use super::options::{Granularity, Precision};
use super::range::RangeSpec;
use super::{QueryCore, Queryable};

/// What to segment a core query on.
#[derive(Clone, Debug)]
pub enum SegmentSpec {
    /// A stored segment by reference, name or id.
    Stored(SegmentRef),
    /// A caller-written fragment, sent as `{scope}::{value}`.
    Literal { scope: SegmentScope, value: String },
    /// A selection, sent as `{scope}::condition::[{metric_scope}::]{expr}`.
    Selection {
        scope: SegmentScope,
        metric_scope: Option<MetricScope>,
        selection: Selection,
    },
}

impl From<SegmentRef> for SegmentSpec {
    fn from(value: SegmentRef) -> Self {
        Self::Stored(value)
    }
}

impl From<&str> for SegmentSpec {
    fn from(value: &str) -> Self {
        Self::Stored(value.into())
    }
}

impl From<String> for SegmentSpec {
    fn from(value: String) -> Self {
        Self::Stored(value.into())
    }
}

impl From<Arc<Segment>> for SegmentSpec {
    fn from(value: Arc<Segment>) -> Self {
        Self::Stored(value.into())
    }
}

/// A query for the core reporting API: date ranges, granularity, sampling,
/// segments and paged results on top of the shared builder.
#[derive(Clone, Debug)]
pub struct CoreQuery {
    core: QueryCore,
}

impl Queryable for CoreQuery {
    fn core(&self) -> &QueryCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QueryCore {
        &mut self.core
    }
}

impl CoreQuery {
    pub fn new(core: QueryCore) -> Self {
        Self { core }
    }

    /// Restrict to a date window; see [`RangeSpec`].
    pub fn range(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        let (start, stop) = spec.into().resolve()?;
        self.refine_with(|core| {
            let params = core.params_mut();
            params.start_date = Some(start);
            params.end_date = Some(stop);
            Ok(())
        })
    }

    /// Bucket rows by time: the granularity's date dimension goes first.
    pub fn interval(&self, granularity: Granularity) -> QueryResult<Self> {
        self.refine_with(|core| match granularity.dimension() {
            Some(dimension) => core.lead_dimension(dimension),
            None => Ok(()),
        })
    }

    /// [`interval`](Self::interval) by name (`day`, `year_month`, ...).
    pub fn interval_named(&self, name: &str) -> QueryResult<Self> {
        self.interval(Granularity::try_from(name)?)
    }

    pub fn hourly(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Hour)?.range(spec)
    }

    pub fn daily(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Day)?.range(spec)
    }

    pub fn weekly(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Week)?.range(spec)
    }

    pub fn monthly(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Month)?.range(spec)
    }

    pub fn yearly(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Year)?.range(spec)
    }

    /// A window without time buckets.
    pub fn total(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.interval(Granularity::Total)?.range(spec)
    }

    /// Alias of [`range`](Self::range) for whole-history windows.
    pub fn lifetime(&self, spec: impl Into<RangeSpec>) -> QueryResult<Self> {
        self.range(spec)
    }

    pub fn precision(&self, precision: Precision) -> Self {
        let mut next = self.clone();
        next.core.params_mut().sampling_level = precision.sampling_level().map(str::to_string);
        next
    }

    /// Add a segment; several segments are ANDed.
    pub fn segment(&self, spec: impl Into<SegmentSpec>) -> QueryResult<Self> {
        let spec = spec.into();
        self.refine_with(|core| {
            let clause = match spec {
                SegmentSpec::Stored(value) => core.segments().serialize(value)?,
                SegmentSpec::Literal { scope, value } => segments::scoped_literal(scope, &value)?,
                SegmentSpec::Selection {
                    scope,
                    metric_scope,
                    selection,
                } => {
                    let expr = selection.serialize(core.registry(), AND, false)?;
                    segments::scoped_condition(scope, metric_scope, &expr)
                }
            };
            core.params_mut().and_segment(clause);
            Ok(())
        })
    }

    /// First `n` rows; pages are `n` rows long. Zero lifts the limit.
    pub fn limit(&self, n: u32) -> QueryResult<Self> {
        self.limit_from(1, n)
    }

    /// `n` rows starting at the 1-indexed row `start`; `n == 0` reads every
    /// row from `start` on.
    pub fn limit_from(&self, start: u32, n: u32) -> QueryResult<Self> {
        if start == 0 {
            return Err(QueryError::InvalidRequest(
                "start index is 1-indexed and must be at least 1".into(),
            ));
        }
        let n = (n > 0).then_some(n);
        self.refine_with(|core| {
            core.set_limit(n.map(|n| n as usize));
            let params = core.params_mut();
            params.start_index = Some(start);
            params.max_results = n;
            Ok(())
        })
    }

    /// Rows per request, without capping the total.
    pub fn step(&self, n: u32) -> QueryResult<Self> {
        if n == 0 {
            return Err(QueryError::InvalidRequest("step must be at least 1".into()));
        }
        self.refine_with(|core| {
            core.params_mut().max_results = Some(n);
            Ok(())
        })
    }

    /// The query for the following page.
    pub fn next(&self) -> Self {
        let mut next = self.clone();
        let page_size = next.core.page_size();
        next.core.params_mut().advance(page_size);
        next
    }
}
