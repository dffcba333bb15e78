//! Immutable query builder.
//!
//! Every builder call clones the query, applies one change and returns the
//! clone; the receiver is never touched, so any query can serve as the base
//! of several refinements. `CoreQuery` and `RealtimeQuery` share a
//! [`QueryCore`] and the provided methods of [`Queryable`]; operations that
//! only make sense for one endpoint live on that type.
//!
//! - [`range`] - date windows
//! - [`options`] - granularity, precision and sort keys
//! - [`params`] - the raw parameter map
//! - [`wire`] - wire requests, signatures and cache keys
//! - [`describe`] - declarative query descriptions

pub mod core_query;
pub mod describe;
pub mod options;
pub mod params;
pub mod range;
pub mod realtime;
pub mod wire;

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use once_cell::sync::OnceCell;

use crate::columns::{Addressable, ColumnKind, ColumnRef, ColumnRegistry, SegmentRegistry};
use crate::error::{QueryError, QueryResult};
use crate::expr::{self, AND, OR, Selection};
use crate::paginate::Paginator;
use crate::report::{Envelope, Report};
use crate::throttle::Throttle;
use crate::transport::{Endpoint, Transport};

pub use core_query::CoreQuery;
pub use describe::{AnyQuery, QueryCommand, describe, refine};
pub use options::{Granularity, Precision, SortKey};
pub use params::Params;
pub use range::{DateBound, DateInput, RangeSpec};
pub use realtime::RealtimeQuery;
pub use wire::WireRequest;

/// Everything a query needs from the scope that created it.
pub struct QueryContext {
    pub profile_id: String,
    pub registry: Arc<ColumnRegistry>,
    pub segments: Arc<SegmentRegistry>,
    pub transport: Arc<dyn Transport>,
    /// Page size used to advance the cursor when `max_results` is unset.
    pub page_size: u32,
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("profile_id", &self.profile_id)
            .field("columns", &self.registry.len())
            .field("segments", &self.segments.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Materialized report of one query instance. Clones start empty.
#[derive(Debug, Default)]
struct ReportSlot(OnceCell<Report>);

impl Clone for ReportSlot {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// A value for [`Queryable::set`]: verbatim text or an addressable
/// reference serialized to its id.
#[derive(Clone, Debug)]
pub enum SetValue {
    Text(String),
    Addressable(Addressable),
}

impl From<&str> for SetValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SetValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u32> for SetValue {
    fn from(n: u32) -> Self {
        Self::Text(n.to_string())
    }
}

impl From<Addressable> for SetValue {
    fn from(a: Addressable) -> Self {
        Self::Addressable(a)
    }
}

impl From<Arc<crate::columns::Column>> for SetValue {
    fn from(c: Arc<crate::columns::Column>) -> Self {
        Self::Addressable(Addressable::Column(c))
    }
}

/// State shared by both query variants.
#[derive(Clone, Debug)]
pub struct QueryCore {
    context: Arc<QueryContext>,
    throttle: Arc<Throttle>,
    endpoint: Endpoint,
    params: Params,
    title: Option<String>,
    limit: Option<usize>,
    report: ReportSlot,
}

impl QueryCore {
    pub fn new(context: Arc<QueryContext>, throttle: Arc<Throttle>, endpoint: Endpoint) -> Self {
        let params = Params::new(format!("ga:{}", context.profile_id));
        Self {
            context,
            throttle,
            endpoint,
            params,
            title: None,
            limit: None,
            report: ReportSlot::default(),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Client-side row limit; `None` means every row.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.context.registry
    }

    pub fn segments(&self) -> &SegmentRegistry {
        &self.context.segments
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.context.transport.as_ref()
    }

    pub(crate) fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// The lineage throttle, shared with every query cloned from this one.
    pub fn throttle_handle(&self) -> Arc<Throttle> {
        Arc::clone(&self.throttle)
    }

    pub(crate) fn page_size(&self) -> u32 {
        self.context.page_size
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    fn add_columns<I, C>(&mut self, values: I, kind: ColumnKind) -> QueryResult<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        let columns = self.context.registry.resolve_many(values, Some(kind))?;
        let target = match kind {
            ColumnKind::Metric => &mut self.params.metrics,
            ColumnKind::Dimension => &mut self.params.dimensions,
        };
        target.extend(columns.into_iter().map(|column| column.id.clone()));
        Ok(())
    }

    pub(crate) fn add_metrics<I, C>(&mut self, values: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        self.add_columns(values, ColumnKind::Metric)
    }

    pub(crate) fn add_dimensions<I, C>(&mut self, values: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        self.add_columns(values, ColumnKind::Dimension)
    }

    /// Put a dimension in front of the others.
    pub(crate) fn lead_dimension(&mut self, id: &str) -> QueryResult<()> {
        let id = self.context.registry.serialize(id, false)?;
        self.params.dimensions.insert(0, id);
        Ok(())
    }

    pub(crate) fn add_sort(&mut self, keys: Vec<SortKey>, force_descending: bool) -> QueryResult<()> {
        for key in keys {
            let id = self.context.registry.serialize(key.column.clone(), true)?;
            let key = if force_descending { SortKey { descending: true, ..key } } else { key };
            self.params.sort.push(key.render(&id));
        }
        Ok(())
    }

    pub(crate) fn add_selection(&mut self, selection: &Selection, join: char, exclude: bool) -> QueryResult<()> {
        let clause = selection.serialize(&self.context.registry, join, exclude)?;
        self.params.and_filter(clause);
        Ok(())
    }

    pub(crate) fn add_raw_filter(&mut self, raw: &str) -> QueryResult<()> {
        if raw.trim().is_empty() {
            return Err(QueryError::MissingArguments("filter"));
        }
        let clause = expr::serialize_raw(&self.context.registry, raw);
        self.params.and_filter(clause);
        Ok(())
    }

    pub(crate) fn set_param(&mut self, key: &str, value: SetValue) -> QueryResult<()> {
        let value = match value {
            SetValue::Text(text) => text,
            SetValue::Addressable(Addressable::Column(c)) => {
                self.context.registry.serialize(c, false)?
            }
            SetValue::Addressable(Addressable::Segment(s)) => self.context.segments.serialize(s)?,
        };
        self.params.set(key, value)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// `a, b and c` over metric ids, `n/a` without metrics.
    pub fn description(&self) -> String {
        match self.params.metrics.as_slice() {
            [] => "n/a".to_string(),
            [only] => only.clone(),
            [head @ .., last] => format!("{} and {last}", head.iter().join(", ")),
        }
    }

    pub fn build(&self) -> WireRequest {
        WireRequest::from_params(self.endpoint, &self.params)
    }
}

/// The capability set shared by every query variant.
///
/// Builder methods take `&self` and return a new query. Validation happens
/// eagerly; on error nothing is returned and the receiver is unchanged.
pub trait Queryable: Clone + Sized {
    /// Realtime queries are answered in one page.
    const SINGLE_PAGE: bool = false;

    fn core(&self) -> &QueryCore;
    fn core_mut(&mut self) -> &mut QueryCore;

    /// Clone, apply `change`, return the clone.
    fn refine_with<F>(&self, change: F) -> QueryResult<Self>
    where
        F: FnOnce(&mut QueryCore) -> QueryResult<()>,
    {
        let mut next = self.clone();
        change(next.core_mut())?;
        Ok(next)
    }

    fn metrics<I, C>(&self, values: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        self.refine_with(|core| core.add_metrics(values))
    }

    fn dimensions<I, C>(&self, values: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        self.refine_with(|core| core.add_dimensions(values))
    }

    /// Metrics and dimensions in one call.
    fn query<M, D, C1, C2>(&self, metrics: M, dimensions: D) -> QueryResult<Self>
    where
        M: IntoIterator<Item = C1>,
        D: IntoIterator<Item = C2>,
        C1: Into<ColumnRef>,
        C2: Into<ColumnRef>,
    {
        self.refine_with(|core| {
            core.add_metrics(metrics)?;
            core.add_dimensions(dimensions)
        })
    }

    /// Append sort keys; `-name` sorts descending.
    fn sort<I, K>(&self, keys: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<SortKey>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.refine_with(|core| core.add_sort(keys, false))
    }

    /// Append sort keys, all descending.
    fn sort_desc<I, K>(&self, keys: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<SortKey>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.refine_with(|core| core.add_sort(keys, true))
    }

    /// Keep rows matching every key of the selection.
    fn filter(&self, selection: Selection) -> QueryResult<Self> {
        self.refine_with(|core| core.add_selection(&selection, AND, false))
    }

    /// Keep rows matching any key of the selection.
    fn filter_any(&self, selection: Selection) -> QueryResult<Self> {
        self.refine_with(|core| core.add_selection(&selection, OR, false))
    }

    /// Drop rows matching every key of the selection.
    fn exclude(&self, selection: Selection) -> QueryResult<Self> {
        self.refine_with(|core| core.add_selection(&selection, AND, true))
    }

    /// Filter with a caller-written expression (`ga:pageviews>10;...`).
    fn filter_raw(&self, raw: &str) -> QueryResult<Self> {
        self.refine_with(|core| core.add_raw_filter(raw))
    }

    fn set(&self, key: &str, value: impl Into<SetValue>) -> QueryResult<Self> {
        let value = value.into();
        self.refine_with(|core| core.set_param(key, value))
    }

    fn set_many<I, K, V>(&self, pairs: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SetValue>,
    {
        let pairs: Vec<(K, SetValue)> = pairs.into_iter().map(|(k, v)| (k, v.into())).collect();
        if pairs.is_empty() {
            return Err(QueryError::MissingArguments("set"));
        }
        self.refine_with(|core| {
            for (key, value) in pairs {
                core.set_param(key.as_ref(), value)?;
            }
            Ok(())
        })
    }

    fn with_title(&self, title: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.core_mut().title = Some(title.into());
        next
    }

    /// The explicit title, or a description built from the metrics.
    fn title(&self) -> String {
        self.core()
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| self.core().description())
    }

    /// Title plus the human names of the requested metrics and dimensions.
    fn envelope(&self) -> Envelope {
        let core = self.core();
        let names = |ids: &[String]| -> Vec<String> {
            ids.iter()
                .map(|id| core.registry().get(id).map_or_else(|| id.clone(), |c| c.name.clone()))
                .collect()
        };
        Envelope {
            title: self.title(),
            metrics: names(&core.params().metrics),
            dimensions: names(&core.params().dimensions),
        }
    }

    fn build(&self) -> WireRequest {
        self.core().build()
    }

    fn signature(&self) -> String {
        self.build().signature()
    }

    fn cache_key(&self) -> Option<String> {
        self.build().cache_key()
    }

    /// Execute the query, following pages until done.
    fn get(&self) -> QueryResult<Report> {
        let paginator = Paginator::new(self.core());
        if Self::SINGLE_PAGE {
            paginator.single_page().run()
        } else {
            paginator.run()
        }
    }

    /// Execute once and keep the report on this instance.
    fn report(&self) -> QueryResult<&Report> {
        self.core().report.0.get_or_try_init(|| self.get())
    }
}
