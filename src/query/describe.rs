//! Declarative query descriptions.
//!
//! A description is a JSON (or YAML) map from builder method names to their
//! arguments, applied in document order:
//!
//! ```yaml
//! type: core
//! metrics: [pageviews, sessions]
//! daily: {start: 2014-01-01, days: 7}
//! filter: {medium: cpc}
//! sort: -pageviews
//! limit: 10
//! ```
//!
//! Arguments are a scalar (one positional argument), a list (positional
//! arguments) or a map (named arguments). Every entry is parsed into a
//! [`QueryCommand`] through one dispatch table before anything is applied, so an
//! unknown method or a malformed argument fails without building a query.

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::api::ReportingApi;
use crate::error::{QueryError, QueryResult};
use crate::expr::{MetricScope, SegmentScope, Selection};
use crate::transport::Endpoint;

use super::core_query::{CoreQuery, SegmentSpec};
use super::options::{Granularity, Precision, SortKey, parse_precision};
use super::range::RangeSpec;
use super::realtime::RealtimeQuery;
use super::{Queryable, SetValue};

/// Key selecting the endpoint; never treated as a command.
const TYPE_KEY: &str = "type";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One parsed builder call.
#[derive(Clone, Debug)]
pub enum QueryCommand {
    Metrics(Vec<String>),
    Dimensions(Vec<String>),
    Query {
        metrics: Vec<String>,
        dimensions: Vec<String>,
    },
    Range(RangeSpec),
    Interval(Granularity),
    /// `hourly`, `daily`, ... `total`: an interval plus a range.
    Window {
        granularity: Granularity,
        range: RangeSpec,
    },
    Lifetime(RangeSpec),
    Precision(Precision),
    Sort {
        keys: Vec<String>,
        descending: bool,
    },
    Filter {
        criteria: FilterCriteria,
        exclude: bool,
    },
    Segment(SegmentSpec),
    Limit {
        start: Option<u32>,
        n: u32,
    },
    Step(u32),
    Set(Vec<(String, String)>),
    Title(String),
}

/// The two mutually exclusive forms of a filter.
#[derive(Clone, Debug)]
pub enum FilterCriteria {
    Raw(String),
    Selection(Selection),
}

/// Arguments of one description entry.
#[derive(Debug)]
enum Args<'a> {
    Positional(Vec<&'a Json>),
    Named(&'a Map<String, Json>),
}

impl<'a> Args<'a> {
    fn new(value: &'a Json) -> Self {
        match value {
            Json::Array(items) => Self::Positional(items.iter().collect()),
            Json::Object(map) => Self::Named(map),
            scalar => Self::Positional(vec![scalar]),
        }
    }
}

type Parser = fn(&str, &Args<'_>) -> QueryResult<QueryCommand>;

/// Every method a description may name, with its argument parser.
const COMMANDS: &[(&str, Parser)] = &[
    ("metrics", parse_metrics),
    ("dimensions", parse_dimensions),
    ("query", parse_query),
    ("range", parse_range),
    ("interval", parse_interval),
    ("hourly", parse_window),
    ("daily", parse_window),
    ("weekly", parse_window),
    ("monthly", parse_window),
    ("yearly", parse_window),
    ("total", parse_window),
    ("lifetime", parse_lifetime),
    ("precision", parse_precision_command),
    ("sort", parse_sort),
    ("filter", parse_filter),
    ("segment", parse_segment),
    ("limit", parse_limit),
    ("step", parse_step),
    ("set", parse_set),
    ("title", parse_title),
];

impl QueryCommand {
    /// Parse one `method: arguments` entry.
    pub fn parse(method: &str, arguments: &Json) -> QueryResult<Self> {
        let (_, parser) = COMMANDS
            .iter()
            .find(|(name, _)| *name == method)
            .ok_or_else(|| {
                QueryError::InvalidRequest(format!("'{method}' is not a query method"))
            })?;
        parser(method, &Args::new(arguments))
    }

    /// Parse every entry of a description, skipping the `type` key.
    pub fn parse_all(description: &Json) -> QueryResult<Vec<Self>> {
        let map = description.as_object().ok_or_else(|| {
            QueryError::InvalidRequest("a query description must be a map".into())
        })?;
        map.iter()
            .filter(|(key, _)| key.as_str() != TYPE_KEY)
            .map(|(method, arguments)| Self::parse(method, arguments))
            .collect()
    }

    /// Commands available on every endpoint.
    fn is_shared(&self) -> bool {
        matches!(
            self,
            Self::Metrics(_)
                | Self::Dimensions(_)
                | Self::Query { .. }
                | Self::Sort { .. }
                | Self::Filter { .. }
                | Self::Limit { start: None, .. }
                | Self::Set(_)
                | Self::Title(_)
        )
    }

    fn apply_shared<Q: Queryable>(self, query: &Q) -> QueryResult<Q> {
        match self {
            Self::Metrics(metrics) => query.metrics(metrics),
            Self::Dimensions(dimensions) => query.dimensions(dimensions),
            Self::Query {
                metrics,
                dimensions,
            } => query.query(metrics, dimensions),
            Self::Sort { keys, descending } if descending => query.sort_desc(keys),
            Self::Sort { keys, .. } => query.sort(keys.into_iter().map(SortKey::from)),
            Self::Filter { criteria, exclude } => match criteria {
                FilterCriteria::Raw(raw) => query.filter_raw(&raw),
                FilterCriteria::Selection(selection) if exclude => query.exclude(selection),
                FilterCriteria::Selection(selection) => query.filter(selection),
            },
            Self::Set(pairs) => query.set_many(pairs.into_iter().map(|(k, v)| (k, SetValue::Text(v)))),
            Self::Title(title) => Ok(query.with_title(title)),
            other => Err(QueryError::InvalidRequest(format!(
                "{other:?} is not available on this endpoint"
            ))),
        }
    }

    pub fn apply_core(self, query: &CoreQuery) -> QueryResult<CoreQuery> {
        match self {
            Self::Range(spec) => query.range(spec),
            Self::Interval(granularity) => query.interval(granularity),
            Self::Window { granularity, range } => query.interval(granularity)?.range(range),
            Self::Lifetime(spec) => query.lifetime(spec),
            Self::Precision(precision) => Ok(query.precision(precision)),
            Self::Segment(spec) => query.segment(spec),
            Self::Limit { start, n } => query.limit_from(start.unwrap_or(1), n),
            Self::Step(n) => query.step(n),
            shared => shared.apply_shared(query),
        }
    }

    pub fn apply_realtime(self, query: &RealtimeQuery) -> QueryResult<RealtimeQuery> {
        match self {
            Self::Limit { start: None, n } => query.limit(n),
            shared if shared.is_shared() => shared.apply_shared(query),
            other => Err(QueryError::InvalidRequest(format!(
                "{other:?} is not available on the realtime endpoint"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument parsers
// ---------------------------------------------------------------------------

fn text(method: &str, value: &Json) -> QueryResult<String> {
    match value {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(b.to_string()),
        other => Err(QueryError::InvalidRequest(format!(
            "{method}: expected a scalar, got {other}"
        ))),
    }
}

fn count(method: &str, value: &Json) -> QueryResult<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            QueryError::InvalidRequest(format!("{method}: expected a positive integer, got {value}"))
        })
}

fn flag(method: &str, value: Option<&Json>) -> QueryResult<bool> {
    match value {
        None | Some(Json::Null) => Ok(false),
        Some(Json::Bool(b)) => Ok(*b),
        Some(other) => Err(QueryError::InvalidRequest(format!(
            "{method}: expected true or false, got {other}"
        ))),
    }
}

/// A scalar or a list of scalars, flattened.
fn flatten(method: &str, value: &Json) -> QueryResult<Vec<String>> {
    match value {
        Json::Array(items) => items.iter().map(|item| text(method, item)).collect(),
        Json::Null => Ok(Vec::new()),
        scalar => Ok(vec![text(method, scalar)?]),
    }
}

fn names(args: &Args<'_>) -> QueryResult<Vec<String>> {
    match args {
        Args::Positional(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(flatten("columns", item)?);
            }
            Ok(out)
        }
        Args::Named(_) => Err(QueryError::InvalidRequest(
            "column lists take a name or a list of names".into(),
        )),
    }
}

fn single<'a>(method: &str, args: &Args<'a>) -> QueryResult<&'a Json> {
    match args {
        Args::Positional(items) if items.len() == 1 => Ok(items[0]),
        _ => Err(QueryError::InvalidRequest(format!(
            "{method} takes exactly one argument"
        ))),
    }
}

fn single_text(method: &str, args: &Args<'_>) -> QueryResult<String> {
    text(method, single(method, args)?)
}

fn single_count(method: &str, args: &Args<'_>) -> QueryResult<u32> {
    count(method, single(method, args)?)
}

fn offset(method: &str, value: Option<&Json>) -> QueryResult<i32> {
    match value {
        None | Some(Json::Null) => Ok(0),
        Some(value) => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| {
                QueryError::InvalidRequest(format!("{method}: expected an integer, got {value}"))
            }),
    }
}

fn range(method: &str, args: &Args<'_>) -> QueryResult<RangeSpec> {
    match args {
        Args::Positional(items) => match items.as_slice() {
            [start] => Ok(RangeSpec::new(text(method, start)?)),
            [start, stop] => Ok(RangeSpec::new(text(method, start)?).stop(text(method, stop)?)),
            _ => Err(QueryError::InvalidRequest(format!(
                "{method} takes a start date and an optional stop date"
            ))),
        },
        Args::Named(map) => {
            let start = map
                .get("start")
                .ok_or(QueryError::MissingArguments("range"))
                .and_then(|v| text(method, v))?;
            let mut spec = RangeSpec::new(start)
                .months(offset(method, map.get("months"))?)
                .days(offset(method, map.get("days"))?);
            if let Some(stop) = map.get("stop")
                && !stop.is_null()
            {
                spec = spec.stop(text(method, stop)?);
            }
            Ok(spec)
        }
    }
}

fn parse_metrics(_: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Metrics(names(args)?))
}

fn parse_dimensions(_: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Dimensions(names(args)?))
}

fn parse_range(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Range(range(method, args)?))
}

fn parse_lifetime(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Lifetime(range(method, args)?))
}

fn parse_step(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Step(single_count(method, args)?))
}

fn parse_title(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Title(single_text(method, args)?))
}

fn parse_query(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    let (metrics, dimensions) = match args {
        Args::Positional(items) => match items.as_slice() {
            [metrics] => (flatten(method, metrics)?, Vec::new()),
            [metrics, dimensions] => (flatten(method, metrics)?, flatten(method, dimensions)?),
            _ => {
                return Err(QueryError::InvalidRequest(
                    "query takes metrics and optional dimensions".into(),
                ));
            }
        },
        Args::Named(map) => (
            map.get("metrics").map_or(Ok(Vec::new()), |v| flatten(method, v))?,
            map.get("dimensions").map_or(Ok(Vec::new()), |v| flatten(method, v))?,
        ),
    };
    Ok(QueryCommand::Query {
        metrics,
        dimensions,
    })
}

fn parse_interval(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    let name = single_text(method, args)?;
    Ok(QueryCommand::Interval(Granularity::try_from(name.as_str())?))
}

fn parse_window(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    let granularity = match method {
        "hourly" => Granularity::Hour,
        "daily" => Granularity::Day,
        "weekly" => Granularity::Week,
        "monthly" => Granularity::Month,
        "yearly" => Granularity::Year,
        _ => Granularity::Total,
    };
    Ok(QueryCommand::Window {
        granularity,
        range: range(method, args)?,
    })
}

fn parse_precision_command(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    Ok(QueryCommand::Precision(parse_precision(single(method, args)?)?))
}

fn parse_sort(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    match args {
        Args::Positional(_) => Ok(QueryCommand::Sort {
            keys: names(args)?,
            descending: false,
        }),
        Args::Named(map) => Ok(QueryCommand::Sort {
            keys: map
                .get("columns")
                .map_or(Ok(Vec::new()), |v| flatten(method, v))?,
            descending: flag(method, map.get("descending"))?,
        }),
    }
}

fn parse_filter(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    match args {
        Args::Positional(_) => {
            let raw = single_text(method, args)?;
            if raw.trim().is_empty() {
                return Err(QueryError::MissingArguments("filter"));
            }
            Ok(QueryCommand::Filter {
                criteria: FilterCriteria::Raw(raw),
                exclude: false,
            })
        }
        Args::Named(map) => {
            let exclude = flag(method, map.get("exclude"))?;
            let selection: Map<String, Json> = map
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "value" | "exclude"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let raw = map.get("value").filter(|v| !v.is_null());
            let criteria = match (raw, selection.is_empty()) {
                (Some(_), false) => {
                    return Err(QueryError::InvalidRequest(
                        "filter takes either a raw value or a selection, not both".into(),
                    ));
                }
                (Some(raw), true) => FilterCriteria::Raw(text(method, raw)?),
                (None, false) => FilterCriteria::Selection(Selection::from_json(&selection)?),
                (None, true) => return Err(QueryError::MissingArguments("filter")),
            };
            Ok(QueryCommand::Filter { criteria, exclude })
        }
    }
}

fn parse_segment(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    let map = match args {
        Args::Positional(_) => {
            return Ok(QueryCommand::Segment(SegmentSpec::from(single_text(method, args)?)));
        }
        Args::Named(map) => map,
    };
    let scope = map
        .get("scope")
        .map(|v| text(method, v).and_then(|s| s.parse::<SegmentScope>()))
        .transpose()?;
    let metric_scope = map
        .get("metric_scope")
        .map(|v| text(method, v).and_then(|s| s.parse::<MetricScope>()))
        .transpose()?;
    let selection: Map<String, Json> = map
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "value" | "scope" | "metric_scope"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let value = map.get("value").filter(|v| !v.is_null());

    let spec = match (value, scope, selection.is_empty()) {
        (Some(_), _, false) => {
            return Err(QueryError::InvalidRequest(
                "segment takes either a value or a selection, not both".into(),
            ));
        }
        (Some(value), Some(scope), true) => SegmentSpec::Literal {
            scope,
            value: text(method, value)?,
        },
        (Some(value), None, true) => SegmentSpec::from(text(method, value)?),
        (None, Some(scope), false) => SegmentSpec::Selection {
            scope,
            metric_scope,
            selection: Selection::from_json(&selection)?,
        },
        (None, None, false) => {
            return Err(QueryError::InvalidRequest(
                "segment selections need a scope (users or sessions)".into(),
            ));
        }
        (None, _, true) => return Err(QueryError::MissingArguments("segment")),
    };
    Ok(QueryCommand::Segment(spec))
}

fn parse_limit(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    match args {
        Args::Positional(items) => match items.as_slice() {
            [n] => Ok(QueryCommand::Limit {
                start: None,
                n: count(method, n)?,
            }),
            [start, n] => Ok(QueryCommand::Limit {
                start: Some(count(method, start)?),
                n: count(method, n)?,
            }),
            _ => Err(QueryError::InvalidRequest(
                "limit takes a row count or a start index and a row count".into(),
            )),
        },
        Args::Named(map) => Ok(QueryCommand::Limit {
            start: map.get("start").map(|v| count(method, v)).transpose()?,
            n: map
                .get("n")
                .ok_or(QueryError::MissingArguments("limit"))
                .and_then(|v| count(method, v))?,
        }),
    }
}

fn parse_set(method: &str, args: &Args<'_>) -> QueryResult<QueryCommand> {
    let pairs = match args {
        Args::Positional(items) => match items.as_slice() {
            [key, value] => vec![(text(method, key)?, text(method, value)?)],
            _ => {
                return Err(QueryError::InvalidRequest(
                    "set takes a key and a value, or a map".into(),
                ));
            }
        },
        Args::Named(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), text(method, v)?)))
            .collect::<QueryResult<Vec<_>>>()?,
    };
    if pairs.is_empty() {
        return Err(QueryError::MissingArguments("set"));
    }
    Ok(QueryCommand::Set(pairs))
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// A query of either endpoint, as produced by [`describe`].
#[derive(Clone, Debug)]
pub enum AnyQuery {
    Core(CoreQuery),
    Realtime(RealtimeQuery),
}

impl AnyQuery {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Core(_) => Endpoint::Core,
            Self::Realtime(_) => Endpoint::Realtime,
        }
    }

    pub fn apply(&self, command: QueryCommand) -> QueryResult<Self> {
        match self {
            Self::Core(query) => command.apply_core(query).map(Self::Core),
            Self::Realtime(query) => command.apply_realtime(query).map(Self::Realtime),
        }
    }

    pub fn core(&self) -> &super::QueryCore {
        match self {
            Self::Core(query) => query.core(),
            Self::Realtime(query) => query.core(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::Core(query) => query.title(),
            Self::Realtime(query) => query.title(),
        }
    }

    pub fn with_title(&self, title: impl Into<String>) -> Self {
        match self {
            Self::Core(query) => Self::Core(query.with_title(title)),
            Self::Realtime(query) => Self::Realtime(query.with_title(title)),
        }
    }

    pub fn envelope(&self) -> crate::report::Envelope {
        match self {
            Self::Core(query) => query.envelope(),
            Self::Realtime(query) => query.envelope(),
        }
    }

    pub fn build(&self) -> super::WireRequest {
        self.core().build()
    }

    pub fn get(&self) -> QueryResult<crate::report::Report> {
        match self {
            Self::Core(query) => query.get(),
            Self::Realtime(query) => query.get(),
        }
    }
}

impl From<CoreQuery> for AnyQuery {
    fn from(query: CoreQuery) -> Self {
        Self::Core(query)
    }
}

impl From<RealtimeQuery> for AnyQuery {
    fn from(query: RealtimeQuery) -> Self {
        Self::Realtime(query)
    }
}

/// Start a query on the endpoint named by `type` and refine it.
pub fn describe(api: &ReportingApi, description: &Json) -> QueryResult<AnyQuery> {
    let endpoint = match description.get(TYPE_KEY) {
        Some(value) => text(TYPE_KEY, value)?.parse()?,
        None => api.config().default_endpoint,
    };
    let base = match endpoint {
        Endpoint::Core => AnyQuery::Core(api.query()),
        Endpoint::Realtime => AnyQuery::Realtime(api.realtime()),
    };
    refine(&base, description)
}

/// Apply a description to an existing query.
pub fn refine(query: &AnyQuery, description: &Json) -> QueryResult<AnyQuery> {
    let commands = QueryCommand::parse_all(description)?;
    debug!(endpoint = %query.endpoint(), commands = commands.len(), "refining query");
    commands
        .into_iter()
        .try_fold(query.clone(), |query, command| query.apply(command))
}
