//! Filter and segment expression grammar.
//!
//! A criterion renders as `id<operator><escaped-value>`. Criteria combine
//! with `;` (AND) and `,` (OR); OR binds tighter. Values escape `,` and `;`
//! with a backslash and booleans render as `Yes`/`No`.
//!
//! - [`segments`] - `condition::`/`sequence::` fragments and chaining helpers

pub mod segments;

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::columns::ColumnRegistry;
use crate::error::{QueryError, QueryResult};

pub use segments::{MetricScope, SegmentScope};

/// AND between criteria.
pub const AND: char = ';';
/// OR between criteria.
pub const OR: char = ',';

/// Comparison operator, addressed by its selection suffix (`__gt`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Binary; two values joined by `_`.
    Between,
    /// N-ary OR; values joined by `|`.
    Any,
    Contains,
    NContains,
    Re,
    NRe,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Self::Eq,
        Self::Neq,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::Between,
        Self::Any,
        Self::Contains,
        Self::NContains,
        Self::Re,
        Self::NRe,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Between => "<>",
            Self::Any => "[]",
            Self::Contains => "=@",
            Self::NContains => "!@",
            Self::Re => "=~",
            Self::NRe => "!~",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Between => "between",
            Self::Any => "any",
            Self::Contains => "contains",
            Self::NContains => "ncontains",
            Self::Re => "re",
            Self::NRe => "nre",
        }
    }

    /// Logical negation; `between` and `any` have none.
    pub fn invert(&self) -> QueryResult<Self> {
        Ok(match self {
            Self::Eq => Self::Neq,
            Self::Neq => Self::Eq,
            Self::Lt => Self::Gte,
            Self::Gte => Self::Lt,
            Self::Gt => Self::Lte,
            Self::Lte => Self::Gt,
            Self::Re => Self::NRe,
            Self::NRe => Self::Re,
            Self::Contains => Self::NContains,
            Self::NContains => Self::Contains,
            Self::Between | Self::Any => {
                return Err(QueryError::UnsupportedInversion(self.suffix().to_string()));
            }
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.suffix() == s)
            .ok_or_else(|| {
                QueryError::InvalidRequest(format!(
                    "unknown operator '{s}', should be one of: {}",
                    Self::ALL.iter().map(Operator::suffix).join(", ")
                ))
            })
    }
}

/// A scalar on the right-hand side of a criterion.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl FilterValue {
    /// Wire form with the grammar's delimiters escaped.
    pub fn escaped(&self) -> String {
        match self {
            Self::Bool(true) => "Yes".to_string(),
            Self::Bool(false) => "No".to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Text(s) => escape(s),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> QueryResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            }),
            other => Err(QueryError::InvalidRequest(format!(
                "unsupported filter value: {other}"
            ))),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<f64> for FilterValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One or more values for a selection key.
#[derive(Clone, Debug, PartialEq)]
pub struct Values(pub Vec<FilterValue>);

impl<T: Into<FilterValue>> From<Vec<T>> for Values {
    fn from(v: Vec<T>) -> Self {
        Self(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>, const N: usize> From<[T; N]> for Values {
    fn from(v: [T; N]) -> Self {
        Self(v.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Values {
    fn from(s: &str) -> Self {
        Self(vec![s.into()])
    }
}

impl From<String> for Values {
    fn from(s: String) -> Self {
        Self(vec![s.into()])
    }
}

impl From<i64> for Values {
    fn from(n: i64) -> Self {
        Self(vec![n.into()])
    }
}

impl From<i32> for Values {
    fn from(n: i32) -> Self {
        Self(vec![n.into()])
    }
}

impl From<f64> for Values {
    fn from(x: f64) -> Self {
        Self(vec![x.into()])
    }
}

impl From<bool> for Values {
    fn from(b: bool) -> Self {
        Self(vec![b.into()])
    }
}

/// Ordered `{column[__operator]: values}` selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    criteria: Vec<(String, Values)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` (`column` or `column__op`) with one or more values.
    pub fn with(mut self, key: impl Into<String>, values: impl Into<Values>) -> Self {
        self.criteria.push((key.into(), values.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Values)> {
        self.criteria.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from a JSON map whose values are scalars or lists of scalars.
    pub fn from_json(map: &serde_json::Map<String, serde_json::Value>) -> QueryResult<Self> {
        let mut selection = Self::new();
        for (key, value) in map {
            let values = match value {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(FilterValue::from_json)
                    .collect::<QueryResult<Vec<_>>>()?,
                scalar => vec![FilterValue::from_json(scalar)?],
            };
            selection = selection.with(key.clone(), Values(values));
        }
        Ok(selection)
    }

    /// Render the selection. `join` is the connective between keys; with
    /// `exclude` the selection is negated as a whole, so every operator is
    /// inverted and both connectives swap (De Morgan).
    pub fn serialize(&self, registry: &ColumnRegistry, join: char, exclude: bool) -> QueryResult<String> {
        if self.criteria.is_empty() {
            return Err(QueryError::MissingArguments("filter"));
        }
        let join = if exclude { swap(join) } else { join };
        let parts = self
            .criteria
            .iter()
            .map(|(key, values)| serialize_criterion(registry, key, &values.0, exclude))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(parts.join(&join.to_string()))
    }
}

fn swap(connective: char) -> char {
    if connective == AND { OR } else { AND }
}

/// Split `column__op` into column and operator; plain keys mean `eq`.
pub fn parse_key(key: &str) -> QueryResult<(&str, Operator)> {
    match key.rsplit_once("__") {
        Some((column, suffix)) if !column.is_empty() => Ok((column, suffix.parse()?)),
        _ => Ok((key, Operator::Eq)),
    }
}

/// Render a single selection key. Several values for one key form an OR
/// group, or an AND group when excluded.
pub fn serialize_criterion(
    registry: &ColumnRegistry,
    key: &str,
    values: &[FilterValue],
    exclude: bool,
) -> QueryResult<String> {
    let (column, operator) = parse_key(key)?;
    let operator = if exclude { operator.invert()? } else { operator };
    let id = registry.serialize(column, true)?;
    if values.is_empty() {
        return Err(QueryError::InvalidRequest(format!("no value given for '{key}'")));
    }
    match operator {
        Operator::Between => match values {
            [a, b] => Ok(format!("{id}{}{}_{}", operator.symbol(), a.escaped(), b.escaped())),
            _ => Err(QueryError::InvalidRequest(format!(
                "between takes exactly two values, got {}",
                values.len()
            ))),
        },
        Operator::Any => Ok(format!(
            "{id}{}{}",
            operator.symbol(),
            values.iter().map(FilterValue::escaped).join("|")
        )),
        _ => {
            let group = if exclude { AND } else { OR };
            Ok(values
                .iter()
                .map(|v| format!("{id}{}{}", operator.symbol(), v.escaped()))
                .join(&group.to_string()))
        }
    }
}

/// Backslash-escape the list and AND delimiters.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == AND || ch == OR {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Split on `delim` where it is not backslash-escaped.
pub fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delim {
            parts.push(&s[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Serialize the identifiers of a caller-supplied filter string
/// non-greedily (`pageviews<10` -> `ga:pageviews<10`), leaving operators,
/// values and unknown identifiers untouched.
pub fn serialize_raw(registry: &ColumnRegistry, raw: &str) -> String {
    split_unescaped(raw, AND)
        .into_iter()
        .map(|group| {
            split_unescaped(group, OR)
                .into_iter()
                .map(|criterion| serialize_raw_criterion(registry, criterion))
                .join(",")
        })
        .join(";")
}

fn serialize_raw_criterion(registry: &ColumnRegistry, criterion: &str) -> String {
    let split = Operator::ALL
        .iter()
        .filter_map(|op| criterion.find(op.symbol()).map(|pos| (pos, op.symbol().len())))
        // Earliest match; on ties the longer symbol (`<=` before `<`).
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    match split {
        Some((pos, _)) => {
            let (identifier, rest) = criterion.split_at(pos);
            let id = registry
                .serialize(identifier.trim(), false)
                .unwrap_or_else(|_| identifier.to_string());
            format!("{id}{rest}")
        }
        None => registry
            .serialize(criterion, false)
            .unwrap_or_else(|_| criterion.to_string()),
    }
}
