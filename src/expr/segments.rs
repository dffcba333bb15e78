//! Dynamic segment fragments.
//!
//! ```text
//! users::condition::perUser::ga:sessions>10
//! sessions::sequence::ga:pagePath==/a;->>ga:pagePath==/b
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};

/// Who a dynamic segment selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentScope {
    Users,
    Sessions,
}

impl SegmentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Sessions => "sessions",
        }
    }
}

impl fmt::Display for SegmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentScope {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Self::Users),
            "sessions" => Ok(Self::Sessions),
            other => Err(QueryError::InvalidRequest(format!(
                "segment scope should be users or sessions, got '{other}'"
            ))),
        }
    }
}

/// Aggregation level of metric conditions inside a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricScope {
    PerUser,
    PerSession,
    PerHit,
}

impl MetricScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerUser => "perUser",
            Self::PerSession => "perSession",
            Self::PerHit => "perHit",
        }
    }
}

impl fmt::Display for MetricScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricScope {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perUser" => Ok(Self::PerUser),
            "perSession" => Ok(Self::PerSession),
            "perHit" => Ok(Self::PerHit),
            other => Err(QueryError::InvalidRequest(format!(
                "metric scope should be perUser, perSession or perHit, got '{other}'"
            ))),
        }
    }
}

pub fn condition(value: &str) -> String {
    format!("condition::{value}")
}

pub fn sequence(value: &str) -> String {
    format!("sequence::{value}")
}

/// A condition matching every expression.
pub fn all<S: AsRef<str>>(values: &[S]) -> String {
    condition(&join(values, ";"))
}

/// A condition matching any expression.
pub fn any<S: AsRef<str>>(values: &[S]) -> String {
    condition(&join(values, ","))
}

/// A sequence where each step happens some time after the previous one.
pub fn followed_by<S: AsRef<str>>(values: &[S]) -> String {
    sequence(&join(values, ";->>"))
}

/// A sequence where each step happens right after the previous one.
pub fn immediately_followed_by<S: AsRef<str>>(values: &[S]) -> String {
    sequence(&join(values, ";->"))
}

fn join<S: AsRef<str>>(values: &[S], sep: &str) -> String {
    values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(sep)
}

/// `{scope}::condition::[{metric_scope}::]{expr}`
pub fn scoped_condition(scope: SegmentScope, metric_scope: Option<MetricScope>, expr: &str) -> String {
    match metric_scope {
        Some(ms) => format!("{scope}::{}", condition(&format!("{ms}::{expr}"))),
        None => format!("{scope}::{}", condition(expr)),
    }
}

/// `{scope}::{value}` for caller-written fragments.
pub fn scoped_literal(scope: SegmentScope, value: &str) -> QueryResult<String> {
    if value.is_empty() {
        return Err(QueryError::MissingArguments("segment"));
    }
    Ok(format!("{scope}::{value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaining_helpers() {
        assert_eq!(all(&["ga:a==1", "ga:b==2"]), "condition::ga:a==1;ga:b==2");
        assert_eq!(any(&["ga:a==1", "ga:b==2"]), "condition::ga:a==1,ga:b==2");
        assert_eq!(
            followed_by(&["ga:pagePath==/a", "ga:pagePath==/b"]),
            "sequence::ga:pagePath==/a;->>ga:pagePath==/b"
        );
        assert_eq!(
            immediately_followed_by(&["ga:pagePath==/a", "ga:pagePath==/b"]),
            "sequence::ga:pagePath==/a;->ga:pagePath==/b"
        );
    }

    #[test]
    fn scoped_fragments() {
        assert_eq!(
            scoped_condition(SegmentScope::Users, Some(MetricScope::PerUser), "ga:sessions>10"),
            "users::condition::perUser::ga:sessions>10"
        );
        assert_eq!(
            scoped_condition(SegmentScope::Sessions, None, "ga:medium==cpc"),
            "sessions::condition::ga:medium==cpc"
        );
        assert_eq!(
            scoped_literal(SegmentScope::Users, "condition::perUser::ga:sessions>10").unwrap(),
            "users::condition::perUser::ga:sessions>10"
        );
    }

    #[test]
    fn scope_parsing() {
        assert_eq!("users".parse::<SegmentScope>().unwrap(), SegmentScope::Users);
        assert!("visitors".parse::<SegmentScope>().is_err());
        assert_eq!("perHit".parse::<MetricScope>().unwrap(), MetricScope::PerHit);
        assert!("perDay".parse::<MetricScope>().is_err());
    }
}
