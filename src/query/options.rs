//! Enumerated query options: time granularity, sampling precision and sort
//! keys.

use std::fmt;
use std::ops::Neg;
use std::sync::Arc;

use crate::columns::{Column, ColumnRef};
use crate::error::{QueryError, QueryResult};

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// Time bucket of a report, expressed as a leading date dimension.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Granularity {
    /// One row per combination of the other dimensions.
    #[default]
    Total,
    Year,
    Month,
    Week,
    Day,
    Hour,
}

impl Granularity {
    const OPTIONS: &'static str = "year, month, week, day, hour, total";

    /// The date dimension that buckets rows at this granularity.
    pub fn dimension(&self) -> Option<&'static str> {
        match self {
            Self::Total => None,
            Self::Year => Some("ga:year"),
            Self::Month => Some("ga:yearMonth"),
            Self::Week => Some("ga:yearWeek"),
            Self::Day => Some("ga:date"),
            Self::Hour => Some("ga:dateHour"),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Total => write!(f, "total"),
            Self::Year => write!(f, "year"),
            Self::Month => write!(f, "month"),
            Self::Week => write!(f, "week"),
            Self::Day => write!(f, "day"),
            Self::Hour => write!(f, "hour"),
        }
    }
}

impl TryFrom<&str> for Granularity {
    type Error = QueryError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "total" => Ok(Self::Total),
            "year" => Ok(Self::Year),
            "month" | "year_month" => Ok(Self::Month),
            "week" | "year_week" => Ok(Self::Week),
            "day" | "date" => Ok(Self::Day),
            "hour" | "date_hour" => Ok(Self::Hour),
            _ => Err(QueryError::InvalidGranularity {
                given: s.to_string(),
                options: Self::OPTIONS.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Sampling trade-off between speed and accuracy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    Faster,
    #[default]
    Default,
    HigherPrecision,
}

impl Precision {
    pub const LEVELS: [Precision; 3] = [Self::Faster, Self::Default, Self::HigherPrecision];
    const OPTIONS: &'static str = "faster, default, higher_precision (or 0, 1, 2)";

    /// Wire value of `samplingLevel`; the default level is left unset.
    pub fn sampling_level(&self) -> Option<&'static str> {
        match self {
            Self::Faster => Some("FASTER"),
            Self::Default => None,
            Self::HigherPrecision => Some("HIGHER_PRECISION"),
        }
    }

    fn invalid(given: impl fmt::Display) -> QueryError {
        QueryError::InvalidPrecision {
            given: given.to_string(),
            options: Self::OPTIONS.to_string(),
        }
    }
}

impl TryFrom<&str> for Precision {
    type Error = QueryError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "faster" | "0" => Ok(Self::Faster),
            "default" | "1" => Ok(Self::Default),
            "higher_precision" | "2" => Ok(Self::HigherPrecision),
            _ => Err(Self::invalid(s)),
        }
    }
}

impl TryFrom<usize> for Precision {
    type Error = QueryError;

    fn try_from(level: usize) -> Result<Self, Self::Error> {
        Self::LEVELS
            .get(level)
            .copied()
            .ok_or_else(|| Self::invalid(level))
    }
}

// ---------------------------------------------------------------------------
// Sort keys
// ---------------------------------------------------------------------------

/// A column to sort on plus its direction.
///
/// Strings starting with `-` are descending; column references are
/// ascending unless negated.
#[derive(Clone, Debug)]
pub struct SortKey {
    pub column: ColumnRef,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Wire form for an already resolved id.
    pub(crate) fn render(&self, id: &str) -> String {
        if self.descending {
            format!("-{id}")
        } else {
            id.to_string()
        }
    }
}

impl From<&str> for SortKey {
    fn from(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(rest) => Self::desc(rest),
            None => Self::asc(s),
        }
    }
}

impl From<String> for SortKey {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Arc<Column>> for SortKey {
    fn from(c: Arc<Column>) -> Self {
        Self::asc(c)
    }
}

impl From<&Arc<Column>> for SortKey {
    fn from(c: &Arc<Column>) -> Self {
        Self::asc(c)
    }
}

impl Neg for SortKey {
    type Output = SortKey;

    fn neg(self) -> SortKey {
        SortKey {
            descending: !self.descending,
            ..self
        }
    }
}

pub(crate) fn parse_precision(value: &serde_json::Value) -> QueryResult<Precision> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Precision::invalid(n))
            .and_then(Precision::try_from),
        serde_json::Value::String(s) => Precision::try_from(s.as_str()),
        other => Err(Precision::invalid(other)),
    }
}
