//! Date windows.
//!
//! A bound is an ISO date or one of the reporting API's relative forms:
//! `today`, `yesterday`, `NdaysAgo`. Bounds given by the caller are sent
//! verbatim; only a computed stop is rendered by this module.

use std::cmp::Ordering;

use chrono::{Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, QueryResult};

static DAYS_AGO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)daysAgo$").expect("static regex"));

/// A parsed range bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DateBound {
    Absolute(NaiveDate),
    DaysAgo(u32),
}

impl DateBound {
    pub fn parse(raw: &str) -> QueryResult<Self> {
        match raw {
            "today" => return Ok(Self::DaysAgo(0)),
            "yesterday" => return Ok(Self::DaysAgo(1)),
            _ => {}
        }
        if let Some(caps) = DAYS_AGO_RE.captures(raw)
            && let Ok(n) = caps[1].parse::<u32>()
        {
            return Ok(Self::DaysAgo(n));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Self::Absolute)
            .map_err(|_| {
                QueryError::InvalidRequest(format!(
                    "cannot parse date '{raw}': expected YYYY-MM-DD, today, yesterday or NdaysAgo"
                ))
            })
    }

    /// Relative strings have no dash.
    pub fn is_relative(&self) -> bool {
        matches!(self, Self::DaysAgo(_))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Absolute(date) => date.format("%Y-%m-%d").to_string(),
            Self::DaysAgo(0) => "today".to_string(),
            Self::DaysAgo(1) => "yesterday".to_string(),
            Self::DaysAgo(n) => format!("{n}daysAgo"),
        }
    }

    /// Chronological order where it is knowable without a calendar.
    fn chronological(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Absolute(a), Self::Absolute(b)) => Some(a.cmp(b)),
            (Self::DaysAgo(a), Self::DaysAgo(b)) => Some(b.cmp(a)),
            _ => None,
        }
    }
}

/// A date given as text or as a calendar date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateInput(String);

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DateInput {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(d: NaiveDate) -> Self {
        Self(d.format("%Y-%m-%d").to_string())
    }
}

/// `range(start, stop, months, days)` arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    start: String,
    stop: Option<String>,
    months: i32,
    days: i32,
}

impl RangeSpec {
    pub fn new(start: impl Into<DateInput>) -> Self {
        Self {
            start: start.into().0,
            stop: None,
            months: 0,
            days: 0,
        }
    }

    pub fn stop(mut self, stop: impl Into<DateInput>) -> Self {
        self.stop = Some(stop.into().0);
        self
    }

    /// Window length in months; negative values end the window at `start`.
    pub fn months(mut self, months: i32) -> Self {
        self.months = months;
        self
    }

    /// Window length in days; negative values end the window at `start`.
    pub fn days(mut self, days: i32) -> Self {
        self.days = days;
        self
    }

    /// `(start_date, end_date)`, earliest first.
    pub fn resolve(&self) -> QueryResult<(String, String)> {
        let start = DateBound::parse(&self.start)?;
        let span = self.months != 0 || self.days != 0;

        let (stop_raw, stop) = match (&self.stop, span) {
            (Some(_), true) => return Err(QueryError::AmbiguousRange),
            (Some(raw), false) => (raw.clone(), DateBound::parse(raw)?),
            (None, false) => (self.start.clone(), start),
            (None, true) => {
                let stop = self.offset(start)?;
                (stop.render(), stop)
            }
        };

        match start.chronological(&stop) {
            Some(Ordering::Greater) => Ok((stop_raw, self.start.clone())),
            _ => Ok((self.start.clone(), stop_raw)),
        }
    }

    /// `start + (months, days -/+ 1)`: a window of `days` days includes both
    /// ends.
    fn offset(&self, start: DateBound) -> QueryResult<DateBound> {
        let past = self.days < 0 || self.months < 0;
        let days = i64::from(self.days) + if past { 1 } else { -1 };
        match start {
            DateBound::Absolute(date) => {
                let shifted = if self.months >= 0 {
                    date.checked_add_months(Months::new(self.months.unsigned_abs()))
                } else {
                    date.checked_sub_months(Months::new(self.months.unsigned_abs()))
                };
                let shifted = shifted.and_then(|d| {
                    if days >= 0 {
                        d.checked_add_days(Days::new(days.unsigned_abs()))
                    } else {
                        d.checked_sub_days(Days::new(days.unsigned_abs()))
                    }
                });
                shifted
                    .map(DateBound::Absolute)
                    .ok_or_else(|| QueryError::InvalidRequest("date range out of bounds".into()))
            }
            DateBound::DaysAgo(_) if self.months != 0 => Err(QueryError::InvalidRequest(
                "relative start dates cannot be combined with months".into(),
            )),
            DateBound::DaysAgo(n) => {
                let stop = i64::from(n) - days;
                u32::try_from(stop).map(DateBound::DaysAgo).map_err(|_| {
                    QueryError::InvalidRequest(format!(
                        "a {}-day window starting {} ends in the future",
                        self.days,
                        start.render()
                    ))
                })
            }
        }
    }
}

impl From<&str> for RangeSpec {
    fn from(start: &str) -> Self {
        Self::new(start)
    }
}

impl From<String> for RangeSpec {
    fn from(start: String) -> Self {
        Self::new(start)
    }
}

impl From<NaiveDate> for RangeSpec {
    fn from(start: NaiveDate) -> Self {
        Self::new(start)
    }
}

impl From<(&str, &str)> for RangeSpec {
    fn from((start, stop): (&str, &str)) -> Self {
        Self::new(start).stop(stop)
    }
}

impl From<(NaiveDate, NaiveDate)> for RangeSpec {
    fn from((start, stop): (NaiveDate, NaiveDate)) -> Self {
        Self::new(start).stop(stop)
    }
}
