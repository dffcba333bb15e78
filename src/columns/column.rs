//! Column descriptors and the casters that type raw response fields.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::report::Value;

/// Placeholder token of templated column families (`ga:customVarNameXX`).
pub const TEMPLATE_TOKEN: &str = "XX";

static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}").expect("static regex"));

/// Whether a column is aggregated (metric) or groups rows (dimension).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Metric,
    Dimension,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => write!(f, "metric"),
            Self::Dimension => write!(f, "dimension"),
        }
    }
}

impl FromStr for ColumnKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "dimension" => Ok(Self::Dimension),
            other => Err(QueryError::InvalidRequest(format!(
                "unknown column type '{other}'"
            ))),
        }
    }
}

/// Remote data type as reported by the metadata API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    String,
    Integer,
    Float,
    Percent,
    Time,
    Currency,
    Other(String),
}

impl From<&str> for DataType {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STRING" => Self::String,
            "INTEGER" => Self::Integer,
            "FLOAT" => Self::Float,
            "PERCENT" => Self::Percent,
            "TIME" => Self::Time,
            "CURRENCY" => Self::Currency,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Percent => write!(f, "PERCENT"),
            Self::Time => write!(f, "TIME"),
            Self::Currency => write!(f, "CURRENCY"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// String to typed value conversion attached to each column.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Caster {
    Text,
    Integer,
    Float,
    /// `YYYYMMDD`
    Date,
    /// `YYYYMMDDHH`, split at position 8.
    DateHour,
}

impl Caster {
    /// Pick the caster for a column. The `date` and `dateHour` dimensions win
    /// over the generic data type table.
    pub fn for_column(slug: &str, data_type: &DataType) -> Self {
        match slug {
            "date" => return Self::Date,
            "dateHour" => return Self::DateHour,
            _ => {}
        }
        match data_type {
            DataType::Integer => Self::Integer,
            DataType::Float | DataType::Percent | DataType::Time | DataType::Currency => {
                Self::Float
            }
            DataType::String | DataType::Other(_) => Self::Text,
        }
    }

    pub fn cast(&self, column: &str, raw: &str) -> QueryResult<Value> {
        let fail = |reason: &str| QueryError::Cast {
            column: column.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::Text => Ok(Value::Text(raw.to_string())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| fail(&e.to_string())),
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| fail(&e.to_string())),
            Self::Date => parse_compact_date(raw)
                .map(Value::Date)
                .ok_or_else(|| fail("expected YYYYMMDD")),
            Self::DateHour => {
                if raw.len() != 10 || !raw.is_char_boundary(8) {
                    return Err(fail("expected YYYYMMDDHH"));
                }
                let (day, hour) = raw.split_at(8);
                let date = parse_compact_date(day).ok_or_else(|| fail("expected YYYYMMDDHH"))?;
                let hour: u32 = hour.parse().map_err(|_| fail("expected YYYYMMDDHH"))?;
                date.and_hms_opt(hour, 0, 0)
                    .map(Value::DateHour)
                    .ok_or_else(|| fail("hour out of range"))
            }
        }
    }
}

fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// `userType` -> `user_type`, `customVarName1` -> `custom_var_name1`.
pub fn snakify(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len() + 4);
    let mut prev_lower = false;
    for ch in slug.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// A typed, addressable metric or dimension of the reporting schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub id: String,
    /// Namespace before the colon: `ga` (core) or `rt` (realtime).
    pub report_type: String,
    pub slug: String,
    pub snake_slug: String,
    pub name: String,
    pub group: Option<String>,
    pub description: Option<String>,
    pub kind: ColumnKind,
    pub data_type: DataType,
    pub caster: Caster,
    pub deprecated: bool,
    pub allowed_in_segments: bool,
    /// Numeric index for members of templated families.
    pub index: Option<u32>,
}

impl Column {
    pub fn new(id: impl Into<String>, kind: ColumnKind, data_type: DataType) -> Self {
        let id = id.into();
        let (report_type, slug) = match id.split_once(':') {
            Some((prefix, slug)) => (prefix.to_string(), slug.to_string()),
            None => (String::new(), id.clone()),
        };
        let index = INDEX_RE
            .find(&slug)
            .and_then(|m| m.as_str().parse::<u32>().ok());
        let caster = Caster::for_column(&slug, &data_type);
        Self {
            snake_slug: snakify(&slug),
            name: id.clone(),
            id,
            report_type,
            slug,
            group: None,
            description: None,
            kind,
            data_type,
            caster,
            deprecated: false,
            allowed_in_segments: true,
            index,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn is_metric(&self) -> bool {
        self.kind == ColumnKind::Metric
    }

    pub fn is_dimension(&self) -> bool {
        self.kind == ColumnKind::Dimension
    }

    pub fn is_core(&self) -> bool {
        self.report_type == "ga"
    }

    pub fn is_realtime(&self) -> bool {
        self.report_type == "rt"
    }

    pub fn is_template(&self) -> bool {
        self.id.contains(TEMPLATE_TOKEN)
    }

    pub fn cast(&self, raw: &str) -> QueryResult<Value> {
        self.caster.cast(&self.id, raw)
    }

    /// Hydrate one metadata entry, expanding templated families into one
    /// concrete column per index.
    pub fn from_metadata(raw: &RawColumnMetadata, defaults: (u32, u32)) -> QueryResult<Vec<Self>> {
        let attrs = &raw.attributes;
        let kind: ColumnKind = attrs.column_type.parse()?;
        let data_type = DataType::from(attrs.data_type.as_str());
        let ui_name = attrs.ui_name.clone().unwrap_or_else(|| raw.id.clone());

        let mut base = Column::new(raw.id.clone(), kind, data_type);
        base.name = ui_name.clone();
        base.group = attrs.group.clone();
        base.description = attrs.description.clone();
        base.deprecated = attrs.status.as_deref() == Some("DEPRECATED");
        base.allowed_in_segments = attrs.allowed_in_segments.is_some();

        if !base.is_template() {
            return Ok(vec![base]);
        }

        let min = attrs.min_template_index.unwrap_or(defaults.0);
        let max = attrs.max_template_index.unwrap_or(defaults.1);
        if min > max {
            return Err(QueryError::Integrity(format!(
                "template range {min}..{max} of {} is empty",
                raw.id
            )));
        }
        Ok((min..=max)
            .map(|i| {
                let index = i.to_string();
                let mut column = Column::new(
                    raw.id.replace(TEMPLATE_TOKEN, &index),
                    base.kind,
                    base.data_type.clone(),
                );
                column.name = ui_name.replace(TEMPLATE_TOKEN, &index);
                column.group = base.group.clone();
                column.description = base.description.clone();
                column.deprecated = base.deprecated;
                column.allowed_in_segments = base.allowed_in_segments;
                column.index = Some(i);
                column
            })
            .collect())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// One entry of the column metadata listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawColumnMetadata {
    pub id: String,
    pub attributes: RawColumnAttributes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawColumnAttributes {
    pub data_type: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub ui_name: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub allowed_in_segments: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "de_opt_index")]
    pub min_template_index: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_index")]
    pub max_template_index: Option<u32>,
}

/// The metadata API reports template bounds as strings; accept numbers too.
fn de_opt_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("template index out of range")),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid template index: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(json: serde_json::Value) -> RawColumnMetadata {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn snakify_camel_case() {
        assert_eq!(snakify("pageviews"), "pageviews");
        assert_eq!(snakify("userType"), "user_type");
        assert_eq!(snakify("dateHour"), "date_hour");
        assert_eq!(snakify("customVarName1"), "custom_var_name1");
        assert_eq!(snakify("adwordsCampaignID"), "adwords_campaign_id");
    }

    #[test]
    fn new_splits_namespace_and_index() {
        let c = Column::new("ga:dimension12", ColumnKind::Dimension, DataType::String);
        assert_eq!(c.report_type, "ga");
        assert_eq!(c.slug, "dimension12");
        assert_eq!(c.index, Some(12));
        assert!(c.is_core());
        assert!(!c.is_realtime());
    }

    #[test]
    fn casters_follow_data_type_table() {
        let cases = [
            ("STRING", Caster::Text),
            ("INTEGER", Caster::Integer),
            ("FLOAT", Caster::Float),
            ("PERCENT", Caster::Float),
            ("TIME", Caster::Float),
            ("CURRENCY", Caster::Float),
            ("WEIRD", Caster::Text),
        ];
        for (data_type, expected) in cases {
            assert_eq!(
                Caster::for_column("x", &DataType::from(data_type)),
                expected,
                "{data_type}"
            );
        }
        assert_eq!(Caster::for_column("date", &DataType::String), Caster::Date);
        assert_eq!(
            Caster::for_column("dateHour", &DataType::String),
            Caster::DateHour
        );
    }

    #[test]
    fn cast_integer_and_dates() {
        assert_eq!(
            Caster::Integer.cast("ga:pageviews", "42").unwrap(),
            Value::Integer(42)
        );
        let date = Caster::Date.cast("ga:date", "20140701").unwrap();
        assert_eq!(
            date,
            Value::Date(NaiveDate::from_ymd_opt(2014, 7, 1).unwrap())
        );
        let hour = Caster::DateHour.cast("ga:dateHour", "2014070113").unwrap();
        assert_eq!(
            hour,
            Value::DateHour(
                NaiveDate::from_ymd_opt(2014, 7, 1)
                    .unwrap()
                    .and_hms_opt(13, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn cast_failures_name_the_column() {
        let err = Caster::Integer.cast("ga:pageviews", "lots").unwrap_err();
        assert!(matches!(err, QueryError::Cast { ref column, .. } if column == "ga:pageviews"));
        assert!(Caster::Date.cast("ga:date", "2014-07-01").is_err());
        assert!(Caster::DateHour.cast("ga:dateHour", "2014070125").is_err());
    }

    #[test]
    fn from_metadata_plain_column() {
        let raw = metadata(serde_json::json!({
            "id": "ga:pageviews",
            "attributes": {
                "type": "METRIC",
                "dataType": "INTEGER",
                "uiName": "Pageviews",
                "group": "Page Tracking",
                "status": "PUBLIC",
                "allowedInSegments": "true"
            }
        }));
        let columns = Column::from_metadata(&raw, (1, 20)).unwrap();
        assert_eq!(columns.len(), 1);
        let c = &columns[0];
        assert_eq!(c.name, "Pageviews");
        assert!(c.is_metric());
        assert!(c.allowed_in_segments);
        assert!(!c.deprecated);
        assert_eq!(c.caster, Caster::Integer);
    }

    #[test]
    fn from_metadata_expands_templates() {
        let raw = metadata(serde_json::json!({
            "id": "ga:customVarNameXX",
            "attributes": {
                "type": "DIMENSION",
                "dataType": "STRING",
                "uiName": "Custom Variable (Key XX)",
                "status": "DEPRECATED",
                "minTemplateIndex": "1",
                "maxTemplateIndex": 5
            }
        }));
        let columns = Column::from_metadata(&raw, (1, 20)).unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].id, "ga:customVarName1");
        assert_eq!(columns[4].name, "Custom Variable (Key 5)");
        assert_eq!(columns[4].index, Some(5));
        assert!(columns.iter().all(|c| c.deprecated && !c.allowed_in_segments));
    }

    #[test]
    fn from_metadata_template_defaults() {
        let raw = metadata(serde_json::json!({
            "id": "ga:goalXXCompletions",
            "attributes": {"type": "METRIC", "dataType": "INTEGER", "uiName": "Goal XX Completions"}
        }));
        let columns = Column::from_metadata(&raw, (1, 20)).unwrap();
        assert_eq!(columns.len(), 20);
        assert_eq!(columns[19].id, "ga:goal20Completions");
    }
}
