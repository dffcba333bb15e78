//! The raw parameter map behind every query.

use std::collections::BTreeMap;

use crate::error::{QueryError, QueryResult};

/// Wire parameters of a query. Column references are always fully
/// qualified ids here, never human names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    /// `ga:<profile id>`
    pub ids: String,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sampling_level: Option<String>,
    pub sort: Vec<String>,
    pub filters: Option<String>,
    pub segment: Option<String>,
    /// 1-indexed.
    pub start_index: Option<u32>,
    pub max_results: Option<u32>,
    /// Keys set through `set` that have no dedicated field.
    pub extra: BTreeMap<String, String>,
}

impl Params {
    pub fn new(ids: impl Into<String>) -> Self {
        Self {
            ids: ids.into(),
            ..Self::default()
        }
    }

    /// Assign a raw key. Known keys land in their typed field.
    pub fn set(&mut self, key: &str, value: String) -> QueryResult<()> {
        match key {
            "ids" => self.ids = value,
            "metrics" => self.metrics = split_list(&value),
            "dimensions" => self.dimensions = split_list(&value),
            "start_date" => self.start_date = Some(value),
            "end_date" => self.end_date = Some(value),
            "samplingLevel" => self.sampling_level = Some(value),
            "sort" => self.sort = split_list(&value),
            "filters" => self.filters = Some(value),
            "segment" => self.segment = Some(value),
            "start_index" => self.start_index = Some(parse_count(key, &value)?),
            "max_results" => self.max_results = Some(parse_count(key, &value)?),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// AND a clause onto an accumulating expression.
    pub(crate) fn and_filter(&mut self, clause: String) {
        self.filters = Some(and_join(self.filters.take(), clause));
    }

    pub(crate) fn and_segment(&mut self, clause: String) {
        self.segment = Some(and_join(self.segment.take(), clause));
    }

    /// Move the cursor one page forward.
    pub fn advance(&mut self, default_page_size: u32) {
        let step = self.max_results.unwrap_or(default_page_size);
        self.start_index = Some(self.start_index.unwrap_or(1) + step);
    }
}

fn and_join(existing: Option<String>, clause: String) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{existing};{clause}"),
        _ => clause,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_count(key: &str, value: &str) -> QueryResult<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        QueryError::InvalidRequest(format!("{key} should be a positive integer, got '{value}'"))
    })
}
