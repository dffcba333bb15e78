//! The remote-call seam.
//!
//! A [`Transport`] turns a flat parameter map into one raw response page.
//! Authorization, HTTP and retries live behind it; the query layer only sees
//! [`RawPage`] and [`TransportError`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::QueryError;

/// Which reporting API a query targets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    #[default]
    Core,
    Realtime,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Realtime => "realtime",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" | "ga" => Ok(Self::Core),
            "realtime" | "rt" => Ok(Self::Realtime),
            other => Err(QueryError::InvalidRequest(format!(
                "unknown query type '{other}', should be core or realtime"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One response page as returned by the reporting API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPage {
    pub column_headers: Vec<ColumnHeader>,
    /// Absent when the page holds no data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub totals_for_all_results: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
    /// Echo of the request, kept verbatim.
    #[serde(default)]
    pub query: serde_json::Value,
}

impl RawPage {
    pub fn has_next(&self) -> bool {
        self.has_next_page || self.next_link.is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    InvalidRequest,
    NotPermitted,
    LimitExceeded,
    Server,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Map an HTTP status from the reporting API onto an error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => TransportErrorKind::InvalidRequest,
            401 | 403 => TransportErrorKind::NotPermitted,
            429 => TransportErrorKind::LimitExceeded,
            _ => TransportErrorKind::Server,
        };
        Self::new(kind, message)
    }
}

impl From<TransportError> for QueryError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::InvalidRequest => QueryError::InvalidRequest(err.message),
            TransportErrorKind::NotPermitted => QueryError::NotPermitted(err.message),
            TransportErrorKind::LimitExceeded => QueryError::LimitExceeded(err.message),
            TransportErrorKind::Server => QueryError::Server(err.message),
        }
    }
}

/// Abstract remote endpoint. Implementations arrive already authorized.
pub trait Transport: Send + Sync {
    fn fetch(&self, endpoint: Endpoint, params: &BTreeMap<String, String>) -> Result<RawPage, TransportError>;
}

/// Serves recorded pages in order and remembers every request.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    responses: Mutex<VecDeque<Result<RawPage, TransportError>>>,
    requests: Mutex<Vec<(Endpoint, BTreeMap<String, String>)>>,
}

impl ReplayTransport {
    pub fn new(pages: impl IntoIterator<Item = RawPage>) -> Self {
        Self {
            responses: Mutex::new(pages.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Load a JSON array of pages (or a single page) from disk.
    pub fn from_path(path: &Path) -> Result<Self, QueryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("reading {}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| QueryError::Config(format!("parsing {}: {e}", path.display())))?;
        let pages: Vec<RawPage> = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value),
            single => serde_json::from_value(single).map(|page| vec![page]),
        }
        .map_err(|e| QueryError::Config(format!("parsing {}: {e}", path.display())))?;
        Ok(Self::new(pages))
    }

    pub fn push_page(&self, page: RawPage) {
        self.responses.lock().push_back(Ok(page));
    }

    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    pub fn requests(&self) -> Vec<(Endpoint, BTreeMap<String, String>)> {
        self.requests.lock().clone()
    }
}

impl Transport for ReplayTransport {
    fn fetch(&self, endpoint: Endpoint, params: &BTreeMap<String, String>) -> Result<RawPage, TransportError> {
        self.requests.lock().push((endpoint, params.clone()));
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::new(
                TransportErrorKind::Server,
                "no recorded page left to replay",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_page_deserializes_api_shape() {
        let page: RawPage = serde_json::from_value(serde_json::json!({
            "columnHeaders": [
                {"name": "ga:date", "columnType": "DIMENSION", "dataType": "STRING"},
                {"name": "ga:pageviews", "columnType": "METRIC", "dataType": "INTEGER"}
            ],
            "rows": [["20140701", "42"]],
            "totalsForAllResults": {"ga:pageviews": "42"},
            "nextLink": "https://example.invalid/next",
            "query": {"ids": "ga:1"}
        }))
        .unwrap();
        assert_eq!(page.column_headers.len(), 2);
        assert_eq!(page.row_count(), 1);
        assert!(page.has_next());
    }

    #[test]
    fn missing_rows_and_flags_default() {
        let page: RawPage = serde_json::from_value(serde_json::json!({
            "columnHeaders": [{"name": "ga:pageviews"}]
        }))
        .unwrap();
        assert_eq!(page.row_count(), 0);
        assert!(!page.has_next());
    }

    #[test]
    fn replay_serves_in_order_then_fails() {
        let transport = ReplayTransport::new([RawPage::default()]);
        transport.push_error(TransportError::from_status(403, "denied"));
        let params = BTreeMap::from([("ids".to_string(), "ga:1".to_string())]);
        assert!(transport.fetch(Endpoint::Core, &params).is_ok());
        let err = transport.fetch(Endpoint::Core, &params).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::NotPermitted);
        let err = transport.fetch(Endpoint::Realtime, &params).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Server);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.requests()[2].0, Endpoint::Realtime);
    }

    #[test]
    fn transport_errors_map_to_query_errors() {
        let err: QueryError = TransportError::from_status(429, "quota").into();
        assert_eq!(err, QueryError::LimitExceeded("quota".into()));
        assert!(!err.is_local());
    }
}
