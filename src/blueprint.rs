//! YAML query collections.
//!
//! ```yaml
//! scope:
//!   account: 12345
//!   profile: 67890
//! identity: marketing
//! defaults:
//!   type: core
//!   range: {start: 2014-01-01, days: 31}
//! queries:
//!   Pageviews by day:
//!     metrics: pageviews
//!     daily: {start: 2014-01-01, days: 31}
//!   Sessions by medium:
//!     query: [[sessions], [medium]]
//! ```
//!
//! `scope` and `identity` are carried along for the caller, who resolves the
//! profile and credentials; the crate itself only consumes `defaults` and
//! `queries`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::api::ReportingApi;
use crate::error::{QueryError, QueryResult};
use crate::query::{AnyQuery, describe, refine};

/// Who runs a blueprint: a bare name or a map of credential hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Name(String),
    Fields(BTreeMap<String, String>),
}

impl Identity {
    /// The map form; a bare name becomes `{identity: name}`.
    pub fn fields(&self) -> BTreeMap<String, String> {
        match self {
            Self::Name(name) => BTreeMap::from([("identity".to_string(), name.clone())]),
            Self::Fields(fields) => fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub scope: Map<String, Json>,
    #[serde(default)]
    pub defaults: Map<String, Json>,
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Title to description, in document order.
    #[serde(default)]
    pub queries: Map<String, Json>,
}

impl Blueprint {
    pub fn parse(yaml: &str) -> QueryResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| QueryError::Config(format!("invalid blueprint: {e}")))
    }

    pub fn from_path(path: &Path) -> QueryResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    /// The profile named by `scope`, if any.
    pub fn profile(&self) -> Option<String> {
        match self.scope.get("profile")? {
            Json::String(s) => Some(s.clone()),
            Json::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    /// Every query of the blueprint: `defaults` refined by each description,
    /// titled by its key.
    pub fn queries(&self, api: &ReportingApi) -> QueryResult<Vec<AnyQuery>> {
        let base = describe(api, &Json::Object(self.defaults.clone()))?;
        self.queries
            .iter()
            .map(|(title, description)| {
                let description = match description {
                    Json::Null => Json::Object(Map::new()),
                    other => other.clone(),
                };
                Ok(refine(&base, &description)?.with_title(title.as_str()))
            })
            .collect()
    }

    /// One query by title.
    pub fn query(&self, api: &ReportingApi, title: &str) -> QueryResult<AnyQuery> {
        let position = self.queries.keys().position(|t| t == title).ok_or_else(|| {
            QueryError::InvalidRequest(format!(
                "no query titled '{title}'; blueprint has: {}",
                itertools::join(self.titles(), ", ")
            ))
        })?;
        let mut queries = self.queries(api)?;
        Ok(queries.swap_remove(position))
    }
}
