//! Wire requests and their deterministic signatures.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value as Json};

use super::params::Params;
use crate::expr::{AND, split_unescaped};
use crate::transport::Endpoint;

/// Keys whose values are `;`-joined AND-clauses with no meaningful order.
const COMMUTATIVE_KEYS: [&str; 2] = ["filters", "segment"];

/// The serialized form of a query, exactly as it goes over the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
    endpoint: Endpoint,
    body: Map<String, Json>,
}

impl WireRequest {
    pub(crate) fn from_params(endpoint: Endpoint, params: &Params) -> Self {
        let mut body = Map::new();
        body.insert("ids".into(), Json::String(params.ids.clone()));
        body.insert("metrics".into(), Json::String(params.metrics.join(",")));
        body.insert(
            "dimensions".into(),
            if params.dimensions.is_empty() {
                Json::Null
            } else {
                Json::String(params.dimensions.join(","))
            },
        );
        let optional = [
            ("start_date", &params.start_date),
            ("end_date", &params.end_date),
            ("samplingLevel", &params.sampling_level),
            ("filters", &params.filters),
            ("segment", &params.segment),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body.insert(key.into(), Json::String(value.clone()));
            }
        }
        if !params.sort.is_empty() {
            body.insert("sort".into(), Json::String(params.sort.join(",")));
        }
        if let Some(start) = params.start_index {
            body.insert("start_index".into(), Json::from(start));
        }
        if let Some(max) = params.max_results {
            body.insert("max_results".into(), Json::from(max));
        }
        for (key, value) in &params.extra {
            body.insert(key.clone(), Json::String(value.clone()));
        }
        Self { endpoint, body }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.body.get(key)
    }

    /// String view of a key; numbers are rendered, null is absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.body.get(key)? {
            Json::Null => None,
            Json::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_json(&self) -> Json {
        Json::Object(self.body.clone())
    }

    /// Flat parameters for the transport; null values are omitted.
    pub fn to_params(&self) -> BTreeMap<String, String> {
        self.body
            .keys()
            .filter_map(|key| self.get_str(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// blake3 of the endpoint and the canonical JSON form: keys sorted,
    /// AND-clauses of filters and segments sorted.
    pub fn signature(&self) -> String {
        let canonical: BTreeMap<&str, Json> = self
            .body
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Json::String(s) if COMMUTATIVE_KEYS.contains(&key.as_str()) => {
                        let mut clauses = split_unescaped(s, AND);
                        clauses.sort_unstable();
                        Json::String(clauses.join(";"))
                    }
                    other => other.clone(),
                };
                (key.as_str(), value)
            })
            .collect();
        let encoded = serde_json::to_string(&canonical).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.endpoint.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(encoded.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// The signature, but only when both date bounds are absolute: a
    /// relative window means different data every day.
    pub fn cache_key(&self) -> Option<String> {
        let absolute = |key: &str| {
            self.get_str(key)
                .is_some_and(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").is_ok())
        };
        (absolute("start_date") && absolute("end_date")).then(|| self.signature())
    }

    /// Padded `key\tvalue` listing, used in error messages.
    pub fn dump(&self) -> String {
        let params = self.to_params();
        let width = params.keys().map(String::len).max().unwrap_or(0);
        params
            .iter()
            .map(|(key, value)| format!("{key:<width$}\t{value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        let mut p = Params::new("ga:1234");
        p.metrics = vec!["ga:pageviews".into()];
        p
    }

    #[test]
    fn empty_dimensions_serialize_as_null() {
        let wire = WireRequest::from_params(Endpoint::Core, &params());
        assert_eq!(wire.get("dimensions"), Some(&Json::Null));
        assert!(!wire.to_params().contains_key("dimensions"));
        assert_eq!(wire.to_params()["metrics"], "ga:pageviews");
    }

    #[test]
    fn signature_ignores_and_clause_order() {
        let mut a = params();
        a.filters = Some("ga:a==1;ga:b==2".into());
        let mut b = params();
        b.filters = Some("ga:b==2;ga:a==1".into());
        let mut c = params();
        c.filters = Some("ga:a==1,ga:b==2".into());
        let sig = |p: &Params| WireRequest::from_params(Endpoint::Core, p).signature();
        assert_eq!(sig(&a), sig(&b));
        assert_ne!(sig(&a), sig(&c));
        assert_eq!(sig(&a).len(), 64);
    }

    #[test]
    fn signature_depends_on_the_endpoint() {
        let core = WireRequest::from_params(Endpoint::Core, &params());
        let realtime = WireRequest::from_params(Endpoint::Realtime, &params());
        assert_eq!(core.to_params(), realtime.to_params());
        assert_ne!(core.signature(), realtime.signature());
    }

    #[test]
    fn cache_key_needs_absolute_dates() {
        let mut p = params();
        assert!(WireRequest::from_params(Endpoint::Core, &p).cache_key().is_none());
        p.start_date = Some("2014-01-01".into());
        p.end_date = Some("yesterday".into());
        assert!(WireRequest::from_params(Endpoint::Core, &p).cache_key().is_none());
        p.end_date = Some("2014-01-31".into());
        let wire = WireRequest::from_params(Endpoint::Core, &p);
        assert_eq!(wire.cache_key(), Some(wire.signature()));
    }

    #[test]
    fn dump_pads_keys() {
        let mut p = params();
        p.max_results = Some(10);
        let dump = WireRequest::from_params(Endpoint::Core, &p).dump();
        assert!(dump.contains("ids        \tga:1234"));
        assert!(dump.contains("max_results\t10"));
    }
}
