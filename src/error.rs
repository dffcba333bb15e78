//! Error taxonomy shared by every layer of the query pipeline.
//!
//! Local validation errors are raised synchronously by the builder before any
//! network round-trip; remote errors come back from the transport and are
//! propagated as-is (no retry happens in this crate).

use thiserror::Error;

/// Errors produced while building, executing or reading a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Malformed or rejected request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authorization or permission failure reported by the remote side.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// Quota or rate limit reported by the remote side.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Remote backend failure.
    #[error("server error: {0}")]
    Server(String),

    #[error("unknown column '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownColumn {
        name: String,
        suggestion: Option<String>,
    },

    #[error("column '{column}' is a {actual}, expected a {expected}")]
    ColumnType {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("operator '{0}' has no logical inversion and cannot be excluded")]
    UnsupportedInversion(String),

    #[error("a date range cannot be defined using stop alongside months or days")]
    AmbiguousRange,

    #[error("ambiguous accessor: {0}")]
    AmbiguousAccessor(String),

    #[error("invalid granularity '{given}', should be one of: {options}")]
    InvalidGranularity { given: String, options: String },

    #[error("invalid precision '{given}', should be one of: {options}")]
    InvalidPrecision { given: String, options: String },

    #[error("{0} requires a key and value, a map of properties or a selection")]
    MissingArguments(&'static str),

    #[error("cannot cast '{value}' for column {column}: {reason}")]
    Cast {
        column: String,
        value: String,
        reason: String,
    },

    #[error("page {page} returned headers [{found}], expected [{expected}]")]
    HeaderMismatch {
        page: usize,
        expected: String,
        found: String,
    },

    #[error("data integrity: {0}")]
    Integrity(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

impl QueryError {
    /// The error kind name, stable across releases and used in robot output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotPermitted(_) => "not_permitted",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::Server(_) => "server_error",
            Self::UnknownColumn { .. } => "unknown_column",
            Self::ColumnType { .. } => "column_type",
            Self::UnsupportedInversion(_) => "unsupported_inversion",
            Self::AmbiguousRange => "ambiguous_range",
            Self::AmbiguousAccessor(_) => "ambiguous_accessor",
            Self::InvalidGranularity { .. } => "invalid_granularity",
            Self::InvalidPrecision { .. } => "invalid_precision",
            Self::MissingArguments(_) => "missing_arguments",
            Self::Cast { .. } => "cast",
            Self::HeaderMismatch { .. } => "header_mismatch",
            Self::Integrity(_) => "integrity",
            Self::Config(_) => "config",
        }
    }

    /// True for errors detected without talking to the remote API.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            Self::NotPermitted(_) | Self::LimitExceeded(_) | Self::Server(_)
        )
    }

    pub(crate) fn unknown_column(name: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::UnknownColumn {
            name: name.into(),
            suggestion,
        }
    }
}

/// Convenience alias.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_column_mentions_suggestion() {
        let err = QueryError::unknown_column("pagevews", Some("pageviews".into()));
        assert_eq!(
            err.to_string(),
            "unknown column 'pagevews' (did you mean 'pageviews'?)"
        );
        let bare = QueryError::unknown_column("zzz", None);
        assert_eq!(bare.to_string(), "unknown column 'zzz'");
    }

    #[test]
    fn remote_errors_are_not_local() {
        assert!(!QueryError::Server("backend".into()).is_local());
        assert!(!QueryError::LimitExceeded("quota".into()).is_local());
        assert!(QueryError::AmbiguousRange.is_local());
        assert!(QueryError::InvalidRequest("x".into()).is_local());
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(QueryError::AmbiguousRange.kind(), "ambiguous_range");
        assert_eq!(
            QueryError::UnsupportedInversion("between".into()).kind(),
            "unsupported_inversion"
        );
    }
}
