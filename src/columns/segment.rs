//! Stored segments and the `Addressable` tagged type shared with columns.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::column::{Column, snakify};

/// One entry of the segment listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSegment {
    pub segment_id: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub definition: String,
}

/// A named, reusable row-filtering condition over users or sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// `gaid::-1`
    pub id: String,
    pub report_type: String,
    pub slug: String,
    pub snake_slug: String,
    pub name: String,
    /// `builtin` or `custom`, lowercased.
    pub kind: String,
    pub definition: String,
}

impl Segment {
    pub fn from_raw(raw: &RawSegment) -> Self {
        let (report_type, slug) = match raw.segment_id.split_once("::") {
            Some((prefix, slug)) => (prefix.to_string(), slug.to_string()),
            None => (String::new(), raw.segment_id.clone()),
        };
        Self {
            id: raw.segment_id.clone(),
            report_type,
            snake_slug: snakify(&raw.name).replace(' ', "_"),
            slug,
            name: raw.name.clone(),
            kind: raw.kind.to_ascii_lowercase(),
            definition: raw.definition.clone(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind.as_str(), "builtin" | "built_in")
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Anything a query can point at by id: a schema column or a stored segment.
#[derive(Clone, Debug, PartialEq)]
pub enum Addressable {
    Column(Arc<Column>),
    Segment(Arc<Segment>),
}

impl Addressable {
    pub fn id(&self) -> &str {
        match self {
            Self::Column(c) => &c.id,
            Self::Segment(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Column(c) => &c.name,
            Self::Segment(s) => &s.name,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Self::Column(c) => &c.slug,
            Self::Segment(s) => &s.slug,
        }
    }

    pub fn snake_slug(&self) -> &str {
        match self {
            Self::Column(c) => &c.snake_slug,
            Self::Segment(s) => &s.snake_slug,
        }
    }

    /// Every alias this entry answers to, most specific first.
    pub fn aliases(&self) -> [&str; 4] {
        [self.id(), self.name(), self.slug(), self.snake_slug()]
    }

    pub fn is_deprecated(&self) -> bool {
        match self {
            Self::Column(c) => c.deprecated,
            Self::Segment(_) => false,
        }
    }

    pub fn as_column(&self) -> Option<&Arc<Column>> {
        match self {
            Self::Column(c) => Some(c),
            Self::Segment(_) => None,
        }
    }

    pub fn as_segment(&self) -> Option<&Arc<Segment>> {
        match self {
            Self::Segment(s) => Some(s),
            Self::Column(_) => None,
        }
    }
}

impl From<Arc<Column>> for Addressable {
    fn from(c: Arc<Column>) -> Self {
        Self::Column(c)
    }
}

impl From<&Arc<Column>> for Addressable {
    fn from(c: &Arc<Column>) -> Self {
        Self::Column(Arc::clone(c))
    }
}

impl From<Arc<Segment>> for Addressable {
    fn from(s: Arc<Segment>) -> Self {
        Self::Segment(s)
    }
}

impl From<&Arc<Segment>> for Addressable {
    fn from(s: &Arc<Segment>) -> Self {
        Self::Segment(Arc::clone(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{ColumnKind, DataType};

    fn direct_traffic() -> Segment {
        Segment::from_raw(&RawSegment {
            segment_id: "gaid::-7".into(),
            name: "Direct Traffic".into(),
            kind: "BUILT_IN".into(),
            definition: "sessions::condition::ga:medium==(none)".into(),
        })
    }

    #[test]
    fn segment_from_raw_splits_id() {
        let s = direct_traffic();
        assert_eq!(s.report_type, "gaid");
        assert_eq!(s.slug, "-7");
        assert_eq!(s.kind, "built_in");
        assert_eq!(s.snake_slug, "direct_traffic");
    }

    #[test]
    fn addressable_shares_identity_accessors() {
        let column = Arc::new(
            Column::new("ga:userType", ColumnKind::Dimension, DataType::String)
                .with_name("User Type"),
        );
        let a = Addressable::from(&column);
        assert_eq!(a.aliases(), ["ga:userType", "User Type", "userType", "user_type"]);
        assert!(a.as_column().is_some());

        let s = Addressable::from(Arc::new(direct_traffic()));
        assert_eq!(s.id(), "gaid::-7");
        assert_eq!(s.name(), "Direct Traffic");
        assert!(!s.is_deprecated());
        assert!(s.as_segment().is_some());
    }
}
