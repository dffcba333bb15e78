//! Case-insensitive lookup tables for columns and segments.
//!
//! Every entry answers to its id, human name, slug and snake slug. When an
//! alias is shared by several entries the winner is fixed: an exact id match,
//! then the first non-deprecated entry, then the first entry, in registry
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::column::{Column, ColumnKind, RawColumnMetadata};
use super::segment::{Addressable, RawSegment, Segment};
use crate::error::{QueryError, QueryResult};

const SUGGESTION_THRESHOLD: f64 = 0.85;

/// A column given either by reference or by any of its aliases.
#[derive(Clone, Debug)]
pub enum ColumnRef {
    Name(String),
    Column(Arc<Column>),
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(s: String) -> Self {
        Self::Name(s)
    }
}

impl From<&String> for ColumnRef {
    fn from(s: &String) -> Self {
        Self::Name(s.clone())
    }
}

impl From<Arc<Column>> for ColumnRef {
    fn from(c: Arc<Column>) -> Self {
        Self::Column(c)
    }
}

impl From<&Arc<Column>> for ColumnRef {
    fn from(c: &Arc<Column>) -> Self {
        Self::Column(Arc::clone(c))
    }
}

/// A segment given either by reference, by name or by id.
#[derive(Clone, Debug)]
pub enum SegmentRef {
    Name(String),
    Segment(Arc<Segment>),
}

impl From<&str> for SegmentRef {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<String> for SegmentRef {
    fn from(s: String) -> Self {
        Self::Name(s)
    }
}

impl From<Arc<Segment>> for SegmentRef {
    fn from(s: Arc<Segment>) -> Self {
        Self::Segment(s)
    }
}

impl From<&Arc<Segment>> for SegmentRef {
    fn from(s: &Arc<Segment>) -> Self {
        Self::Segment(Arc::clone(s))
    }
}

#[derive(Debug, Clone, Default)]
struct AliasIndex {
    keys: HashMap<String, Vec<usize>>,
}

impl AliasIndex {
    fn build<'a>(entries: impl Iterator<Item = [&'a str; 4]>) -> Self {
        let mut keys: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, aliases) in entries.enumerate() {
            for alias in aliases {
                if alias.is_empty() {
                    continue;
                }
                let slot = keys.entry(alias.to_lowercase()).or_default();
                if slot.last() != Some(&pos) {
                    slot.push(pos);
                }
            }
        }
        Self { keys }
    }

    fn candidates(&self, key: &str) -> &[usize] {
        self.keys
            .get(&key.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn suggest(&self, key: &str) -> Option<String> {
        let needle = key.to_lowercase();
        self.keys
            .keys()
            .map(|k| (strsim::jaro_winkler(&needle, k), k))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, k)| k.clone())
    }
}

fn pick(candidates: &[usize], key: &str, entries: &[Addressable]) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .find(|&i| entries[i].id().eq_ignore_ascii_case(key))
        .or_else(|| {
            candidates
                .iter()
                .copied()
                .find(|&i| !entries[i].is_deprecated())
        })
        .or_else(|| candidates.first().copied())
}

/// Ordered, read-only set of columns addressable by any alias.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    entries: Vec<Addressable>,
    columns: Vec<Arc<Column>>,
    index: AliasIndex,
}

impl ColumnRegistry {
    pub fn new(columns: impl IntoIterator<Item = Column>) -> QueryResult<Self> {
        Self::from_arcs(columns.into_iter().map(Arc::new).collect())
    }

    pub fn from_arcs(columns: Vec<Arc<Column>>) -> QueryResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.id.as_str()) {
                return Err(QueryError::Integrity(format!(
                    "duplicate column id {} in registry",
                    column.id
                )));
            }
        }
        let entries: Vec<Addressable> = columns.iter().map(Addressable::from).collect();
        let index = AliasIndex::build(entries.iter().map(Addressable::aliases));
        Ok(Self {
            entries,
            columns,
            index,
        })
    }

    /// Hydrate the metadata listing, expanding templated families with the
    /// given default `(min, max)` index range.
    pub fn from_metadata(raw: &[RawColumnMetadata], template_range: (u32, u32)) -> QueryResult<Self> {
        let mut columns = Vec::new();
        for entry in raw {
            columns.extend(Column::from_metadata(entry, template_range)?);
        }
        Self::new(columns)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns.iter()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Column>> {
        pick(self.index.candidates(key), key, &self.entries).map(|i| Arc::clone(&self.columns[i]))
    }

    pub fn contains(&self, key: &str) -> bool {
        !self.index.candidates(key).is_empty()
    }

    /// Resolve a column reference. References pass through untouched.
    pub fn resolve(&self, value: impl Into<ColumnRef>) -> QueryResult<Arc<Column>> {
        match value.into() {
            ColumnRef::Column(column) => Ok(column),
            ColumnRef::Name(name) => {
                let column = self
                    .get(&name)
                    .ok_or_else(|| QueryError::unknown_column(&name, self.index.suggest(&name)))?;
                if column.deprecated {
                    warn!(column = %column.id, alias = %name, "resolved a deprecated column");
                }
                Ok(column)
            }
        }
    }

    /// Vectorized [`resolve`](Self::resolve); with `required` set, every
    /// column must be of that kind.
    pub fn resolve_many<I, C>(&self, values: I, required: Option<ColumnKind>) -> QueryResult<Vec<Arc<Column>>>
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        values
            .into_iter()
            .map(|value| {
                let column = self.resolve(value)?;
                match required {
                    Some(kind) if column.kind != kind => Err(QueryError::ColumnType {
                        column: column.id.clone(),
                        expected: kind.to_string(),
                        actual: column.kind.to_string(),
                    }),
                    _ => Ok(column),
                }
            })
            .collect()
    }

    /// Column id for a reference. Greedy serialization requires the value to
    /// resolve; non-greedy passes unresolvable strings through as-is, which is
    /// what raw filter and segment expressions need.
    pub fn serialize(&self, value: impl Into<ColumnRef>, greedy: bool) -> QueryResult<String> {
        match value.into() {
            ColumnRef::Column(column) => Ok(column.id.clone()),
            ColumnRef::Name(name) if greedy => Ok(self.resolve(ColumnRef::Name(name))?.id.clone()),
            ColumnRef::Name(name) => Ok(self.get(&name).map(|c| c.id.clone()).unwrap_or(name)),
        }
    }

    /// A new registry holding the columns that satisfy `keep`.
    pub fn filtered(&self, keep: impl Fn(&Column) -> bool) -> Self {
        let kept = self.columns.iter().filter(|c| keep(c)).cloned().collect();
        // Subsets of a valid registry cannot introduce duplicates.
        Self::from_arcs(kept).unwrap_or_default()
    }

    pub fn metrics(&self) -> Self {
        self.filtered(Column::is_metric)
    }

    pub fn dimensions(&self) -> Self {
        self.filtered(Column::is_dimension)
    }

    pub fn supported(&self) -> Self {
        self.filtered(|c| !c.deprecated)
    }

    pub fn deprecated(&self) -> Self {
        self.filtered(|c| c.deprecated)
    }
}

/// Read-only set of stored segments addressable by id, name or slug.
#[derive(Debug, Clone, Default)]
pub struct SegmentRegistry {
    entries: Vec<Addressable>,
    segments: Vec<Arc<Segment>>,
    index: AliasIndex,
}

impl SegmentRegistry {
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let segments: Vec<Arc<Segment>> = segments.into_iter().map(Arc::new).collect();
        let entries: Vec<Addressable> = segments.iter().map(Addressable::from).collect();
        let index = AliasIndex::build(entries.iter().map(Addressable::aliases));
        Self {
            entries,
            segments,
            index,
        }
    }

    pub fn from_raw(raw: &[RawSegment]) -> Self {
        Self::new(raw.iter().map(Segment::from_raw))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.segments.iter()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Segment>> {
        pick(self.index.candidates(key), key, &self.entries).map(|i| Arc::clone(&self.segments[i]))
    }

    pub fn resolve(&self, value: impl Into<SegmentRef>) -> QueryResult<Arc<Segment>> {
        match value.into() {
            SegmentRef::Segment(segment) => Ok(segment),
            SegmentRef::Name(name) => self
                .get(&name)
                .ok_or_else(|| QueryError::unknown_column(&name, self.index.suggest(&name))),
        }
    }

    /// Segment id for a reference. Unknown strings that already look like a
    /// segment id (`gaid::-1`, `sessions::condition::...`) pass through.
    pub fn serialize(&self, value: impl Into<SegmentRef>) -> QueryResult<String> {
        match value.into() {
            SegmentRef::Segment(segment) => Ok(segment.id.clone()),
            SegmentRef::Name(name) => match self.get(&name) {
                Some(segment) => Ok(segment.id.clone()),
                None if name.contains("::") => Ok(name),
                None => Err(QueryError::unknown_column(&name, self.index.suggest(&name))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::DataType;

    fn registry() -> ColumnRegistry {
        ColumnRegistry::new([
            Column::new("ga:pageviews", ColumnKind::Metric, DataType::Integer)
                .with_name("Pageviews"),
            Column::new("ga:userType", ColumnKind::Dimension, DataType::String)
                .with_name("User Type"),
            Column::new("ga:visitors", ColumnKind::Metric, DataType::Integer)
                .with_name("Users")
                .deprecated(true),
            Column::new("ga:users", ColumnKind::Metric, DataType::Integer).with_name("Users"),
        ])
        .unwrap()
    }

    #[test]
    fn resolve_any_alias_case_insensitively() {
        let r = registry();
        for alias in ["pageviews", "Pageviews", "ga:pageviews", "GA:PAGEVIEWS"] {
            assert_eq!(r.resolve(alias).unwrap().id, "ga:pageviews", "{alias}");
        }
        for alias in ["user type", "usertype", "user_type", "ga:userType"] {
            assert_eq!(r.resolve(alias).unwrap().id, "ga:userType", "{alias}");
        }
    }

    #[test]
    fn shared_alias_prefers_supported_column() {
        let r = registry();
        assert_eq!(r.resolve("Users").unwrap().id, "ga:users");
        // Exact id still reaches the deprecated column.
        assert_eq!(r.resolve("ga:visitors").unwrap().id, "ga:visitors");
    }

    #[test]
    fn unknown_column_suggests_closest_alias() {
        let err = registry().resolve("pagevews").unwrap_err();
        match err {
            QueryError::UnknownColumn { name, suggestion } => {
                assert_eq!(name, "pagevews");
                assert_eq!(suggestion.as_deref(), Some("pageviews"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn resolve_many_checks_kind() {
        let r = registry();
        let ok = r
            .resolve_many(["pageviews", "users"], Some(ColumnKind::Metric))
            .unwrap();
        assert_eq!(ok.len(), 2);
        let err = r
            .resolve_many(["pageviews", "user type"], Some(ColumnKind::Metric))
            .unwrap_err();
        assert!(matches!(err, QueryError::ColumnType { .. }));
    }

    #[test]
    fn serialize_greedy_and_lenient() {
        let r = registry();
        assert_eq!(r.serialize("Pageviews", true).unwrap(), "ga:pageviews");
        assert!(r.serialize("ga:nope", true).is_err());
        assert_eq!(r.serialize("ga:nope", false).unwrap(), "ga:nope");
        assert_eq!(r.serialize("pageviews", false).unwrap(), "ga:pageviews");
        let column = r.resolve("users").unwrap();
        assert_eq!(r.serialize(&column, true).unwrap(), "ga:users");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let dup = ColumnRegistry::new([
            Column::new("ga:users", ColumnKind::Metric, DataType::Integer),
            Column::new("ga:users", ColumnKind::Metric, DataType::Integer),
        ]);
        assert!(matches!(dup, Err(QueryError::Integrity(_))));
    }

    #[test]
    fn set_style_views() {
        let r = registry();
        assert_eq!(r.metrics().len(), 3);
        assert_eq!(r.dimensions().len(), 1);
        assert_eq!(r.supported().len(), 3);
        assert_eq!(r.deprecated().len(), 1);
        assert!(r.supported().get("ga:visitors").is_none());
    }

    #[test]
    fn segment_registry_resolves_names_and_ids() {
        let segments = SegmentRegistry::from_raw(&[RawSegment {
            segment_id: "gaid::-7".into(),
            name: "Direct Traffic".into(),
            kind: "BUILT_IN".into(),
            definition: String::new(),
        }]);
        assert_eq!(segments.serialize("direct traffic").unwrap(), "gaid::-7");
        assert_eq!(segments.serialize("gaid::-7").unwrap(), "gaid::-7");
        assert_eq!(segments.serialize("gaid::-99").unwrap(), "gaid::-99");
        assert!(segments.serialize("Organic").is_err());
    }
}
