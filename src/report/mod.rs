//! Typed, columnar reports assembled from one or more response pages.
//!
//! - [`value`] - the typed cell values produced by column casters
//! - [`export`] - records, CSV and fixed-width table renderings

pub mod export;
pub mod value;

use std::collections::BTreeMap;
use std::ops::Index;
use std::sync::Arc;

use crate::columns::{Column, ColumnKind, ColumnRef, ColumnRegistry, DataType};
use crate::error::{QueryError, QueryResult};
use crate::transport::{ColumnHeader, RawPage};

pub use export::Envelope;
pub use value::Value;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Header projection shared by every row of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    columns: Vec<Arc<Column>>,
}

impl RowShape {
    pub fn new(columns: Vec<Arc<Column>>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a header by id, name, slug or snake slug.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| {
            [&c.id, &c.name, &c.slug, &c.snake_slug]
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(key))
        })
    }

    fn position_of(&self, column: impl Into<ColumnRef>) -> QueryResult<usize> {
        match column.into() {
            ColumnRef::Column(c) => self
                .columns
                .iter()
                .position(|h| h.id == c.id)
                .ok_or_else(|| QueryError::unknown_column(&c.id, None)),
            ColumnRef::Name(name) => self
                .position(&name)
                .ok_or_else(|| QueryError::unknown_column(&name, None)),
        }
    }
}

/// One typed result row; fields follow header order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    shape: Arc<RowShape>,
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field by header alias (`pageviews`, `ga:pageviews`, `user_type`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.shape.position(key).map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Column>, &Value)> {
        self.shape.columns.iter().zip(&self.values)
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, i: usize) -> &Value {
        &self.values[i]
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Rows and totals of one logical query, possibly spanning several pages.
#[derive(Debug, Clone, Default)]
pub struct Report {
    shape: Option<Arc<RowShape>>,
    rows: Vec<Row>,
    totals: Vec<(Arc<Column>, Value)>,
    complete: bool,
    queries: Vec<BTreeMap<String, String>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw page into the report.
    ///
    /// The first page fixes the headers; later pages must repeat them. Every
    /// row is cast column by column and totals are replaced by the page's.
    pub fn append(
        &mut self,
        page: &RawPage,
        registry: &ColumnRegistry,
        request: BTreeMap<String, String>,
    ) -> QueryResult<()> {
        let page_no = self.queries.len() + 1;
        let shape = match &self.shape {
            Some(shape) => {
                let expected: Vec<&str> = shape.columns.iter().map(|c| c.id.as_str()).collect();
                let found: Vec<&str> = page.column_headers.iter().map(|h| h.name.as_str()).collect();
                if expected != found {
                    return Err(QueryError::HeaderMismatch {
                        page: page_no,
                        expected: expected.join(", "),
                        found: found.join(", "),
                    });
                }
                Arc::clone(shape)
            }
            None => {
                let columns = page
                    .column_headers
                    .iter()
                    .map(|h| header_column(h, registry))
                    .collect::<QueryResult<Vec<_>>>()?;
                let shape = Arc::new(RowShape::new(columns));
                self.shape = Some(Arc::clone(&shape));
                shape
            }
        };

        let mut rows = Vec::with_capacity(page.row_count());
        for (n, raw) in page.rows.iter().flatten().enumerate() {
            if raw.len() != shape.len() {
                return Err(QueryError::Integrity(format!(
                    "row {} of page {page_no} has {} fields for {} headers",
                    n + 1,
                    raw.len(),
                    shape.len()
                )));
            }
            let values = shape
                .columns
                .iter()
                .zip(raw)
                .map(|(column, field)| column.cast(field))
                .collect::<QueryResult<Vec<_>>>()?;
            rows.push(Row {
                shape: Arc::clone(&shape),
                values,
            });
        }

        let mut totals = Vec::with_capacity(page.totals_for_all_results.len());
        for column in &shape.columns {
            if let Some(raw) = page.totals_for_all_results.get(&column.id) {
                totals.push((Arc::clone(column), column.cast(raw)?));
            }
        }

        self.rows.extend(rows);
        self.totals = totals;
        self.complete = !page.has_next();
        self.queries.push(request);
        Ok(())
    }

    /// Drop rows past `limit`.
    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    pub(crate) fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    pub fn headers(&self) -> &[Arc<Column>] {
        self.shape.as_deref().map_or(&[][..], RowShape::columns)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.headers().iter().filter(|c| c.is_metric())
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.headers().iter().filter(|c| c.is_dimension())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&Row> {
        self.rows.last()
    }

    /// False while the remote side announced more pages than were fetched.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Wire parameters of every page fetched, in order.
    pub fn queries(&self) -> &[BTreeMap<String, String>] {
        &self.queries
    }

    /// Header position; a report without headers knows no columns.
    fn position_of(&self, column: impl Into<ColumnRef>) -> QueryResult<usize> {
        match &self.shape {
            Some(shape) => shape.position_of(column),
            None => Err(QueryError::unknown_column(ref_name(column.into()), None)),
        }
    }

    /// Every row's value for one header.
    pub fn column(&self, column: impl Into<ColumnRef>) -> QueryResult<Vec<&Value>> {
        let i = self.position_of(column)?;
        Ok(self.rows.iter().map(|row| &row.values[i]).collect())
    }

    /// Every row's value for the report's only metric.
    pub fn values(&self) -> QueryResult<Vec<&Value>> {
        let mut metrics = self.metrics();
        match (metrics.next(), metrics.next()) {
            (Some(metric), None) => self.column(metric),
            _ => Err(QueryError::AmbiguousAccessor(
                "report contains several metrics or none; use rows, first, last or a column name"
                    .into(),
            )),
        }
    }

    /// The single value of a one-metric, one-row report.
    pub fn value(&self) -> QueryResult<&Value> {
        let values = self.values()?;
        match values.as_slice() {
            [value] => Ok(value),
            _ => Err(QueryError::AmbiguousAccessor(format!(
                "report contains {} rows; use rows, first, last or a column name",
                values.len()
            ))),
        }
    }

    /// Totals of the last page merged, in header order.
    pub fn totals(&self) -> &[(Arc<Column>, Value)] {
        &self.totals
    }

    /// Total for one metric, or for the only metric when `column` is `None`.
    pub fn total(&self, column: Option<ColumnRef>) -> QueryResult<&Value> {
        match column {
            Some(column) => {
                let id = &self.headers()[self.position_of(column)?].id;
                self.totals
                    .iter()
                    .find(|(c, _)| &c.id == id)
                    .map(|(_, v)| v)
                    .ok_or_else(|| QueryError::unknown_column(id, None))
            }
            None => match self.totals.as_slice() {
                [(_, value)] => Ok(value),
                _ => Err(QueryError::AmbiguousAccessor(format!(
                    "report has {} totals; name a metric",
                    self.totals.len()
                ))),
            },
        }
    }
}

fn ref_name(column: ColumnRef) -> String {
    match column {
        ColumnRef::Column(c) => c.id.clone(),
        ColumnRef::Name(name) => name,
    }
}

/// Resolve a response header through the registry, falling back to the type
/// information the header itself carries.
fn header_column(header: &ColumnHeader, registry: &ColumnRegistry) -> QueryResult<Arc<Column>> {
    if let Some(column) = registry.get(&header.name) {
        return Ok(column);
    }
    match (&header.column_type, &header.data_type) {
        (Some(kind), Some(data_type)) => {
            let kind: ColumnKind = kind.parse()?;
            Ok(Arc::new(Column::new(
                header.name.clone(),
                kind,
                DataType::from(data_type.as_str()),
            )))
        }
        _ => Err(QueryError::unknown_column(&header.name, None)),
    }
}
