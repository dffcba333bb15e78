//! The reporting scope a caller starts every query from.
//!
//! A [`ReportingApi`] binds one profile to its column and segment
//! registries, a transport and the client configuration. Each call to
//! [`query`](ReportingApi::query) or [`realtime`](ReportingApi::realtime)
//! starts a new lineage with its own throttle; every query refined from it
//! shares that throttle.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::columns::{ColumnRegistry, RawColumnMetadata, RawSegment, SegmentRegistry};
use crate::config::ClientConfig;
use crate::error::{QueryError, QueryResult};
use crate::query::{CoreQuery, QueryContext, QueryCore, RealtimeQuery};
use crate::throttle::{Clock, SystemClock, Throttle};
use crate::transport::{Endpoint, Transport, TransportError};

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Where column and segment listings come from.
pub trait MetadataSource: Send + Sync {
    /// Column metadata for one report type (`ga` or `rt`).
    fn list_columns(&self, report_type: &str) -> Result<Vec<RawColumnMetadata>, TransportError>;

    fn list_segments(&self) -> Result<Vec<RawSegment>, TransportError>;
}

/// Metadata held in memory, usually read from a JSON file shaped like the
/// metadata API response: `{"items": [...], "segments": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticMetadata {
    #[serde(default)]
    pub items: Vec<RawColumnMetadata>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
}

impl StaticMetadata {
    pub fn from_path(path: &Path) -> QueryResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| QueryError::Config(format!("parsing {}: {e}", path.display())))
    }
}

impl MetadataSource for StaticMetadata {
    fn list_columns(&self, report_type: &str) -> Result<Vec<RawColumnMetadata>, TransportError> {
        let prefix = format!("{report_type}:");
        Ok(self
            .items
            .iter()
            .filter(|item| item.id.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn list_segments(&self) -> Result<Vec<RawSegment>, TransportError> {
        Ok(self.segments.clone())
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

pub struct ReportingApi {
    core: Arc<QueryContext>,
    realtime: Arc<QueryContext>,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ReportingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingApi")
            .field("profile_id", &self.core.profile_id)
            .field("columns", &self.core.registry.len())
            .field("realtime_columns", &self.realtime.registry.len())
            .field("segments", &self.core.segments.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ReportingApi {
    pub fn new(
        profile_id: impl Into<String>,
        columns: ColumnRegistry,
        realtime_columns: ColumnRegistry,
        segments: SegmentRegistry,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Self {
        let profile_id = profile_id.into();
        let segments = Arc::new(segments);
        let context = |registry: ColumnRegistry| {
            Arc::new(QueryContext {
                profile_id: profile_id.clone(),
                registry: Arc::new(registry),
                segments: Arc::clone(&segments),
                transport: Arc::clone(&transport),
                page_size: config.page_size,
            })
        };
        let core = context(columns);
        let realtime = context(realtime_columns);
        Self {
            core,
            realtime,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build both registries and the segment list from a metadata source.
    pub fn from_metadata(
        profile_id: impl Into<String>,
        source: &dyn MetadataSource,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> QueryResult<Self> {
        let range = (config.template_min_index, config.template_max_index);
        let columns = ColumnRegistry::from_metadata(&source.list_columns("ga")?, range)?;
        let realtime = ColumnRegistry::from_metadata(&source.list_columns("rt")?, range)?;
        let segments = SegmentRegistry::from_raw(&source.list_segments()?);
        debug!(
            columns = columns.len(),
            realtime_columns = realtime.len(),
            segments = segments.len(),
            "loaded metadata"
        );
        Ok(Self::new(profile_id, columns, realtime, segments, transport, config))
    }

    /// Replace the clock new throttles are created with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn throttle(&self) -> Arc<Throttle> {
        Arc::new(Throttle::with_clock(
            self.config.throttle_interval(),
            Arc::clone(&self.clock),
        ))
    }

    /// A fresh core query with its own throttle.
    pub fn query(&self) -> CoreQuery {
        CoreQuery::new(QueryCore::new(
            Arc::clone(&self.core),
            self.throttle(),
            Endpoint::Core,
        ))
    }

    /// A fresh realtime query with its own throttle.
    pub fn realtime(&self) -> RealtimeQuery {
        RealtimeQuery::new(QueryCore::new(
            Arc::clone(&self.realtime),
            self.throttle(),
            Endpoint::Realtime,
        ))
    }

    pub fn profile_id(&self) -> &str {
        &self.core.profile_id
    }

    pub fn columns(&self) -> &ColumnRegistry {
        &self.core.registry
    }

    pub fn realtime_columns(&self) -> &ColumnRegistry {
        &self.realtime.registry
    }

    pub fn segments(&self) -> &SegmentRegistry {
        &self.core.segments
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
