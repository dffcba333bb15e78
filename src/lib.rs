//! Build analytics reporting queries, page through their results and read
//! them back as typed reports.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ga_report::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = StaticMetadata::from_path("metadata.json".as_ref())?;
//! let transport = Arc::new(ReplayTransport::from_path("pages.json".as_ref())?);
//! let api = ReportingApi::from_metadata("67890", &metadata, transport, ClientConfig::load()?)?;
//!
//! let report = api
//!     .query()
//!     .metrics(["pageviews"])?
//!     .daily(RangeSpec::new("2014-01-01").days(7))?
//!     .sort(["-pageviews"])?
//!     .get()?;
//! println!("{}", report.to_table(None));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod blueprint;
pub mod cache;
pub mod columns;
pub mod config;
pub mod error;
pub mod expr;
pub mod paginate;
pub mod query;
pub mod report;
pub mod throttle;
pub mod transport;

pub use api::{MetadataSource, ReportingApi, StaticMetadata};
pub use blueprint::Blueprint;
pub use config::ClientConfig;
pub use error::{QueryError, QueryResult};

pub mod prelude {
    pub use crate::api::{MetadataSource, ReportingApi, StaticMetadata};
    pub use crate::blueprint::Blueprint;
    pub use crate::columns::{Column, ColumnKind, ColumnRegistry, DataType, SegmentRegistry};
    pub use crate::config::ClientConfig;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::expr::{MetricScope, SegmentScope, Selection};
    pub use crate::query::core_query::SegmentSpec;
    pub use crate::query::{
        AnyQuery, CoreQuery, Granularity, Precision, Queryable, RangeSpec, RealtimeQuery, SortKey,
    };
    pub use crate::report::{Envelope, Report, Row, Value};
    pub use crate::transport::{Endpoint, RawPage, ReplayTransport, Transport};
}
