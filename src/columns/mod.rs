//! Column registry: typed descriptors for every metric and dimension of the
//! reporting schema, plus stored segments.
//!
//! - [`column`] - `Column`, data types and casters, metadata hydration
//! - [`segment`] - `Segment` and the `Addressable` tagged type
//! - [`registry`] - alias lookup tables

pub mod column;
pub mod registry;
pub mod segment;

pub use column::{Caster, Column, ColumnKind, DataType, RawColumnAttributes, RawColumnMetadata, snakify};
pub use registry::{ColumnRef, ColumnRegistry, SegmentRef, SegmentRegistry};
pub use segment::{Addressable, RawSegment, Segment};
