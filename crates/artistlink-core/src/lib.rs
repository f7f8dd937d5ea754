//! Core data model for artist route finding.
//!
//! - [`id`]: the stable external identifier newtype
//! - [`entity`]: [`EntityRecord`] and the stub/sentinel conventions
//! - [`edge`]: undirected [`Edge`] between two artists
//! - [`merge`]: the record merge policy used by caches and stores
//! - [`graph`]: the dual (full + delta) visualization graph

pub mod edge;
pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod merge;

// Re-export commonly used types
pub use edge::Edge;
pub use entity::{Catalog, EntityRecord, StubEntity, UNFETCHED_POPULARITY};
pub use error::CoreError;
pub use graph::{
    GraphModel, GraphPayload, GraphSnapshot, LinkPayload, VisualEdge, VisualNode, DEPTH_INDIRECT,
    DEPTH_UNROUTED,
};
pub use id::ArtistId;
pub use merge::{absorb, merge, merge_keeping_details};
