//! Persistent storage for artist records and collaboration edges.
//!
//! Provides the [`ArtistStore`] trait defining the storage contract that all
//! backends implement, plus [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! # Architecture
//!
//! The trait has a two-layer API:
//! - **Low-level** methods (`get`, `put_record`, `find_edge`, `add_edge`)
//!   each touch one artist row or one edge.
//! - **High-level** [`ArtistStore::upsert`] applies the record merge policy
//!   against the stored version and records every neighbor edge, so
//!   concurrent writers of the same id converge instead of overwriting.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`traits`]: ArtistStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`persist`]: bounded worklist persistence of a record neighborhood

pub mod error;
pub mod memory;
pub mod persist;
pub mod schema;
pub mod sqlite;
pub mod traits;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use persist::{save_all, save_reachable};
pub use sqlite::SqliteStore;
pub use traits::ArtistStore;
