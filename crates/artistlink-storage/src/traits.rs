//! The [`ArtistStore`] trait defining the storage contract.
//!
//! Records are stored without embedded neighbor objects; neighbors are
//! reconstructed from the edge set on read. Edges are undirected for lookup
//! purposes, but each backend remembers which side discovered the edge.

use artistlink_core::{merge_keeping_details, ArtistId, EntityRecord};

use crate::error::StorageError;

/// The storage contract for artist records.
///
/// The trait is synchronous; callers that share a store across tasks wrap it
/// in an async mutex.
pub trait ArtistStore: Send {
    // -------------------------------------------------------------------
    // Low-level access
    // -------------------------------------------------------------------

    /// Loads a record by id.
    ///
    /// `neighbors` is `Some` only when the record was stored as resolved. It
    /// then lists every adjacent id in discovery order, including edges
    /// recorded from the other side.
    fn get(&self, id: &ArtistId) -> Result<Option<EntityRecord>, StorageError>;

    /// Writes the scalar fields of `record` verbatim, replacing any stored
    /// row. Does not touch edges.
    fn put_record(&mut self, record: &EntityRecord) -> Result<(), StorageError>;

    /// Whether an edge exists between `a` and `b` in either direction.
    fn find_edge(&self, a: &ArtistId, b: &ArtistId) -> Result<bool, StorageError>;

    /// Records an edge discovered from `from` towards `to`. A no-op if the
    /// pair is already connected in either direction.
    fn add_edge(&mut self, from: &ArtistId, to: &ArtistId) -> Result<(), StorageError>;

    /// Ids adjacent to `id` in discovery order.
    fn neighbor_ids(&self, id: &ArtistId) -> Result<Vec<ArtistId>, StorageError>;

    /// Number of stored artists.
    fn artist_count(&self) -> Result<usize, StorageError>;

    // -------------------------------------------------------------------
    // High-level convenience
    // -------------------------------------------------------------------

    /// Merges `record` with the stored version (if any), writes the result
    /// and adds an edge for every neighbor. Returns the merged record.
    fn upsert(&mut self, record: &EntityRecord) -> Result<EntityRecord, StorageError> {
        let merged = match self.get(&record.id)? {
            Some(existing) => merge_keeping_details(&existing, record)?,
            None => record.clone(),
        };
        self.put_record(&merged)?;
        for neighbor in merged.neighbor_ids() {
            if neighbor != &merged.id && !self.find_edge(&merged.id, neighbor)? {
                self.add_edge(&merged.id, neighbor)?;
            }
        }
        Ok(merged)
    }
}
