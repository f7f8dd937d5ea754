//! In-memory implementation of [`ArtistStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and for searches that
//! should not touch disk. It keeps an id-indexed adjacency map alongside the
//! artist rows, with identical semantics to the SQLite backend.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use artistlink_core::{ArtistId, Edge, EntityRecord};

use crate::error::StorageError;
use crate::traits::ArtistStore;

/// Data stored for one artist.
#[derive(Debug, Clone)]
struct StoredArtist {
    /// Scalar fields; `neighbors` is always `None` here.
    record: EntityRecord,
    /// Whether the record was written with a resolved neighbor set.
    resolved: bool,
}

/// HashMap-backed [`ArtistStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    artists: HashMap<ArtistId, StoredArtist>,
    /// Adjacency in discovery order, both directions.
    adjacency: HashMap<ArtistId, IndexSet<ArtistId>>,
    /// Undirected edge -> (discovered from, discovered towards).
    edges: IndexMap<Edge, (ArtistId, ArtistId)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The direction in which the edge between `a` and `b` was discovered.
    pub fn edge_direction(&self, a: &ArtistId, b: &ArtistId) -> Option<(ArtistId, ArtistId)> {
        self.edges.get(&Edge::new(a.clone(), b.clone())).cloned()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl ArtistStore for InMemoryStore {
    fn get(&self, id: &ArtistId) -> Result<Option<EntityRecord>, StorageError> {
        let Some(stored) = self.artists.get(id) else {
            return Ok(None);
        };
        let neighbors = self.neighbor_ids(id)?;
        let mut record = stored.record.clone();
        if stored.resolved {
            record.neighbors = Some(neighbors);
        }
        Ok(Some(record))
    }

    fn put_record(&mut self, record: &EntityRecord) -> Result<(), StorageError> {
        let mut row = record.clone();
        let resolved = row.neighbors.take().is_some();
        self.artists.insert(
            row.id.clone(),
            StoredArtist {
                record: row,
                resolved,
            },
        );
        Ok(())
    }

    fn find_edge(&self, a: &ArtistId, b: &ArtistId) -> Result<bool, StorageError> {
        Ok(self.edges.contains_key(&Edge::new(a.clone(), b.clone())))
    }

    fn add_edge(&mut self, from: &ArtistId, to: &ArtistId) -> Result<(), StorageError> {
        if from == to {
            return Err(StorageError::SelfEdge { id: from.clone() });
        }
        let edge = Edge::new(from.clone(), to.clone());
        if self.edges.contains_key(&edge) {
            return Ok(());
        }
        self.edges.insert(edge, (from.clone(), to.clone()));
        self.adjacency
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.adjacency
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        Ok(())
    }

    fn neighbor_ids(&self, id: &ArtistId) -> Result<Vec<ArtistId>, StorageError> {
        Ok(self
            .adjacency
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn artist_count(&self) -> Result<usize, StorageError> {
        Ok(self.artists.len())
    }
}
