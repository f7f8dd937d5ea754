//! Artist records as known to the route finder, caches and stores.
//!
//! Records refer to their neighbors by [`ArtistId`] only. Neighbor metadata
//! lives in a [`Catalog`] (or the persistent store), so mutually-connected
//! artists never hold references to each other.
//!
//! `neighbors` distinguishes two states:
//! - `None`: the collaborator set has not been resolved yet
//! - `Some(vec![])`: resolved, and the artist has no collaborators

use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ArtistId;

/// Popularity sentinel for a record whose metadata has not been fetched.
pub const UNFETCHED_POPULARITY: i32 = -1;

/// Per-search index of every record seen so far, keyed by id.
pub type Catalog = HashMap<ArtistId, EntityRecord>;

/// A single artist with its metadata and (optionally) resolved neighbors.
///
/// Equality and hashing consider only `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: ArtistId,
    pub name: String,
    /// 0..=100, or [`UNFETCHED_POPULARITY`].
    pub popularity: i32,
    pub followers: i64,
    pub art_url: String,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Ordered neighbor ids, `None` until resolved.
    #[serde(default)]
    pub neighbors: Option<Vec<ArtistId>>,
}

impl EntityRecord {
    /// Creates a record with fetched metadata and unresolved neighbors.
    pub fn new(id: impl Into<ArtistId>, name: impl Into<String>, popularity: i32) -> Self {
        EntityRecord {
            id: id.into(),
            name: name.into(),
            popularity,
            followers: 0,
            art_url: String::new(),
            genres: BTreeSet::new(),
            last_updated: None,
            neighbors: None,
        }
    }

    /// Creates a stub: known to exist, metadata not yet fetched.
    pub fn stub(id: impl Into<ArtistId>, name: impl Into<String>) -> Self {
        EntityRecord {
            followers: -1,
            ..EntityRecord::new(id, name, UNFETCHED_POPULARITY)
        }
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_neighbors(mut self, neighbors: Vec<ArtistId>) -> Self {
        self.neighbors = Some(neighbors);
        self
    }

    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// True while the popularity sentinel is still set.
    pub fn is_stub(&self) -> bool {
        self.popularity == UNFETCHED_POPULARITY
    }

    /// True once a neighbor set (possibly empty) has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.neighbors.is_some()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.as_ref().map_or(0, Vec::len)
    }

    pub fn neighbor_ids(&self) -> &[ArtistId] {
        self.neighbors.as_deref().unwrap_or(&[])
    }

    pub fn has_neighbor(&self, id: &ArtistId) -> bool {
        self.neighbor_ids().contains(id)
    }

    /// Copies fetched metadata from `details` onto this record, leaving the
    /// neighbor list and timestamp untouched.
    pub fn apply_details(&mut self, details: &EntityRecord) {
        if !details.name.is_empty() {
            self.name = details.name.clone();
        }
        self.popularity = details.popularity;
        self.followers = details.followers;
        self.art_url = details.art_url.clone();
        self.genres = details.genres.clone();
    }
}

impl PartialEq for EntityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityRecord {}

impl Hash for EntityRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A collaborator as reported by the external source: id and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubEntity {
    pub id: ArtistId,
    pub name: String,
}

impl StubEntity {
    pub fn new(id: impl Into<ArtistId>, name: impl Into<String>) -> Self {
        StubEntity {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn into_record(self) -> EntityRecord {
        EntityRecord::stub(self.id, self.name)
    }
}
