//! On-demand neighbor resolution with a merge-on-read cache.
//!
//! [`ConnectionResolver::resolve`] reconciles the caller's copy of an artist
//! with the persistent store, serves the stored neighbor set when it is large
//! and recent enough, and otherwise fetches collaborators from the external
//! source.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use indexmap::IndexSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

use artistlink_core::{
    merge, merge_keeping_details, ArtistId, Catalog, EntityRecord, StubEntity,
};
use artistlink_storage::ArtistStore;

use crate::config::{CacheConfig, EngineConfig};
use crate::error::RouteError;
use crate::source::CollaborationSource;

/// The persistent store as shared by concurrent searches.
pub type SharedStore = Arc<Mutex<Box<dyn ArtistStore>>>;

/// Wraps a store for sharing across searches.
pub fn shared_store<S: ArtistStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(Box::new(store)))
}

/// Outcome of resolving one artist.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The reconciled record with `neighbors` set.
    pub record: EntityRecord,
    /// Neighbor records in the order of `record.neighbors`.
    pub neighbors: Vec<EntityRecord>,
    /// Whether the neighbor set came from the store.
    pub from_cache: bool,
}

impl Resolution {
    /// No collaborators: a dead end for the search.
    pub fn is_dead_end(&self) -> bool {
        self.neighbors.is_empty()
    }
}

pub struct ConnectionResolver {
    source: Arc<dyn CollaborationSource>,
    store: SharedStore,
    cache: CacheConfig,
    detail_batch_size: usize,
    upgrade_stubs: bool,
}

impl ConnectionResolver {
    pub fn new(
        source: Arc<dyn CollaborationSource>,
        store: SharedStore,
        config: &EngineConfig,
    ) -> Self {
        ConnectionResolver {
            source,
            store,
            cache: config.cache.clone(),
            detail_batch_size: config.detail_batch_size.max(1),
            upgrade_stubs: config.upgrade_stubs,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Merges `entity` with its stored version. The merged record is written
    /// back when it knows strictly more neighbors than the store did.
    pub async fn reconcile(&self, entity: &EntityRecord) -> Result<EntityRecord, RouteError> {
        let mut store = self.store.lock().await;
        let Some(stored) = store.get(&entity.id)? else {
            return Ok(entity.clone());
        };
        let merged = merge_keeping_details(&stored, entity)?;
        if merged.neighbor_count() > stored.neighbor_count() {
            debug!(artist = %entity.id, "writing back merged neighbor set");
            store.upsert(&merged)?;
        }
        Ok(merged)
    }

    /// Resolves the neighbors of `entity`. `catalog` supplies fresher
    /// in-memory versions of neighbor records where the search has them.
    pub async fn resolve(
        &self,
        entity: &EntityRecord,
        catalog: &Catalog,
    ) -> Result<Resolution, RouteError> {
        let reconciled = self.reconcile(entity).await?;

        if self.is_fresh(&reconciled) {
            debug!(
                artist = %reconciled.id,
                neighbors = reconciled.neighbor_count(),
                "using cached neighbors"
            );
            let neighbors = self
                .lookup_neighbors(reconciled.neighbor_ids(), &HashMap::new(), catalog)
                .await?;
            return Ok(Resolution {
                record: reconciled,
                neighbors,
                from_cache: true,
            });
        }

        let stubs = self.source.fetch_collaborators(&reconciled.id).await?;
        let fetched = self.upgrade(dedupe(&reconciled.id, stubs), catalog).await?;

        let mut fresh = reconciled.clone();
        fresh.neighbors = Some(fetched.iter().map(|r| r.id.clone()).collect());
        fresh.last_updated = Some(Utc::now());
        let record = merge(&reconciled, &fresh)?;

        info!(
            artist = %record.id,
            fetched = fetched.len(),
            neighbors = record.neighbor_count(),
            "resolved collaborators"
        );

        let by_id: HashMap<ArtistId, EntityRecord> =
            fetched.into_iter().map(|r| (r.id.clone(), r)).collect();
        let neighbors = self
            .lookup_neighbors(record.neighbor_ids(), &by_id, catalog)
            .await?;
        Ok(Resolution {
            record,
            neighbors,
            from_cache: false,
        })
    }

    /// Full metadata for `ids`, fetched in batches of at most
    /// `detail_batch_size`.
    pub async fn fetch_details(&self, ids: &[ArtistId]) -> Result<Vec<EntityRecord>, RouteError> {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.detail_batch_size) {
            records.extend(self.source.fetch_details(chunk).await?);
        }
        Ok(records)
    }

    fn is_fresh(&self, record: &EntityRecord) -> bool {
        if record.neighbor_count() <= self.cache.min_cached_neighbors {
            return false;
        }
        match self.cache.max_age_secs {
            None => true,
            Some(secs) => {
                // A bound beyond chrono's range never expires anything.
                let max_age = i64::try_from(secs)
                    .ok()
                    .and_then(ChronoDuration::try_seconds);
                match max_age {
                    None => true,
                    Some(max_age) => record
                        .last_updated
                        .is_some_and(|at| Utc::now() - at <= max_age),
                }
            }
        }
    }

    /// Replaces stubs with known records and, if enabled, fetches details
    /// for the rest.
    async fn upgrade(
        &self,
        stubs: Vec<EntityRecord>,
        catalog: &Catalog,
    ) -> Result<Vec<EntityRecord>, RouteError> {
        let mut records = Vec::with_capacity(stubs.len());
        {
            let store = self.store.lock().await;
            for stub in stubs {
                let known = match catalog.get(&stub.id) {
                    Some(record) => Some(record.clone()),
                    None => store.get(&stub.id)?,
                };
                records.push(match known {
                    Some(record) if !record.is_stub() => record,
                    _ => stub,
                });
            }
        }

        if !self.upgrade_stubs {
            return Ok(records);
        }
        let missing: Vec<ArtistId> = records
            .iter()
            .filter(|r| r.is_stub())
            .map(|r| r.id.clone())
            .collect();
        if missing.is_empty() {
            return Ok(records);
        }

        let details: HashMap<ArtistId, EntityRecord> = self
            .fetch_details(&missing)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        debug!(requested = missing.len(), received = details.len(), "upgraded stubs");
        for record in records.iter_mut().filter(|r| r.is_stub()) {
            if let Some(found) = details.get(&record.id) {
                record.apply_details(found);
            }
        }
        Ok(records)
    }

    /// Records for `ids`, preferring `fetched`, then the catalog, then the
    /// store. Ids known nowhere become nameless stubs.
    async fn lookup_neighbors(
        &self,
        ids: &[ArtistId],
        fetched: &HashMap<ArtistId, EntityRecord>,
        catalog: &Catalog,
    ) -> Result<Vec<EntityRecord>, RouteError> {
        let store = self.store.lock().await;
        let mut neighbors = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match fetched.get(id).or_else(|| catalog.get(id)) {
                Some(record) => record.clone(),
                None => match store.get(id)? {
                    Some(stored) => stored,
                    None => EntityRecord::stub(id.clone(), ""),
                },
            };
            neighbors.push(record);
        }
        Ok(neighbors)
    }
}

/// Stubs in first-seen order, without duplicates or `owner` itself.
fn dedupe(owner: &ArtistId, stubs: Vec<StubEntity>) -> Vec<EntityRecord> {
    let mut seen = IndexSet::new();
    stubs
        .into_iter()
        .filter(|stub| &stub.id != owner && seen.insert(stub.id.clone()))
        .map(StubEntity::into_record)
        .collect()
}
