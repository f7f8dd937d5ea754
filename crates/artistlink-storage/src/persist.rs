//! Bounded persistence of a record neighborhood.
//!
//! Saving an artist should also save the collaborators the search learned
//! about. The walk uses an explicit queue with a visited set so its cost is
//! bounded by `max_depth` rather than by the diameter of the graph.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use artistlink_core::{ArtistId, Catalog, EntityRecord};

use crate::error::StorageError;
use crate::traits::ArtistStore;

/// Upserts `root` and every catalog record reachable from it through
/// neighbor ids, up to `max_depth` hops away. Ids missing from the catalog
/// end the walk along that branch.
///
/// Returns the number of records written.
pub fn save_reachable<S: ArtistStore + ?Sized>(
    store: &mut S,
    root: &ArtistId,
    catalog: &Catalog,
    max_depth: usize,
) -> Result<usize, StorageError> {
    let mut queue: VecDeque<(&ArtistId, usize)> = VecDeque::new();
    let mut visited: HashSet<&ArtistId> = HashSet::new();
    let mut written = 0;

    queue.push_back((root, 0));
    visited.insert(root);

    while let Some((id, depth)) = queue.pop_front() {
        let Some(record) = catalog.get(id) else {
            continue;
        };
        store.upsert(record)?;
        written += 1;

        if depth >= max_depth {
            continue;
        }
        for neighbor in record.neighbor_ids() {
            if visited.insert(neighbor) {
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    debug!(root = %root, written, max_depth, "persisted neighborhood");
    Ok(written)
}

/// Upserts each record in order. Returns the merged versions.
pub fn save_all<S: ArtistStore + ?Sized>(
    store: &mut S,
    records: &[EntityRecord],
) -> Result<Vec<EntityRecord>, StorageError> {
    records.iter().map(|record| store.upsert(record)).collect()
}
