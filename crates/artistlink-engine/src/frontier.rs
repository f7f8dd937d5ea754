//! The weighted frontier of discovered but unexpanded artists.

use std::cmp::Ordering;
use std::collections::HashSet;

use artistlink_core::{ArtistId, EntityRecord};

/// Genre ratio used when the target has genres but the candidate shares none.
const DISJOINT_GENRE_RATIO: f64 = 0.75;
/// Weight lost per hop from the start.
const DEPTH_PENALTY_PER_HOP: f64 = 0.15;

/// An artist waiting to be expanded.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub record: EntityRecord,
    /// Hops from the search start.
    pub depth: u32,
    /// Computed lazily on the first pop that sees the entry.
    pub weight: Option<f64>,
    /// Artists visited to reach this one, start first.
    pub path: Vec<ArtistId>,
}

impl FrontierEntry {
    pub fn new(record: EntityRecord, depth: u32, path: Vec<ArtistId>) -> Self {
        FrontierEntry {
            record,
            depth,
            weight: None,
            path,
        }
    }

    fn sort_key(&self, other: &Self) -> Ordering {
        let weight = self.weight.unwrap_or(0.0);
        let other_weight = other.weight.unwrap_or(0.0);
        weight
            .total_cmp(&other_weight)
            .then(self.depth.cmp(&other.depth))
            .then(self.record.popularity.cmp(&other.record.popularity))
    }
}

/// Best-first queue keyed by [`calculate_weight`].
#[derive(Debug, Default)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    queued: HashSet<ArtistId>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ArtistId) -> bool {
        self.queued.contains(id)
    }

    /// Queues `entry` unless an entry for the same artist is already queued.
    pub fn push(&mut self, entry: FrontierEntry) -> bool {
        if !self.queued.insert(entry.record.id.clone()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Removes the entry with the greatest weight. Ties go to the deeper
    /// entry, then to the more popular one, then to the later insertion.
    pub fn pop_best(&mut self, target: &EntityRecord) -> Option<FrontierEntry> {
        for entry in self.entries.iter_mut().filter(|e| e.weight.is_none()) {
            entry.weight = Some(calculate_weight(&entry.record, target, entry.depth));
        }
        self.entries.sort_by(FrontierEntry::sort_key);
        let best = self.entries.pop()?;
        self.queued.remove(&best.record.id);
        Some(best)
    }

    /// Updates the record of a queued artist, e.g. after its metadata was
    /// fetched. The cached weight is recomputed on the next pop.
    pub fn refresh(&mut self, record: &EntityRecord) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.record.id == record.id) {
            entry.record = record.clone();
            entry.weight = None;
        }
    }
}

/// How promising `candidate` looks as a step towards `target`.
///
/// The product of the shared-genre ratio, a popularity factor in
/// `0.75..=1.0`, and a penalty of 0.15 per hop.
pub fn calculate_weight(candidate: &EntityRecord, target: &EntityRecord, depth: u32) -> f64 {
    let shared = candidate.genres.intersection(&target.genres).count();
    let shared_ratio = if shared > 0 {
        shared as f64 / target.genres.len() as f64
    } else if !target.genres.is_empty() {
        DISJOINT_GENRE_RATIO
    } else {
        1.0
    };
    let popularity_weight = 0.75 + 0.25 * (candidate.popularity as f64 / 100.0);
    let depth_penalty = (1.0 - DEPTH_PENALTY_PER_HOP * depth as f64).max(0.0);
    shared_ratio * popularity_weight * depth_penalty
}
