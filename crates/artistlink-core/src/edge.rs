//! Undirected edge between two artists.
//!
//! An [`Edge`] stores its endpoints in sorted order, so `Edge::new(a, b)` and
//! `Edge::new(b, a)` are the same value and hash identically. Discovery
//! direction is a storage concern and is not represented here.

use serde::{Deserialize, Serialize};

use crate::id::ArtistId;

/// Unordered pair of artist ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    low: ArtistId,
    high: ArtistId,
}

impl Edge {
    pub fn new(a: ArtistId, b: ArtistId) -> Self {
        if a <= b {
            Edge { low: a, high: b }
        } else {
            Edge { low: b, high: a }
        }
    }

    /// Both endpoints, smallest id first.
    pub fn endpoints(&self) -> (&ArtistId, &ArtistId) {
        (&self.low, &self.high)
    }

    pub fn contains(&self, id: &ArtistId) -> bool {
        &self.low == id || &self.high == id
    }

    /// The endpoint opposite `id`, or `None` if `id` is not on this edge.
    pub fn other(&self, id: &ArtistId) -> Option<&ArtistId> {
        if &self.low == id {
            Some(&self.high)
        } else if &self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }

    /// True for an edge from an artist to itself.
    pub fn is_loop(&self) -> bool {
        self.low == self.high
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn other_returns_opposite_endpoint() {
        let edge = Edge::new("a".into(), "b".into());
        assert_eq!(edge.other(&"a".into()), Some(&ArtistId::from("b")));
        assert_eq!(edge.other(&"b".into()), Some(&ArtistId::from("a")));
        assert_eq!(edge.other(&"c".into()), None);
    }

    #[test]
    fn hash_set_deduplicates_reversed_pairs() {
        let mut set = HashSet::new();
        set.insert(Edge::new("x".into(), "y".into()));
        set.insert(Edge::new("y".into(), "x".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn self_edge_is_loop() {
        assert!(Edge::new("x".into(), "x".into()).is_loop());
        assert!(!Edge::new("x".into(), "y".into()).is_loop());
    }

    proptest! {
        #[test]
        fn edge_equality_is_symmetric(a in "[a-z0-9]{1,8}", b in "[a-z0-9]{1,8}") {
            let ab = Edge::new(ArtistId::new(a.clone()), ArtistId::new(b.clone()));
            let ba = Edge::new(ArtistId::new(b), ArtistId::new(a));
            prop_assert_eq!(ab, ba);
        }
    }
}
