//! Merge policy for two versions of the same artist record.
//!
//! Scalar metadata (art, followers, popularity, timestamp) comes wholesale
//! from the fresher side; set-valued fields are unioned. The union of
//! neighbors preserves first-seen order, left side first.
//!
//! Guarantees relied on by stores and caches:
//! - set-valued fields (neighbors, genres) are order-independent
//! - `merge(r, r)` reproduces `r` (an unstamped `r` gains only a timestamp)
//! - the merged neighbor count is never below either input's

use chrono::Utc;
use indexmap::IndexSet;

use crate::entity::{Catalog, EntityRecord};
use crate::error::CoreError;
use crate::id::ArtistId;

/// Merges two versions of the same record.
///
/// `b` supplies the scalar fields only when its `last_updated` is strictly
/// later than `a`'s, or `a` has none. A record pair with no timestamp at all
/// is stamped with the current time.
pub fn merge(a: &EntityRecord, b: &EntityRecord) -> Result<EntityRecord, CoreError> {
    if a.id != b.id {
        return Err(CoreError::IdMismatch {
            left: a.id.clone(),
            right: b.id.clone(),
        });
    }

    let b_is_fresher = match (a.last_updated, b.last_updated) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(at), Some(bt)) => bt > at,
    };
    let (winner, loser) = if b_is_fresher { (b, a) } else { (a, b) };

    let name = if winner.name.is_empty() {
        loser.name.clone()
    } else {
        winner.name.clone()
    };

    let neighbors = match (&a.neighbors, &b.neighbors) {
        (None, None) => None,
        (left, right) => Some(union_ids(
            left.as_deref().unwrap_or(&[]),
            right.as_deref().unwrap_or(&[]),
        )),
    };

    Ok(EntityRecord {
        id: a.id.clone(),
        name,
        popularity: winner.popularity,
        followers: winner.followers,
        art_url: winner.art_url.clone(),
        genres: a.genres.union(&b.genres).cloned().collect(),
        last_updated: Some(
            winner
                .last_updated
                .or(loser.last_updated)
                .unwrap_or_else(Utc::now),
        ),
        neighbors,
    })
}

/// [`merge`], except that fetched metadata is never replaced by a stub.
///
/// Detail fetches carry no timestamp, so a freshly resolved stub would
/// otherwise win the scalars over an upgraded copy of itself.
pub fn merge_keeping_details(
    a: &EntityRecord,
    b: &EntityRecord,
) -> Result<EntityRecord, CoreError> {
    let mut merged = merge(a, b)?;
    if merged.is_stub() {
        if let Some(fetched) = [b, a].into_iter().find(|r| !r.is_stub()) {
            let genres = std::mem::take(&mut merged.genres);
            merged.apply_details(fetched);
            merged.genres.extend(genres);
        }
    }
    Ok(merged)
}

/// Inserts `record` into `catalog`, merging with any version already there.
pub fn absorb(catalog: &mut Catalog, record: EntityRecord) -> Result<(), CoreError> {
    let merged = match catalog.get(&record.id) {
        Some(existing) => merge_keeping_details(existing, &record)?,
        None => record,
    };
    catalog.insert(merged.id.clone(), merged);
    Ok(())
}

fn union_ids(left: &[ArtistId], right: &[ArtistId]) -> Vec<ArtistId> {
    let ids: IndexSet<ArtistId> = left.iter().chain(right).cloned().collect();
    ids.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use chrono::{DateTime, Duration};
    use proptest::prelude::*;

    use super::*;

    fn ids(raw: &[&str]) -> Vec<ArtistId> {
        raw.iter().map(|s| ArtistId::from(*s)).collect()
    }

    fn assert_same_content(left: &EntityRecord, right: &EntityRecord) {
        assert_eq!(left.id, right.id);
        assert_eq!(left.name, right.name);
        assert_eq!(left.popularity, right.popularity);
        assert_eq!(left.followers, right.followers);
        assert_eq!(left.art_url, right.art_url);
        assert_eq!(left.genres, right.genres);
        assert_eq!(left.last_updated, right.last_updated);
        assert_eq!(left.neighbors, right.neighbors);
    }

    #[test]
    fn fresher_side_supplies_scalars() {
        let now = Utc::now();
        let old = EntityRecord::new("a", "Old", 10)
            .with_last_updated(now - Duration::days(3))
            .with_genres(["rock"]);
        let fresh = EntityRecord::new("a", "Fresh", 70)
            .with_last_updated(now)
            .with_genres(["pop"]);

        let merged = merge(&old, &fresh).unwrap();
        assert_eq!(merged.popularity, 70);
        assert_eq!(merged.name, "Fresh");
        assert_eq!(merged.last_updated, Some(now));
        assert_eq!(
            merged.genres,
            ["pop", "rock"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );

        let reversed = merge(&fresh, &old).unwrap();
        assert_eq!(reversed.popularity, 70);
    }

    #[test]
    fn timestamped_side_wins_over_untimestamped() {
        let at = Utc::now() - Duration::hours(1);
        let untimed = EntityRecord::new("a", "A", 5);
        let timed = EntityRecord::new("a", "A", 55).with_last_updated(at);

        assert_eq!(merge(&untimed, &timed).unwrap().popularity, 55);
        assert_eq!(merge(&timed, &untimed).unwrap().popularity, 55);
        assert_eq!(merge(&untimed, &timed).unwrap().last_updated, Some(at));
    }

    #[test]
    fn unstamped_pair_is_stamped_now() {
        let before = Utc::now();
        let merged = merge(&EntityRecord::new("a", "A", 1), &EntityRecord::new("a", "A", 2)).unwrap();
        assert_eq!(merged.popularity, 1);
        assert!(merged.last_updated.unwrap() >= before);
    }

    #[test]
    fn neighbors_union_preserves_first_seen_order() {
        let a = EntityRecord::new("a", "A", 1).with_neighbors(ids(&["n1", "n2"]));
        let b = EntityRecord::new("a", "A", 1).with_neighbors(ids(&["n2", "n3", "n1", "n4"]));
        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.neighbors, Some(ids(&["n1", "n2", "n3", "n4"])));
    }

    #[test]
    fn unresolved_sides_stay_unresolved() {
        let merged = merge(&EntityRecord::stub("a", "A"), &EntityRecord::stub("a", "A")).unwrap();
        assert!(merged.neighbors.is_none());

        let one_side = EntityRecord::stub("a", "A").with_neighbors(vec![]);
        let merged = merge(&EntityRecord::stub("a", "A"), &one_side).unwrap();
        assert_eq!(merged.neighbors, Some(vec![]));
    }

    #[test]
    fn mismatched_ids_are_rejected() {
        let err = merge(&EntityRecord::new("a", "A", 1), &EntityRecord::new("b", "B", 1)).unwrap_err();
        assert!(matches!(err, CoreError::IdMismatch { .. }));
    }

    #[test]
    fn absorb_merges_existing_catalog_entry() {
        let mut catalog = Catalog::new();
        absorb(&mut catalog, EntityRecord::stub("a", "A").with_neighbors(ids(&["b"]))).unwrap();
        absorb(&mut catalog, EntityRecord::stub("a", "A").with_neighbors(ids(&["c"]))).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[&ArtistId::from("a")].neighbors, Some(ids(&["b", "c"])));
    }

    #[test]
    fn fetched_details_survive_a_fresher_stub() {
        let now = Utc::now();
        let fetched = EntityRecord::new("a", "A", 64).with_genres(["dub"]);
        let resolved_stub = EntityRecord::stub("a", "A")
            .with_last_updated(now)
            .with_neighbors(ids(&["b"]));

        let plain = merge(&fetched, &resolved_stub).unwrap();
        assert!(plain.is_stub());

        let kept = merge_keeping_details(&fetched, &resolved_stub).unwrap();
        assert_eq!(kept.popularity, 64);
        assert!(kept.genres.contains("dub"));
        assert_eq!(kept.neighbors, Some(ids(&["b"])));
        assert_eq!(kept.last_updated, Some(now));
    }

    #[test]
    fn absorb_upgrades_stub_entry() {
        let mut catalog = Catalog::new();
        absorb(&mut catalog, EntityRecord::stub("a", "A")).unwrap();
        absorb(&mut catalog, EntityRecord::new("a", "A", 12)).unwrap();
        assert_eq!(catalog[&ArtistId::from("a")].popularity, 12);
    }

    const POOL: &[&str] = &["n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7"];
    const GENRES: &[&str] = &["pop", "rock", "jazz", "rap", "folk"];

    fn arb_record() -> impl Strategy<Value = EntityRecord> {
        (
            "[A-Za-z ]{0,12}",
            -1i32..=100,
            0i64..1_000_000,
            prop::sample::subsequence(GENRES.to_vec(), 0..=GENRES.len()),
            prop::option::of(0i64..2_000_000_000),
            prop::option::of(prop::sample::subsequence(POOL.to_vec(), 0..=POOL.len())),
        )
            .prop_map(|(name, popularity, followers, genres, ts, neighbors)| EntityRecord {
                id: ArtistId::from("x"),
                name,
                popularity,
                followers,
                art_url: format!("https://img/{followers}"),
                genres: genres.into_iter().map(String::from).collect(),
                last_updated: ts.map(|secs| DateTime::from_timestamp(secs, 0).unwrap()),
                neighbors: neighbors.map(|n| n.into_iter().map(ArtistId::from).collect()),
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn merge_is_idempotent(record in arb_record()) {
            let merged = merge(&record, &record).unwrap();
            prop_assert_eq!(&merged, &record);
            if record.last_updated.is_some() {
                assert_same_content(&merged, &record);
            } else {
                // Only the timestamp is filled in.
                let restamped = record.clone().with_last_updated(merged.last_updated.unwrap());
                assert_same_content(&merged, &restamped);
            }
        }

        #[test]
        fn merge_never_loses_neighbors(a in arb_record(), b in arb_record()) {
            let merged = merge(&a, &b).unwrap();
            prop_assert!(merged.neighbor_count() >= a.neighbor_count().max(b.neighbor_count()));
        }

        #[test]
        fn set_fields_are_commutative(a in arb_record(), b in arb_record()) {
            let ab = merge(&a, &b).unwrap();
            let ba = merge(&b, &a).unwrap();
            prop_assert_eq!(&ab.genres, &ba.genres);
            let ab_set: HashSet<_> = ab.neighbor_ids().iter().collect();
            let ba_set: HashSet<_> = ba.neighbor_ids().iter().collect();
            prop_assert_eq!(ab_set, ba_set);
            prop_assert_eq!(ab.is_resolved(), ba.is_resolved());
        }
    }
}
