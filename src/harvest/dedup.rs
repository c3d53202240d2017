//! Run-scoped deduplication of entity identifiers.
//!
//! One [`EntityDeduplicator`] is created per harvest run and shared through
//! the harvest context. Identifiers are namespaced per [`EntityKind`], so a
//! track and an artist with the same id never collide.
//!
//! Check-and-set is atomic: two sources processed concurrently can never
//! both observe the same artist as absent.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Namespace of a deduplicated identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Track accepted into the result sequence.
    Track,
    /// Artist whose detail/related lookups have been issued.
    Artist,
    /// Playlist consumed by an accepted source.
    Playlist,
    /// Track whose audio features were looked up for an accepted batch.
    AudioFeatures,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Track => "track",
            EntityKind::Artist => "artist",
            EntityKind::Playlist => "playlist",
            EntityKind::AudioFeatures => "audio_features",
        }
    }
}

/// Thread-safe membership index, one set per entity kind.
///
/// Can be shared across tasks via `Arc<EntityDeduplicator>`.
#[derive(Debug, Default)]
pub struct EntityDeduplicator {
    seen: Mutex<HashMap<EntityKind, HashSet<String>>>,
}

impl EntityDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityKind, HashSet<String>>> {
        // A panic while holding the lock cannot leave a set half-updated,
        // so a poisoned lock is still usable.
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert `id` if absent. Returns true when it was already present.
    pub fn insert_if_absent(&self, kind: EntityKind, id: &str) -> bool {
        let mut seen = self.lock();
        let set = seen.entry(kind).or_default();
        if set.contains(id) {
            true
        } else {
            set.insert(id.to_string());
            false
        }
    }

    /// Membership test without mutation.
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.lock().get(&kind).is_some_and(|set| set.contains(id))
    }

    /// Claim every id not yet seen, under a single lock.
    ///
    /// Returns the newly claimed ids in input order, without duplicates.
    pub fn claim_new<'a, I>(&self, kind: EntityKind, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = self.lock();
        let set = seen.entry(kind).or_default();
        ids.into_iter()
            .filter(|id| set.insert((*id).to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Number of identifiers seen for a kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock().get(&kind).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_if_absent_reports_presence() {
        let dedup = EntityDeduplicator::new();

        assert!(!dedup.insert_if_absent(EntityKind::Track, "t1"));
        assert!(dedup.insert_if_absent(EntityKind::Track, "t1"));
        assert!(dedup.contains(EntityKind::Track, "t1"));
        assert_eq!(dedup.count(EntityKind::Track), 1);
    }

    #[test]
    fn test_kinds_are_independent() {
        let dedup = EntityDeduplicator::new();

        dedup.insert_if_absent(EntityKind::Track, "x");
        assert!(!dedup.contains(EntityKind::Artist, "x"));
        assert!(!dedup.insert_if_absent(EntityKind::Artist, "x"));
        assert_eq!(dedup.count(EntityKind::Playlist), 0);
    }

    #[test]
    fn test_claim_new_filters_seen_and_repeats() {
        let dedup = EntityDeduplicator::new();
        dedup.insert_if_absent(EntityKind::Artist, "a2");

        let claimed = dedup.claim_new(EntityKind::Artist, ["a1", "a2", "a3", "a1"]);
        assert_eq!(claimed, vec!["a1", "a3"]);

        let again = dedup.claim_new(EntityKind::Artist, ["a1", "a3"]);
        assert!(again.is_empty());
        assert_eq!(dedup.count(EntityKind::Artist), 3);
    }

    #[test]
    fn test_concurrent_claims_never_double_count() {
        let dedup = Arc::new(EntityDeduplicator::new());
        let ids: Vec<String> = (0..200).map(|i| format!("a{}", i)).collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                let ids = ids.clone();
                std::thread::spawn(move || {
                    dedup
                        .claim_new(EntityKind::Artist, ids.iter().map(String::as_str))
                        .len()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 200);
        assert_eq!(dedup.count(EntityKind::Artist), 200);
    }
}
