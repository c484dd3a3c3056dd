//! The deduplicated registry of currently-colliding pairs.
//!
//! During discovery every worker thread reports candidate pairs here; the
//! registry guarantees each unordered pair is recorded at most once per
//! rebuild. It is sharded: a small fixed array of mutexes each guards a
//! slice of the hash space, so contention is bounded by how many workers
//! happen to hash to the same shard rather than by worker count.

use std::collections::{hash_map::RandomState, HashSet};
use std::hash::BuildHasher;

use parking_lot::Mutex;

use crate::engine::GeomKey;

/// An unordered pair of geometries whose volumes overlap.
///
/// Stored in canonical order (larger key first), so pairs compare and hash
/// the same no matter which way round they were discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct GeomPair(pub GeomKey, pub GeomKey);

impl GeomPair {
    pub(crate) fn new(a: GeomKey, b: GeomKey) -> Self {
        debug_assert!(a != b, "bug: paired a geometry with itself");
        if a.index() >= b.index() {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Whether this pair connects the given geometry.
    pub fn contains(&self, key: GeomKey) -> bool {
        self.0 == key || self.1 == key
    }
}

pub(crate) struct PairRegistry {
    shards: Vec<Mutex<HashSet<GeomPair>>>,
    hasher: RandomState,
}

impl PairRegistry {
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: std::iter::repeat_with(|| Mutex::new(HashSet::new()))
                .take(shard_count)
                .collect(),
            hasher: RandomState::new(),
        }
    }

    #[inline]
    fn shard(&self, pair: GeomPair) -> &Mutex<HashSet<GeomPair>> {
        &self.shards[self.hasher.hash_one(pair) as usize % self.shards.len()]
    }

    /// Record a pair unless it was already recorded this rebuild.
    /// Returns whether the pair was fresh. The probe and the insert happen
    /// under the pair's shard lock, so concurrent discovery of the same
    /// pair reports it fresh exactly once.
    pub fn try_insert(&self, pair: GeomPair) -> bool {
        self.shard(pair).lock().insert(pair)
    }

    /// Drop every recorded pair, keeping shard allocations for the next
    /// rebuild.
    pub fn clear(&mut self) {
        for shard in &mut self.shards {
            shard.get_mut().clear();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}

//
// tests
//
