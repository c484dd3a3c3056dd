//! Interchangeable execution backends for the sort and sweep phases.
//!
//! A backend implements the same two operations either on the calling
//! thread or across a set of worker threads; which one runs is chosen once
//! at engine construction. Both produce bit-for-bit identical sort results
//! and identical pair sets.

use itertools::Itertools;

use crate::{
    endpoint::{Endpoint, EndpointStore, AXIS_COUNT},
    engine::{GeomKey, OutOfMemory},
    registry::{GeomPair, PairRegistry},
    volume::BoundingVolume,
};

pub(crate) mod multi;
pub(crate) mod single;

pub(crate) use multi::MultiThread;
pub(crate) use single::SingleThread;

/// Which implementation executes the sort and sweep phases of
/// [`process`][crate::SweepPrune::process].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Everything runs on the thread that calls `process`.
    SingleThread,
    /// Worker threads partition the endpoint arrays and the geometry
    /// ranges between them.
    MultiThread {
        /// Number of worker threads. Must be nonzero.
        threads: usize,
        /// Number of mutexes sharding the pair registry. Must be nonzero;
        /// the thread count is a good default.
        registry_locks: usize,
    },
}

impl BackendKind {
    /// Multi-threaded backend with one registry lock per worker.
    pub fn multi(threads: usize) -> Self {
        Self::MultiThread {
            threads,
            registry_locks: threads,
        }
    }
}

/// The two operations `process` drives, implemented per backend.
pub(crate) trait Backend<G: BoundingVolume>: Send {
    /// Sort one axis's endpoint array ascending by value and update every
    /// slot's min/max position for that axis.
    fn sort_axis(&mut self, store: &mut EndpointStore, axis: usize) -> Result<(), OutOfMemory>;

    /// Sweep the sorted endpoints and append every fresh overlapping pair
    /// to `out`. The registry must be empty when this is called.
    fn find_pairs(
        &mut self,
        store: &EndpointStore,
        volumes: &[G],
        registry: &PairRegistry,
        out: &mut Vec<GeomPair>,
    );
}

/// Population variance of the endpoint values on one axis.
fn variance(endpoints: &[Endpoint]) -> f64 {
    if endpoints.is_empty() {
        return 0.0;
    }
    let len = endpoints.len() as f64;
    let mean = endpoints.iter().map(|ep| ep.val).sum::<f64>() / len;
    endpoints
        .iter()
        .map(|ep| {
            let d = ep.val - mean;
            d * d
        })
        .sum::<f64>()
        / len
}

/// Pick the sweep axis: the one whose endpoints spread out the most.
/// High variance means geometries separate early along the sweep, which
/// keeps the candidate scan ranges short.
pub(crate) fn best_axis(store: &EndpointStore) -> usize {
    let vars: [f64; AXIS_COUNT] = [
        variance(&store.axes[0]),
        variance(&store.axes[1]),
        variance(&store.axes[2]),
    ];
    // ties go to the last axis, same as the nested comparisons this used to be
    vars.iter().position_max_by(|a, b| a.total_cmp(b)).unwrap()
}

/// Scan the chosen axis strictly between one geometry's min and max
/// endpoints and report every surviving candidate pair.
///
/// Everything in that range belongs to a geometry whose interval overlaps
/// this one's on the sweep axis; candidates are then filtered through the
/// precise predicate and deduplicated by the registry. With
/// `skip_max_endpoints` a geometry whose whole interval lies inside the
/// range is only visited once (at its min endpoint); without it some
/// candidates are visited twice and the registry masks the difference.
pub(crate) fn sweep_geom<G: BoundingVolume>(
    store: &EndpointStore,
    volumes: &[G],
    registry: &PairRegistry,
    axis: usize,
    gi: usize,
    skip_max_endpoints: bool,
    out: &mut Vec<GeomPair>,
) {
    let slot = &store.slots[gi];
    let lo = slot.min[axis] as usize + 1;
    let hi = slot.max[axis] as usize;
    // an inverted (negative-width) interval sorts its endpoints in reverse
    // order, which must read as an empty range
    let Some(range) = store.axes[axis].get(lo..hi) else {
        return;
    };

    for ep in range {
        if skip_max_endpoints && ep.is_max() {
            continue;
        }
        let gj = ep.geom();
        if volumes[gi].overlaps(&volumes[gj]) {
            let pair = GeomPair::new(GeomKey(gi as u32), GeomKey(gj as u32));
            if registry.try_insert(pair) {
                out.push(pair);
            }
        }
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_axis_values(values: [&[f64]; AXIS_COUNT]) -> EndpointStore {
        let geoms = values[0].len() / 2;
        let mut store = EndpointStore::with_capacity(geoms);
        for gi in 0..geoms {
            store.push_slot();
            for axis in 0..AXIS_COUNT {
                store.set_interval(gi, axis, values[axis][2 * gi], values[axis][2 * gi + 1]);
            }
        }
        store
    }

    #[test]
    fn highest_variance_axis_wins() {
        let store = store_with_axis_values([
            &[0.0, 1.0, 0.5, 1.5],
            &[0.0, 100.0, -100.0, 50.0],
            &[2.0, 3.0, 2.5, 3.5],
        ]);
        assert_eq!(best_axis(&store), 1);
    }

    #[test]
    fn variance_ties_pick_the_last_axis() {
        let store = store_with_axis_values([
            &[0.0, 1.0, 0.5, 1.5],
            &[0.0, 1.0, 0.5, 1.5],
            &[0.0, 1.0, 0.5, 1.5],
        ]);
        assert_eq!(best_axis(&store), 2);
    }

    #[test]
    fn empty_store_still_picks_an_axis() {
        let store = EndpointStore::with_capacity(0);
        assert_eq!(best_axis(&store), 2);
    }
}
