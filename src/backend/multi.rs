//! The multi-threaded backend.
//!
//! Each radix pass is split into three barrier-separated phases: every
//! worker histograms its own contiguous chunk, one worker merges the
//! per-worker histograms into a global prefix sum, then every worker
//! scatters its chunk into the shared destination buffer at the positions
//! the merge assigned to it. Because the merge orders bucket space by
//! worker index, the result is bit-for-bit the same as the sequential
//! sort.
//!
//! The sweep phase is simpler: workers own disjoint geometry ranges and
//! disjoint output buckets, and only the pair registry is shared (behind
//! its shard locks).

use std::sync::Barrier;

use super::{best_axis, sweep_geom, Backend};
use crate::{
    endpoint::{key_digit, sort_key, Endpoint, EndpointStore, GeomSlot},
    engine::OutOfMemory,
    radix::{prefix_sum_merged, signed_pos, SortScratch, BUCKETS, DIGITS},
    registry::{GeomPair, PairRegistry},
    volume::BoundingVolume,
};

/// A raw pointer to a buffer shared between sort workers.
///
/// The sort's write patterns can't be expressed with borrowed slices:
/// which worker owns which indices changes from phase to phase. Access
/// is coordinated with barriers instead; see the SAFETY notes at the
/// unsafe blocks in [`sort_worker`].
struct SharedPtr<T>(*mut T);

// SAFETY: every access goes through `SharedPtr::at` inside `sort_worker`,
// whose phase discipline guarantees a single writer per index per phase
unsafe impl<T> Sync for SharedPtr<T> {}
unsafe impl<T> Send for SharedPtr<T> {}

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}
impl<T> Copy for SharedPtr<T> {}

impl<T> SharedPtr<T> {
    /// Pointer to element `idx`.
    ///
    /// # Safety
    /// `idx` must be in bounds of the underlying buffer, and writes
    /// through the result must not race with other workers' accesses.
    #[inline]
    unsafe fn at(self, idx: usize) -> *mut T {
        self.0.add(idx)
    }
}

pub(crate) struct MultiThread {
    threads: usize,
    barrier: Barrier,
    scratch: SortScratch,
    // one 256-bucket histogram per worker, in one slab
    counters: Vec<u32>,
    negatives: Vec<u32>,
}

impl MultiThread {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            barrier: Barrier::new(threads),
            scratch: SortScratch::default(),
            counters: vec![0; BUCKETS * threads],
            negatives: vec![0; threads],
        }
    }
}

impl<G: BoundingVolume> Backend<G> for MultiThread {
    fn sort_axis(&mut self, store: &mut EndpointStore, axis: usize) -> Result<(), OutOfMemory> {
        let len = store.axes[axis].len();
        let tmp = self.scratch.ensure_len(len)?;
        if len == 0 {
            return Ok(());
        }

        let threads = self.threads;
        let chunk_len = len / threads;
        let EndpointStore { slots, axes } = store;

        let src = SharedPtr(axes[axis].as_mut_ptr());
        let dst = SharedPtr(tmp.as_mut_ptr());
        let slots = SharedPtr(slots.as_mut_ptr());
        let counters = SharedPtr(self.counters.as_mut_ptr());
        let negatives = SharedPtr(self.negatives.as_mut_ptr());
        let barrier = &self.barrier;

        std::thread::scope(|s| {
            for id in 0..threads {
                s.spawn(move || {
                    sort_worker(
                        id, threads, chunk_len, len, axis, src, dst, slots, counters, negatives,
                        barrier,
                    )
                });
            }
        });
        Ok(())
    }

    fn find_pairs(
        &mut self,
        store: &EndpointStore,
        volumes: &[G],
        registry: &PairRegistry,
        out: &mut Vec<GeomPair>,
    ) {
        let axis = best_axis(store);
        let geom_count = store.geom_count();
        if geom_count == 0 {
            return;
        }

        let threads = self.threads;
        let chunk_len = geom_count / threads;
        let buckets: Vec<Vec<GeomPair>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|id| {
                    s.spawn(move || {
                        let from = id * chunk_len;
                        let to = if id == threads - 1 {
                            geom_count
                        } else {
                            from + chunk_len
                        };
                        let mut bucket = Vec::new();
                        for gi in from..to {
                            sweep_geom(store, volumes, registry, axis, gi, true, &mut bucket);
                        }
                        bucket
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(bucket) => bucket,
                    // a worker panicked (most likely inside the overlap
                    // predicate); resume it on the caller
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        });
        out.extend(buckets.into_iter().flatten());
    }
}

/// One worker's share of a whole axis sort: all radix passes over one
/// contiguous chunk, synchronized with the other workers at the three
/// points where ownership of the shared buffers changes hands.
#[allow(clippy::too_many_arguments)]
fn sort_worker(
    id: usize,
    threads: usize,
    chunk_len: usize,
    len: usize,
    axis: usize,
    mut src: SharedPtr<Endpoint>,
    mut dst: SharedPtr<Endpoint>,
    slots: SharedPtr<GeomSlot>,
    counters: SharedPtr<u32>,
    negatives: SharedPtr<u32>,
    barrier: &Barrier,
) {
    let from = id * chunk_len;
    let to = if id == threads - 1 {
        len
    } else {
        from + chunk_len
    };
    let counter_base = BUCKETS * id;

    for pass in 0..DIGITS {
        let shift = pass * 8;
        let final_pass = pass == DIGITS - 1;

        // SAFETY: this worker only writes its own histogram section
        // [counter_base, counter_base + BUCKETS) and its own negative
        // counter, and only reads its own chunk of src; nobody reads them
        // until after the barrier
        unsafe {
            for bucket in 0..BUCKETS {
                *counters.at(counter_base + bucket) = 0;
            }
            let mut negative = 0_u32;
            for i in from..to {
                let ep = *src.at(i);
                *counters.at(counter_base + key_digit(sort_key(ep.val), shift)) += 1;
                if final_pass && ep.val.is_sign_negative() {
                    negative += 1;
                }
            }
            if final_pass {
                *negatives.at(id) = negative;
            }
        }
        barrier.wait();

        // SAFETY: between the barriers only worker 0 touches the counter
        // slab and only worker 1 the negative counts (disjoint buffers)
        unsafe {
            if id == 0 {
                let slab = std::slice::from_raw_parts_mut(counters.0, BUCKETS * threads);
                prefix_sum_merged(slab, threads);
            } else if final_pass && id == 1 {
                // with a single worker this branch never runs and
                // negatives[0] is already the total
                for thread in 1..threads {
                    *negatives.at(0) += *negatives.at(thread);
                }
            }
        }
        barrier.wait();

        // SAFETY: the merged prefix sum assigns every element a globally
        // unique destination, so workers write disjoint positions of dst,
        // and each slot min/max entry is written only by the single worker
        // scattering that endpoint. Each worker advances only its own
        // histogram section. src is read-only in this phase.
        unsafe {
            let negative = if final_pass { *negatives.at(0) } else { 0 };
            for i in from..to {
                let ep = *src.at(i);
                let counter = counters.at(counter_base + key_digit(sort_key(ep.val), shift));
                let prefix_pos = *counter;
                *counter += 1;
                if final_pass {
                    let pos = signed_pos(prefix_pos, len as u32, negative);
                    *dst.at(pos as usize) = ep;
                    let slot = slots.at(ep.geom());
                    if ep.is_max() {
                        (*slot).max[axis] = pos;
                    } else {
                        (*slot).min[axis] = pos;
                    }
                } else {
                    *dst.at(prefix_pos as usize) = ep;
                }
            }
        }
        // all writes must land before any worker starts reading dst as
        // the next pass's source
        barrier.wait();

        std::mem::swap(&mut src, &mut dst);
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::AXIS_COUNT;
    use crate::radix;
    use rand::{distributions::Uniform, prelude::*};

    fn random_store(geom_count: usize, seed: u64) -> EndpointStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Uniform::new(-1e4_f64, 1e4);
        let mut store = EndpointStore::with_capacity(geom_count);
        for _ in 0..geom_count {
            let gi = store.push_slot();
            for axis in 0..AXIS_COUNT {
                let min = dist.sample(&mut rng);
                let max = min + dist.sample(&mut rng).abs();
                store.set_interval(gi, axis, min, max);
            }
        }
        store
    }

    fn endpoints_of(store: &EndpointStore, axis: usize) -> Vec<(u64, usize, bool)> {
        store.axes[axis]
            .iter()
            .map(|ep| (sort_key(ep.val), ep.geom(), ep.is_max()))
            .collect()
    }

    #[test]
    fn threaded_sort_matches_sequential_bit_for_bit() {
        for thread_count in [1_usize, 2, 3, 8] {
            for geom_count in [1_usize, 5, 64, 500] {
                let mut seq_store = random_store(geom_count, 42);
                let mut th_store = seq_store.clone();

                let mut scratch = SortScratch::default();
                let mut multi = MultiThread::new(thread_count);
                for axis in 0..AXIS_COUNT {
                    radix::sort_axis(&mut seq_store, &mut scratch, axis).unwrap();
                    Backend::<crate::Aabb>::sort_axis(&mut multi, &mut th_store, axis).unwrap();

                    assert_eq!(
                        endpoints_of(&seq_store, axis),
                        endpoints_of(&th_store, axis),
                        "threads={thread_count} geoms={geom_count} axis={axis}"
                    );
                    for (seq_slot, th_slot) in seq_store.slots.iter().zip(&th_store.slots) {
                        assert_eq!(seq_slot.min[axis], th_slot.min[axis]);
                        assert_eq!(seq_slot.max[axis], th_slot.max[axis]);
                    }
                }
            }
        }
    }

    #[test]
    fn more_threads_than_endpoints() {
        let mut store = random_store(2, 7);
        let mut multi = MultiThread::new(8);
        for axis in 0..AXIS_COUNT {
            Backend::<crate::Aabb>::sort_axis(&mut multi, &mut store, axis).unwrap();
            for pair in store.axes[axis].windows(2) {
                assert!(pair[0].val <= pair[1].val);
            }
        }
    }
}
