//! LSD radix sort over endpoint arrays.
//!
//! Keys are the raw bit patterns of the `f64` endpoint values, sorted one
//! byte at a time from least to most significant. The first seven passes
//! are ordinary stable counting-sort passes; the final pass handles the
//! sign byte, where negative floats order bitwise in *reverse*, by
//! mirroring destination positions inside the tail region reserved for
//! sign-bit keys. The final pass also writes every endpoint's new array
//! position back into its owning geometry's slot.
//!
//! The kernels here are single-threaded; the multi-threaded backend reuses
//! the same digit/position math over shared buffers
//! (see [`backend::multi`][crate::backend]).

use std::collections::TryReserveError;

use crate::endpoint::{key_digit, sort_key, Endpoint, EndpointStore, GeomSlot};

/// Bucket count of one counting pass (one byte digit).
pub(crate) const BUCKETS: usize = 256;
/// Number of byte digits in a key.
pub(crate) const DIGITS: u32 = std::mem::size_of::<f64>() as u32;

/// Histogram one digit of every key.
pub(crate) fn count(src: &[Endpoint], counter: &mut [u32; BUCKETS], shift: u32) {
    counter.fill(0);
    for ep in src {
        counter[key_digit(sort_key(ep.val), shift)] += 1;
    }
}

/// Histogram the top digit and also count the keys with the sign bit set.
///
/// `-0.0` counts as negative here: it belongs in the mirrored tail region
/// with the rest of the sign-bit keys, otherwise it would sort above every
/// positive value.
pub(crate) fn count_final(src: &[Endpoint], counter: &mut [u32; BUCKETS], shift: u32) -> u32 {
    counter.fill(0);
    let mut negative = 0;
    for ep in src {
        counter[key_digit(sort_key(ep.val), shift)] += 1;
        if ep.val.is_sign_negative() {
            negative += 1;
        }
    }
    negative
}

/// Convert a histogram into an exclusive prefix sum in place.
pub(crate) fn prefix_sum(counter: &mut [u32; BUCKETS]) {
    let mut sum = 0;
    for c in counter.iter_mut() {
        let count = *c;
        *c = sum;
        sum += count;
    }
}

/// Convert N per-thread histograms (laid out as one slab of `N * 256`
/// counters) into one global exclusive prefix sum, ordered per bucket and
/// then per thread. Afterwards `counters[256 * t + b]` is the destination
/// offset of thread `t`'s first element with digit `b`, which is what
/// keeps the threaded scatter stable: threads occupy bucket space in
/// partition order.
pub(crate) fn prefix_sum_merged(counters: &mut [u32], threads: usize) {
    let mut start = 0;
    let mut total = 0;
    for bucket in 0..BUCKETS {
        for thread in 0..threads {
            let c = &mut counters[BUCKETS * thread + bucket];
            total += *c;
            *c = start;
            start = total;
        }
    }
}

/// Stable scatter of one plain (non-final) pass.
pub(crate) fn scatter(
    src: &[Endpoint],
    dst: &mut [Endpoint],
    counter: &mut [u32; BUCKETS],
    shift: u32,
) {
    for ep in src {
        let digit = key_digit(sort_key(ep.val), shift);
        dst[counter[digit] as usize] = *ep;
        counter[digit] += 1;
    }
}

/// Final destination of an element given its prefix-sum position.
///
/// Positions at or past `len - negative` belong to sign-bit keys, which
/// arrive in reverse numeric order; mirroring them inside that tail flips
/// them ascending. Everything else shifts up past the negatives.
#[inline]
pub(crate) fn signed_pos(prefix_pos: u32, len: u32, negative: u32) -> u32 {
    if prefix_pos >= len - negative {
        len - prefix_pos - 1
    } else {
        negative + prefix_pos
    }
}

/// Scatter of the final (sign) pass: mirrored placement for negative keys
/// plus write-back of every endpoint's final position into its geometry's
/// slot for this axis.
pub(crate) fn scatter_final(
    src: &[Endpoint],
    dst: &mut [Endpoint],
    counter: &mut [u32; BUCKETS],
    negative: u32,
    shift: u32,
    slots: &mut [GeomSlot],
    axis: usize,
) {
    let len = dst.len() as u32;
    for ep in src {
        let digit = key_digit(sort_key(ep.val), shift);
        let pos = signed_pos(counter[digit], len, negative);
        counter[digit] += 1;
        dst[pos as usize] = *ep;
        let slot = &mut slots[ep.geom()];
        if ep.is_max() {
            slot.max[axis] = pos;
        } else {
            slot.min[axis] = pos;
        }
    }
}

/// Scratch buffer for the ping-pong passes, reused across sorts.
/// Grows when a sort needs more room, never shrinks.
#[derive(Debug, Default)]
pub(crate) struct SortScratch {
    buf: Vec<Endpoint>,
}

impl SortScratch {
    /// Get a scratch slice of exactly `len` endpoints, growing the
    /// allocation if needed.
    pub fn ensure_len(&mut self, len: usize) -> Result<&mut [Endpoint], TryReserveError> {
        if self.buf.len() < len {
            self.buf.try_reserve(len - self.buf.len())?;
            self.buf.resize(len, Endpoint::default());
        }
        Ok(&mut self.buf[..len])
    }
}

/// Sort one axis of the store on the calling thread.
///
/// Afterwards the axis array is ascending by value and every slot's
/// min/max index for this axis points at the endpoint's new position.
pub(crate) fn sort_axis(
    store: &mut EndpointStore,
    scratch: &mut SortScratch,
    axis: usize,
) -> Result<(), TryReserveError> {
    let len = store.axes[axis].len();
    let tmp = scratch.ensure_len(len)?;
    if len == 0 {
        return Ok(());
    }

    let EndpointStore { slots, axes } = store;
    let mut src: &mut [Endpoint] = &mut axes[axis];
    let mut dst: &mut [Endpoint] = tmp;
    let mut counter = [0_u32; BUCKETS];

    for pass in 0..DIGITS - 1 {
        let shift = pass * 8;
        count(src, &mut counter, shift);
        prefix_sum(&mut counter);
        scatter(src, dst, &mut counter, shift);
        std::mem::swap(&mut src, &mut dst);
    }

    // DIGITS is even, so after the swaps above the final pass scatters
    // from the scratch buffer back into the store's own axis array
    let shift = (DIGITS - 1) * 8;
    let negative = count_final(src, &mut counter, shift);
    prefix_sum(&mut counter);
    scatter_final(src, dst, &mut counter, negative, shift, slots, axis);
    Ok(())
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{distributions::Uniform, prelude::*};

    fn store_from_intervals(intervals: &[(f64, f64)]) -> EndpointStore {
        let mut store = EndpointStore::with_capacity(intervals.len());
        for &(min, max) in intervals {
            let gi = store.push_slot();
            for axis in 0..crate::endpoint::AXIS_COUNT {
                store.set_interval(gi, axis, min, max);
            }
        }
        store
    }

    fn assert_sorted_with_backrefs(store: &EndpointStore, axis: usize) {
        let endpoints = &store.axes[axis];
        for pair in endpoints.windows(2) {
            assert!(pair[0].val <= pair[1].val, "{} > {}", pair[0].val, pair[1].val);
        }
        for (gi, slot) in store.slots.iter().enumerate() {
            let min_ep = endpoints[slot.min[axis] as usize];
            let max_ep = endpoints[slot.max[axis] as usize];
            assert_eq!(min_ep.geom(), gi);
            assert_eq!(max_ep.geom(), gi);
            assert!(!min_ep.is_max());
            assert!(max_ep.is_max());
        }
    }

    #[test]
    fn prefix_sum_is_exclusive() {
        let mut counter = [0_u32; BUCKETS];
        counter[0] = 2;
        counter[3] = 1;
        counter[255] = 4;
        prefix_sum(&mut counter);
        assert_eq!(counter[0], 0);
        assert_eq!(counter[1], 2);
        assert_eq!(counter[3], 2);
        assert_eq!(counter[4], 3);
        assert_eq!(counter[255], 3);
    }

    #[test]
    fn merged_prefix_matches_single_thread() {
        // two threads' histograms of the same digit distribution must
        // produce offsets that partition the same bucket ranges
        let mut merged = vec![0_u32; BUCKETS * 2];
        merged[5] = 2; // thread 0, bucket 5
        merged[BUCKETS + 5] = 3; // thread 1, bucket 5
        merged[9] = 1;
        prefix_sum_merged(&mut merged, 2);
        assert_eq!(merged[5], 0);
        assert_eq!(merged[BUCKETS + 5], 2);
        assert_eq!(merged[9], 5);
        assert_eq!(merged[BUCKETS + 9], 6);
    }

    #[test]
    fn sign_boundary_ordering() {
        let vals = [-5.0, -0.001, 0.0, 0.001, 5.0, -1e30, 1e30];
        let store_vals: Vec<(f64, f64)> = vals.iter().map(|&v| (v, v)).collect();
        let mut store = store_from_intervals(&store_vals);
        let mut scratch = SortScratch::default();
        sort_axis(&mut store, &mut scratch, 0).unwrap();

        let sorted: Vec<f64> = store.axes[0].iter().map(|ep| ep.val).collect();
        let expected = [
            -1e30, -1e30, -5.0, -5.0, -0.001, -0.001, 0.0, 0.0, 0.001, 0.001, 5.0, 5.0, 1e30, 1e30,
        ];
        assert_eq!(sorted, expected);
    }

    #[test]
    fn negative_zero_sorts_below_positives() {
        let mut store = store_from_intervals(&[(1.0, 2.0), (-0.0, 0.5)]);
        let mut scratch = SortScratch::default();
        sort_axis(&mut store, &mut scratch, 0).unwrap();
        let sorted: Vec<f64> = store.axes[0].iter().map(|ep| ep.val).collect();
        assert_eq!(sorted, [-0.0, 0.5, 1.0, 2.0]);
        // f64 equality can't tell -0.0 from 0.0, check the sign bit too
        assert!(sorted[0].is_sign_negative());
    }

    #[test]
    fn random_values_sort_like_std() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let dist = Uniform::new(-1e6_f64, 1e6);
        for geom_count in [1_usize, 7, 100, 1000] {
            let intervals: Vec<(f64, f64)> = (0..geom_count)
                .map(|_| {
                    let a = dist.sample(&mut rng);
                    let b = a + dist.sample(&mut rng).abs();
                    (a, b)
                })
                .collect();
            let mut store = store_from_intervals(&intervals);
            let mut expected: Vec<f64> = store.axes[0].iter().map(|ep| ep.val).collect();
            expected.sort_by(f64::total_cmp);

            let mut scratch = SortScratch::default();
            for axis in 0..crate::endpoint::AXIS_COUNT {
                sort_axis(&mut store, &mut scratch, axis).unwrap();
                let got: Vec<f64> = store.axes[axis].iter().map(|ep| ep.val).collect();
                assert_eq!(got, expected);
                assert_sorted_with_backrefs(&store, axis);
            }
        }
    }

    #[test]
    fn resorting_sorted_input_is_stable() {
        let mut store = store_from_intervals(&[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)]);
        let mut scratch = SortScratch::default();
        sort_axis(&mut store, &mut scratch, 0).unwrap();
        let first: Vec<(f64, usize, bool)> = store.axes[0]
            .iter()
            .map(|ep| (ep.val, ep.geom(), ep.is_max()))
            .collect();
        sort_axis(&mut store, &mut scratch, 0).unwrap();
        let second: Vec<(f64, usize, bool)> = store.axes[0]
            .iter()
            .map(|ep| (ep.val, ep.geom(), ep.is_max()))
            .collect();
        assert_eq!(first, second);
    }
}
