//! The sequential backend: every phase on the calling thread.

use super::{best_axis, sweep_geom, Backend};
use crate::{
    endpoint::EndpointStore,
    engine::OutOfMemory,
    radix::{self, SortScratch},
    registry::{GeomPair, PairRegistry},
    volume::BoundingVolume,
};

#[derive(Debug, Default)]
pub(crate) struct SingleThread {
    scratch: SortScratch,
}

impl SingleThread {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<G: BoundingVolume> Backend<G> for SingleThread {
    fn sort_axis(&mut self, store: &mut EndpointStore, axis: usize) -> Result<(), OutOfMemory> {
        radix::sort_axis(store, &mut self.scratch, axis)?;
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
        for gi in 0..store.geom_count() {
            // max endpoints are not skipped here; the registry absorbs the
            // duplicate visits (the threaded sweep does skip them)
            sweep_geom(store, volumes, registry, axis, gi, false, out);
        }
    }
}
