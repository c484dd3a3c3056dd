//! The engine: geometry lifecycle, dirty tracking and the
//! sort-then-sweep recompute.

use thiserror::Error;

use crate::{
    backend::{Backend, BackendKind, MultiThread, SingleThread},
    endpoint::{EndpointStore, AXIS_COUNT},
    math::Vec3,
    registry::{GeomPair, PairRegistry},
    tracy_span,
    volume::BoundingVolume,
};

/// Key to look up a geometry tracked by a [`SweepPrune`] engine.
///
/// Stable for the geometry's whole lifetime in the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct GeomKey(pub(crate) u32);

impl GeomKey {
    /// The dense index of this geometry's slot. Useful for creating your
    /// own mappings from geometries to other things.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Parameters for the creation of a [`SweepPrune`] engine.
/// See the field docs; the defaults are good for most purposes.
#[derive(Clone, Copy, Debug)]
pub struct SweepPruneParams {
    /// The three projection directions geometries are sorted along.
    ///
    /// Deliberately not the coordinate axes: world geometry tends to line
    /// up with those, and diagonal directions separate such scenes better.
    /// They don't need to be normalized or orthogonal.
    pub axes: [Vec3; AXIS_COUNT],
    /// How many geometries to allocate space for up front.
    /// More space will be allocated as needed.
    pub initial_capacity: usize,
    /// Which backend executes the sort and sweep phases.
    pub backend: BackendKind,
}

impl Default for SweepPruneParams {
    fn default() -> Self {
        Self {
            axes: [
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
            ],
            initial_capacity: 100,
            backend: BackendKind::SingleThread,
        }
    }
}

/// An error in the engine's construction-time configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A multi-threaded backend needs at least one worker thread")]
    ZeroThreads,
    #[error("The pair registry needs at least one lock")]
    ZeroRegistryLocks,
}

/// The engine failed to allocate room while growing its arrays.
///
/// The operation that failed has had no observable effect: a failed
/// [`add`][SweepPrune::add] didn't add anything and a failed
/// [`process`][SweepPrune::process] left the engine dirty, so both can be
/// retried once memory has been freed.
#[derive(Error, Debug)]
#[error("Out of memory growing sweep-and-prune arrays")]
pub struct OutOfMemory(#[from] std::collections::TryReserveError);

/// A sweep-and-prune broad phase over a set of bounding volumes.
///
/// Mutating operations mark the engine dirty;
/// [`process`][SweepPrune::process] recomputes the pair set from scratch
/// when (and only when) it's dirty. Taking `&mut self` there makes
/// "nobody mutates the engine during a recompute" something the compiler
/// checks rather than a documented assumption; all threading is internal
/// to one `process` call.
pub struct SweepPrune<G: BoundingVolume> {
    axes: [Vec3; AXIS_COUNT],
    volumes: Vec<G>,
    store: EndpointStore,
    registry: PairRegistry,
    pairs: Vec<GeomPair>,
    backend: Box<dyn Backend<G>>,
    dirty: bool,
}

impl<G: BoundingVolume> SweepPrune<G> {
    /// Create an engine. See [`SweepPruneParams`] for explanation.
    pub fn new(params: SweepPruneParams) -> Result<Self, ConfigError> {
        let (backend, lock_count): (Box<dyn Backend<G>>, usize) = match params.backend {
            BackendKind::SingleThread => (Box::new(SingleThread::new()), 1),
            BackendKind::MultiThread {
                threads,
                registry_locks,
            } => {
                if threads == 0 {
                    return Err(ConfigError::ZeroThreads);
                }
                if registry_locks == 0 {
                    return Err(ConfigError::ZeroRegistryLocks);
                }
                (Box::new(MultiThread::new(threads)), registry_locks)
            }
        };
        Ok(Self {
            axes: params.axes,
            volumes: Vec::with_capacity(params.initial_capacity),
            store: EndpointStore::with_capacity(params.initial_capacity),
            registry: PairRegistry::new(lock_count),
            pairs: Vec::new(),
            backend,
            dirty: false,
        })
    }

    /// Start tracking a volume. Marks the engine dirty.
    pub fn add(&mut self, volume: G) -> Result<GeomKey, OutOfMemory> {
        self.store.try_reserve_one()?;
        self.volumes.try_reserve(1)?;

        let gi = self.store.push_slot();
        self.volumes.push(volume);
        self.project(gi);
        self.dirty = true;
        Ok(GeomKey(gi as u32))
    }

    /// Replace a geometry's volume after it has moved or changed shape.
    ///
    /// The engine doesn't watch volumes for changes itself; call this
    /// whenever one moves. Re-projects the volume's intervals in place and
    /// marks the engine dirty, but doesn't resort anything yet.
    pub fn update(&mut self, key: GeomKey, volume: G) {
        let gi = key.index();
        self.volumes[gi] = volume;
        self.project(gi);
        self.dirty = true;
    }

    /// Stop tracking a geometry.
    ///
    /// Unfinished: this currently only marks the engine dirty. The slot
    /// and its endpoints stay in the sweep, so a removed geometry keeps
    /// showing up in pair results until this is completed.
    // TODO: compact the endpoint arrays, shift the affected slot indices
    // and free the slot for reuse
    pub fn remove(&mut self, _key: GeomKey) {
        self.dirty = true;
    }

    /// Access a tracked volume.
    #[inline]
    pub fn volume(&self, key: GeomKey) -> &G {
        &self.volumes[key.index()]
    }

    /// Number of geometries ever added.
    #[inline]
    pub fn geom_count(&self) -> usize {
        self.volumes.len()
    }

    /// Whether the cached pair set is stale.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The pair set from the most recent recompute.
    /// Stale whenever [`is_dirty`][Self::is_dirty] returns true.
    #[inline]
    pub fn pairs(&self) -> &[GeomPair] {
        &self.pairs
    }

    /// Recompute the pair set if anything changed since the last call,
    /// and return it.
    ///
    /// Sorts all three axes, then sweeps the best one for overlapping
    /// pairs, filtered through
    /// [`BoundingVolume::overlaps`][crate::BoundingVolume::overlaps].
    /// The dirty flag is cleared last: if this fails (or the overlap
    /// predicate panics), the engine stays dirty and the recompute can be
    /// retried, and the partial pair set is never reported clean.
    pub fn process(&mut self) -> Result<&[GeomPair], OutOfMemory> {
        if self.dirty {
            let _span = tracy_span!("sweep and prune", "process");
            {
                let _span = tracy_span!("sort axes", "process");
                for axis in 0..AXIS_COUNT {
                    self.backend.sort_axis(&mut self.store, axis)?;
                }
            }
            {
                let _span = tracy_span!("find pairs", "process");
                self.pairs.clear();
                self.registry.clear();
                self.backend
                    .find_pairs(&self.store, &self.volumes, &self.registry, &mut self.pairs);
            }
            self.dirty = false;
        }
        Ok(&self.pairs)
    }

    /// Project a geometry's volume onto all three sweep axes.
    fn project(&mut self, gi: usize) {
        for (axis, &dir) in self.axes.iter().enumerate() {
            let (min, max) = self.volumes[gi].interval_on(dir);
            self.store.set_interval(gi, axis, min, max);
        }
    }
}

impl<G: BoundingVolume> Default for SweepPrune<G> {
    fn default() -> Self {
        // the default params are always valid
        Self::new(SweepPruneParams::default()).unwrap()
    }
}

//
// tests
//
