//! Broad-phase collision detection with sweep and prune:
//! track bounding volumes for a set of geometries and cheaply find
//! the pairs that are close enough to need an exact overlap test.

/// Create a profiling span that will show up in [Tracy](https://github.com/wolfpld/tracy)
/// if a client is running and the `tracy` feature is enabled.
macro_rules! tracy_span {
    ($name:expr, $function:expr) => {
        ::tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $function, file!(), line!(), 0))
    };
}
pub(crate) use tracy_span;

pub mod math;
pub use math::{uv, Vec3};

pub mod volume;
pub use volume::{Aabb, BoundingVolume};

mod endpoint;
mod radix;

pub mod registry;
pub use registry::GeomPair;

pub mod backend;
pub use backend::BackendKind;

pub mod engine;
pub use engine::{ConfigError, GeomKey, OutOfMemory, SweepPrune, SweepPruneParams};
