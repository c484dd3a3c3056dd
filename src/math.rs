//! Type aliases for doing math with `ultraviolet`.
//! The whole crate works in double precision.

pub use ultraviolet as uv;

/// Vector type used for sweep axes and bounding volume corners.
pub type Vec3 = uv::DVec3;
