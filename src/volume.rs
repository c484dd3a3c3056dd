//! The bounding volume abstraction the sweep engine works on.
//!
//! The engine itself never looks inside a volume; it only asks for the
//! volume's projected interval on a sweep axis and, for candidate pairs,
//! whether two volumes actually overlap. Anything that can answer those
//! two questions can be tracked, from plain boxes to whole hierarchies.

use crate::math::Vec3;

/// A volume that can be tracked by [`SweepPrune`][crate::SweepPrune].
///
/// `overlaps` is the precise test that candidate pairs from the sweep are
/// filtered through. It must be pure and side-effect free: the
/// multi-threaded backend calls it concurrently from several worker
/// threads (hence the `Send + Sync` bounds).
pub trait BoundingVolume: Send + Sync {
    /// The scalar interval covered by this volume when projected onto
    /// `axis`, as `(min, max)`.
    ///
    /// The axis is not necessarily normalized, and doesn't need to be:
    /// the sweep only compares projections with each other.
    fn interval_on(&self, axis: Vec3) -> (f64, f64);

    /// Exact overlap test between two volumes.
    fn overlaps(&self, other: &Self) -> bool;
}

/// An axis-aligned box, the simplest useful bounding volume.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Whether two boxes overlap. Boxes that exactly touch are considered
    /// overlapping.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

// projection of one component range onto one axis component
#[inline]
fn component_interval(lo: f64, hi: f64, axis_c: f64) -> (f64, f64) {
    if axis_c >= 0.0 {
        (lo * axis_c, hi * axis_c)
    } else {
        (hi * axis_c, lo * axis_c)
    }
}

impl BoundingVolume for Aabb {
    fn interval_on(&self, axis: Vec3) -> (f64, f64) {
        let (x0, x1) = component_interval(self.min.x, self.max.x, axis.x);
        let (y0, y1) = component_interval(self.min.y, self.max.y, axis.y);
        let (z0, z1) = component_interval(self.min.z, self.max.z, axis.z);
        (x0 + y0 + z0, x1 + y1 + z1)
    }

    #[inline]
    fn overlaps(&self, other: &Self) -> bool {
        self.intersects(other)
    }
}

//
// tests
//
