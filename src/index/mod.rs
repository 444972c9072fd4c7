//! Generic spatial indices over point-set entries
//!
//! Both structures index an external notion of "entry with a position":
//! the BVH is immutable and built once over finished entries, the octree
//! accepts insertions and is used while a cache is still being populated.

mod index_bvh;
mod index_octree;

pub use index_bvh::{IndexBvh, IndexBvhArrayNode};
pub use index_octree::IndexOctree;

use glam::Vec3;

/// An entry a spatial index can place in space
pub trait SpatialEntry {
    fn position(&self) -> Vec3;
}

/// An entry carrying the full point + surface-frame predicate used by the
/// caches: position, landing normal and the surface/volume flag.
pub trait VisibilityPoint: SpatialEntry {
    fn normal(&self) -> Vec3;
    fn is_volume(&self) -> bool;
}

/// The standard cache acceptance predicate
///
/// An entry matches a query point iff it is on the same side of the
/// surface/volume split and, for surfaces, its normal lies within the
/// configured cone.
pub fn accepts_entry<T: VisibilityPoint>(
    entry: &T,
    query_normal: Vec3,
    query_is_volume: bool,
    normal_cos_angle: f32,
) -> bool {
    entry.is_volume() == query_is_volume
        && (query_is_volume || entry.normal().dot(query_normal) > normal_cos_angle)
}
