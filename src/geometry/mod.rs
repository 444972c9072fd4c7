//! Geometric primitives
//!
//! Points, vectors and normals are plain `glam::Vec3`; everything else the
//! ray-query layers need lives here: bounding boxes, rays and hit records,
//! transforms with cached inverses, the "unmatrix" decomposition used by the
//! motion system, the watertight ray/triangle test and shading frames.

mod bbox;
pub(crate) mod decompose;
mod frame;
mod ray;
mod transform;
mod triangle;

pub use bbox::Bbox;
pub use decompose::DecomposedTransform;
pub use frame::Frame;
pub use ray::{Ray, RayHit};
pub use transform::Transform;
pub use triangle::{intersect_triangle, triangle_area, TriangleHit};

/// Sentinel index meaning "no entry"
pub const NULL_INDEX: u32 = u32::MAX;

/// Relative machine epsilon scale used to pad spatial-query bounds
pub fn machine_epsilon(value: f32) -> f32 {
    const EPSILON_SCALE: f32 = 1e-5;
    value.abs().max(1.0) * EPSILON_SCALE
}
