//! Axis-aligned bounding boxes

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::machine_epsilon;
use super::ray::Ray;

/// Axis-aligned bounding box
///
/// The default box is empty (`min = +inf`, `max = -inf`) so unions can start
/// from it without special cases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bbox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Bbox {
    pub const EMPTY: Bbox = Bbox {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn union_point(&self, p: Vec3) -> Bbox {
        Bbox {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    /// Grow the box by `delta` on every side
    pub fn expand(&self, delta: f32) -> Bbox {
        Bbox {
            min: self.min - Vec3::splat(delta),
            max: self.max + Vec3::splat(delta),
        }
    }

    /// Grow the box by the machine epsilon of its extent, used to make
    /// spatial-query bounds robust against points exactly on a face.
    pub fn expand_by_epsilon(&self) -> Bbox {
        let extent = (self.max - self.min).max_element();
        self.expand(machine_epsilon(extent))
    }

    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.diagonal();
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn contains_bbox(&self, other: &Bbox) -> bool {
        other.is_empty()
            || (self.contains_point(other.min) && self.contains_point(other.max))
    }

    /// Slab test against a ray segment, returning the clipped `(tmin, tmax)`
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        self.intersect_segment(ray.origin, ray.direction, ray.t_min, ray.t_max)
    }

    pub fn intersect_segment(
        &self,
        origin: Vec3,
        direction: Vec3,
        mut t0: f32,
        mut t1: f32,
    ) -> Option<(f32, f32)> {
        for axis in 0..3 {
            let inv_dir = 1.0 / direction[axis];
            let mut t_near = (self.min[axis] - origin[axis]) * inv_dir;
            let mut t_far = (self.max[axis] - origin[axis]) * inv_dir;
            if t_near > t_far {
                std::mem::swap(&mut t_near, &mut t_far);
            }
            t0 = if t_near > t0 { t_near } else { t0 };
            t1 = if t_far < t1 { t_far } else { t1 };
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    /// Bbox of the sub-octant `child` (bit 2 = x, bit 1 = y, bit 0 = z)
    pub fn child_octant(&self, child: u32, mid: Vec3) -> Bbox {
        let mut b = Bbox::EMPTY;
        b.min.x = if child & 0x4 != 0 { mid.x } else { self.min.x };
        b.max.x = if child & 0x4 != 0 { self.max.x } else { mid.x };
        b.min.y = if child & 0x2 != 0 { mid.y } else { self.min.y };
        b.max.y = if child & 0x2 != 0 { self.max.y } else { mid.y };
        b.min.z = if child & 0x1 != 0 { mid.z } else { self.min.z };
        b.max.z = if child & 0x1 != 0 { self.max.z } else { mid.z };
        b
    }
}
