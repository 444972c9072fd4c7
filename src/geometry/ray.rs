//! Rays and hit records

use glam::Vec3;

/// Default ray epsilon used to offset secondary rays off their surface
pub(crate) const DEFAULT_RAY_EPSILON: f32 = 1e-4;

/// A ray segment with an associated time for motion blur
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
    pub time: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self::segment(origin, direction, DEFAULT_RAY_EPSILON, f32::INFINITY)
    }

    pub fn segment(origin: Vec3, direction: Vec3, t_min: f32, t_max: f32) -> Self {
        debug_assert!(t_min <= t_max);
        debug_assert!(!origin.is_nan() && !direction.is_nan());
        debug_assert!(direction != Vec3::ZERO);
        Self {
            origin,
            direction,
            t_min,
            t_max,
            time: 0.0,
        }
    }

    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + t * self.direction
    }

    /// Re-aim the ray for the next path vertex, resetting the segment
    pub fn update(&mut self, origin: Vec3, direction: Vec3) {
        self.origin = origin;
        self.direction = direction;
        self.t_min = DEFAULT_RAY_EPSILON;
        self.t_max = f32::INFINITY;
    }
}

/// Result of a ray query; `t == +inf` denotes a miss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub t: f32,
    pub b1: f32,
    pub b2: f32,
    pub mesh_index: u32,
    pub triangle_index: u32,
}

impl RayHit {
    pub fn miss() -> Self {
        Self {
            t: f32::INFINITY,
            b1: 0.0,
            b2: 0.0,
            mesh_index: super::NULL_INDEX,
            triangle_index: super::NULL_INDEX,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.t == f32::INFINITY
    }

    pub fn is_hit(&self) -> bool {
        !self.is_miss()
    }

    /// First barycentric coordinate, derived from the stored pair
    pub fn b0(&self) -> f32 {
        1.0 - self.b1 - self.b2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_is_infinite() {
        let miss = RayHit::miss();
        assert!(miss.is_miss());
        assert!(!miss.is_hit());
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X * 2.0);
        assert_eq!(ray.at(3.0), Vec3::new(6.0, 0.0, 0.0));
    }
}
