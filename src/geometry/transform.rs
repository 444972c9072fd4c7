//! Affine transforms with cached inverses

use glam::{Mat4, Vec3};

use super::bbox::Bbox;
use super::ray::Ray;

/// A transform and its inverse, computed once at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: Mat4,
    pub m_inv: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: Mat4::IDENTITY,
        m_inv: Mat4::IDENTITY,
    };

    pub fn new(m: Mat4) -> Self {
        Self {
            m,
            m_inv: m.inverse(),
        }
    }

    /// Build from a matrix/inverse pair that is already known
    pub fn from_pair(m: Mat4, m_inv: Mat4) -> Self {
        Self { m, m_inv }
    }

    pub fn inverse(&self) -> Transform {
        Transform {
            m: self.m_inv,
            m_inv: self.m,
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.m.transform_point3(p)
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.m.transform_vector3(v)
    }

    /// Normals transform by the inverse transpose
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        self.m_inv.transpose().transform_vector3(n)
    }

    /// Transform a ray; the direction is deliberately left unnormalized so
    /// the hit parameter stays comparable with the untransformed ray.
    pub fn transform_ray(&self, ray: &Ray) -> Ray {
        Ray {
            origin: self.transform_point(ray.origin),
            direction: self.transform_vector(ray.direction),
            t_min: ray.t_min,
            t_max: ray.t_max,
            time: ray.time,
        }
    }

    /// Transform all eight corners and re-union them
    pub fn transform_bbox(&self, bbox: &Bbox) -> Bbox {
        if bbox.is_empty() {
            return Bbox::EMPTY;
        }
        let mut out = Bbox::EMPTY;
        for i in 0..8u32 {
            let corner = Vec3::new(
                if i & 1 != 0 { bbox.max.x } else { bbox.min.x },
                if i & 2 != 0 { bbox.max.y } else { bbox.min.y },
                if i & 4 != 0 { bbox.max.z } else { bbox.min.z },
            );
            out = out.union_point(self.transform_point(corner));
        }
        out
    }

    /// `self * other`, applying `other` first
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            m: self.m * other.m,
            m_inv: other.m_inv * self.m_inv,
        }
    }

    pub fn swaps_handedness(&self) -> bool {
        self.m.determinant() < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform::new(Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 0.5),
            Quat::from_rotation_y(0.7),
            Vec3::new(1.0, -2.0, 3.0),
        ));
        let p = Vec3::new(0.3, 0.7, -1.1);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }

    #[test]
    fn test_bbox_transform_contains_corners() {
        let t = Transform::new(Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let b = Bbox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let tb = t.transform_bbox(&b);
        // A rotated unit cube must fit inside the transformed bounds
        for i in 0..8u32 {
            let corner = Vec3::new(
                if i & 1 != 0 { 1.0 } else { -1.0 },
                if i & 2 != 0 { 1.0 } else { -1.0 },
                if i & 4 != 0 { 1.0 } else { -1.0 },
            );
            assert!(tb.contains_point(t.transform_point(corner)));
        }
    }

    #[test]
    fn test_ray_direction_not_normalized() {
        let t = Transform::new(Mat4::from_scale(Vec3::splat(2.0)));
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let local = t.inverse().transform_ray(&ray);
        assert!((local.direction.length() - 0.5).abs() < 1e-6);
        // The same t maps to corresponding points in both spaces
        let p_world = ray.at(4.0);
        let p_local = local.at(4.0);
        assert!((t.inverse().transform_point(p_world) - p_local).length() < 1e-6);
    }
}
