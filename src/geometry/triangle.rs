//! Watertight ray/triangle intersection
//!
//! The test shears the triangle into a ray-aligned coordinate system and
//! evaluates edge functions there, falling back to double precision when an
//! edge function lands exactly on zero. Degenerate triangles never report a
//! hit.

use glam::Vec3;

use super::ray::Ray;

/// Intersection parameters in the triangle's barycentric frame
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    pub t: f32,
    pub b1: f32,
    pub b2: f32,
}

pub fn triangle_area(p0: Vec3, p1: Vec3, p2: Vec3) -> f32 {
    0.5 * (p1 - p0).cross(p2 - p0).length()
}

fn max_dimension(v: Vec3) -> usize {
    if v.x > v.y {
        if v.x > v.z {
            0
        } else {
            2
        }
    } else if v.y > v.z {
        1
    } else {
        2
    }
}

/// Watertight ray/triangle test over `[ray.t_min, ray.t_max]`
pub fn intersect_triangle(ray: &Ray, p0: Vec3, p1: Vec3, p2: Vec3) -> Option<TriangleHit> {
    debug_assert!(!ray.origin.is_nan() && !ray.direction.is_nan());

    // Translate vertices to the ray origin
    let p0t = p0 - ray.origin;
    let p1t = p1 - ray.origin;
    let p2t = p2 - ray.origin;

    // Permute so the dominant direction component is Z
    let kz = max_dimension(ray.direction.abs());
    let kx = (kz + 1) % 3;
    let ky = (kx + 1) % 3;
    let d = Vec3::new(ray.direction[kx], ray.direction[ky], ray.direction[kz]);
    let mut p0t = Vec3::new(p0t[kx], p0t[ky], p0t[kz]);
    let mut p1t = Vec3::new(p1t[kx], p1t[ky], p1t[kz]);
    let mut p2t = Vec3::new(p2t[kx], p2t[ky], p2t[kz]);

    // Shear so the ray maps onto +Z
    if d.z == 0.0 {
        return None;
    }
    let sx = -d.x / d.z;
    let sy = -d.y / d.z;
    let sz = 1.0 / d.z;
    p0t.x += sx * p0t.z;
    p0t.y += sy * p0t.z;
    p1t.x += sx * p1t.z;
    p1t.y += sy * p1t.z;
    p2t.x += sx * p2t.z;
    p2t.y += sy * p2t.z;

    // Edge functions, re-evaluated in f64 on exact zeros
    let mut e0 = p1t.x * p2t.y - p1t.y * p2t.x;
    let mut e1 = p2t.x * p0t.y - p2t.y * p0t.x;
    let mut e2 = p0t.x * p1t.y - p0t.y * p1t.x;
    if e0 == 0.0 || e1 == 0.0 || e2 == 0.0 {
        e0 = (p1t.x as f64 * p2t.y as f64 - p1t.y as f64 * p2t.x as f64) as f32;
        e1 = (p2t.x as f64 * p0t.y as f64 - p2t.y as f64 * p0t.x as f64) as f32;
        e2 = (p0t.x as f64 * p1t.y as f64 - p0t.y as f64 * p1t.x as f64) as f32;
    }

    if (e0 < 0.0 || e1 < 0.0 || e2 < 0.0) && (e0 > 0.0 || e1 > 0.0 || e2 > 0.0) {
        return None;
    }
    let det = e0 + e1 + e2;
    if det == 0.0 {
        return None;
    }

    // Scaled hit distance against the segment bounds
    p0t.z *= sz;
    p1t.z *= sz;
    p2t.z *= sz;
    let t_scaled = e0 * p0t.z + e1 * p1t.z + e2 * p2t.z;
    if det < 0.0 && (t_scaled >= ray.t_min * det || t_scaled < ray.t_max * det) {
        return None;
    }
    if det > 0.0 && (t_scaled <= ray.t_min * det || t_scaled > ray.t_max * det) {
        return None;
    }

    let inv_det = 1.0 / det;
    let t = t_scaled * inv_det;
    if !t.is_finite() {
        return None;
    }

    Some(TriangleHit {
        t,
        b1: e1 * inv_det,
        b2: e2 * inv_det,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const P0: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    const P1: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    const P2: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    #[test]
    fn test_center_hit() {
        let ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), -Vec3::Z);
        let hit = intersect_triangle(&ray, P0, P1, P2).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
        let b0 = 1.0 - hit.b1 - hit.b2;
        assert!((b0 - 0.5).abs() < 1e-5);
        assert!((hit.b1 - 0.25).abs() < 1e-5);
        assert!((hit.b2 - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_barycentrics_in_range() {
        let ray = Ray::new(Vec3::new(0.6, 0.3, -2.0), Vec3::Z);
        let hit = intersect_triangle(&ray, P0, P1, P2).unwrap();
        let b0 = 1.0 - hit.b1 - hit.b2;
        for b in [b0, hit.b1, hit.b2] {
            assert!((-1e-6..=1.0 + 1e-6).contains(&b));
        }
    }

    #[test]
    fn test_outside_misses() {
        let ray = Ray::new(Vec3::new(0.8, 0.8, 1.0), -Vec3::Z);
        assert!(intersect_triangle(&ray, P0, P1, P2).is_none());
    }

    #[test]
    fn test_behind_origin_misses() {
        let ray = Ray::new(Vec3::new(0.25, 0.25, -1.0), -Vec3::Z);
        assert!(intersect_triangle(&ray, P0, P1, P2).is_none());
    }

    #[test]
    fn test_degenerate_triangle_misses() {
        let ray = Ray::new(Vec3::new(0.5, 0.0, 1.0), -Vec3::Z);
        assert!(intersect_triangle(&ray, P0, P1, P1).is_none());
        assert!(triangle_area(P0, P1, P1) == 0.0);
    }

    #[test]
    fn test_segment_clipping() {
        let ray = Ray::segment(Vec3::new(0.25, 0.25, 1.0), -Vec3::Z, 0.0, 0.5);
        assert!(intersect_triangle(&ray, P0, P1, P2).is_none());
        let ray = Ray::segment(Vec3::new(0.25, 0.25, 1.0), -Vec3::Z, 0.0, 1.5);
        assert!(intersect_triangle(&ray, P0, P1, P2).is_some());
    }

    #[test]
    fn test_shared_edge_watertight() {
        // Two triangles sharing the diagonal edge: a ray aimed exactly at
        // the shared edge must hit at least one of them.
        let q0 = Vec3::new(1.0, 1.0, 0.0);
        let ray = Ray::new(Vec3::new(0.5, 0.5, 1.0), -Vec3::Z);
        let a = intersect_triangle(&ray, P0, P1, P2);
        let b = intersect_triangle(&ray, P1, q0, P2);
        assert!(a.is_some() || b.is_some());
    }
}
