//! Direction mappings and low-discrepancy sequences

use std::f32::consts::PI;

use glam::Vec3;

/// Radical inverse of `n` in the given prime base
pub fn radical_inverse(mut n: u32, base: u32) -> f32 {
    let inv_base = 1.0 / base as f64;
    let mut inv_bi = inv_base;
    let mut value = 0.0f64;
    while n > 0 {
        let digit = n % base;
        value += digit as f64 * inv_bi;
        n /= base;
        inv_bi *= inv_base;
    }
    value as f32
}

/// Uniform direction on the full sphere
pub fn uniform_sample_sphere(u0: f32, u1: f32) -> Vec3 {
    let z = 1.0 - 2.0 * u0;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u1;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Uniform direction on the upper (+Z) hemisphere
pub fn uniform_sample_hemisphere(u0: f32, u1: f32) -> Vec3 {
    let z = u0;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u1;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Concentric disk mapping
pub fn concentric_sample_disk(u0: f32, u1: f32) -> (f32, f32) {
    let ox = 2.0 * u0 - 1.0;
    let oy = 2.0 * u1 - 1.0;
    if ox == 0.0 && oy == 0.0 {
        return (0.0, 0.0);
    }
    let (r, theta) = if ox.abs() > oy.abs() {
        (ox, (PI / 4.0) * (oy / ox))
    } else {
        (oy, (PI / 2.0) - (PI / 4.0) * (ox / oy))
    };
    (r * theta.cos(), r * theta.sin())
}

/// Map a direction to equirectangular `(u, v)` and the mapping density
///
/// The density is with respect to solid angle; it vanishes at the poles
/// where the mapping degenerates.
pub fn to_lat_long(dir: Vec3) -> (f32, f32, f32) {
    let theta = dir.z.clamp(-1.0, 1.0).acos();
    let mut phi = dir.y.atan2(dir.x);
    if phi < 0.0 {
        phi += 2.0 * PI;
    }
    let u = phi / (2.0 * PI);
    let v = theta / PI;
    let sin_theta = theta.sin();
    let pdf = if sin_theta == 0.0 {
        0.0
    } else {
        1.0 / (2.0 * PI * PI * sin_theta)
    };
    (u, v, pdf)
}

/// Inverse of [`to_lat_long`]
pub fn from_lat_long(u: f32, v: f32) -> (Vec3, f32) {
    let phi = u * 2.0 * PI;
    let theta = v * PI;
    let sin_theta = theta.sin();
    let dir = Vec3::new(
        sin_theta * phi.cos(),
        sin_theta * phi.sin(),
        theta.cos(),
    );
    let pdf = if sin_theta == 0.0 {
        0.0
    } else {
        1.0 / (2.0 * PI * PI * sin_theta)
    };
    (dir, pdf)
}
