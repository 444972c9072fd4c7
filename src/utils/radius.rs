//! Image-plane to scene-radius estimation
//!
//! When a cache is configured with radius 0 it needs a world-space lookup
//! radius whose projection covers a fixed fraction of the image plane. The
//! estimate samples camera rays, measures the angular footprint of that
//! fraction from the ray divergence across the film, and scales it by the
//! distance of each eligible first hit.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::scene::{Bsdf, Scene};

/// Parameters of the radius estimate
#[derive(Debug, Clone, Copy)]
pub struct RadiusEstimateParams {
    /// Fraction of the image plane the radius should cover
    pub image_plane_fraction: f32,
    /// Radius used when the estimator cannot converge, in world units
    pub default_radius: f32,
    /// Camera rays to sample
    pub sample_count: u32,
    pub time_start: f32,
    pub time_end: f32,
}

impl Default for RadiusEstimateParams {
    fn default() -> Self {
        Self {
            image_plane_fraction: 0.075,
            default_radius: 0.15,
            sample_count: 2048,
            time_start: 0.0,
            time_end: 1.0,
        }
    }
}

/// Estimate a world-space lookup radius for cache entries
pub fn film_to_scene_radius(
    scene: &Scene,
    params: &RadiusEstimateParams,
    is_valid_hit: impl Fn(&dyn Bsdf) -> bool,
) -> f32 {
    let camera = scene.camera().clone();
    let sub_region = camera.film_sub_region();
    let film_width = (sub_region[1] - sub_region[0] + 1) as f32;
    let film_height = (sub_region[3] - sub_region[2] + 1) as f32;

    let mut rng = StdRng::seed_from_u64(131);

    // Angular footprint of the image-plane fraction, measured from the
    // divergence between the film center and an offset ray
    let center_x = sub_region[0] as f32 + film_width * 0.5;
    let center_y = sub_region[2] as f32 + film_height * 0.5;
    let offset_x = center_x + params.image_plane_fraction * film_width;
    let (center_ray, _) = camera.generate_ray(params.time_start, center_x, center_y, 0.5, 0.5);
    let (offset_ray, _) = camera.generate_ray(params.time_start, offset_x, center_y, 0.5, 0.5);
    let cos_angle = center_ray
        .direction
        .normalize()
        .dot(offset_ray.direction.normalize())
        .clamp(-1.0, 1.0);
    let footprint_angle = cos_angle.acos();
    if footprint_angle <= 0.0 || !footprint_angle.is_finite() {
        return params.default_radius;
    }

    let mut radius_sum = 0.0f64;
    let mut radius_count = 0u32;
    for _ in 0..params.sample_count {
        let film_x = sub_region[0] as f32 + rng.gen::<f32>() * film_width;
        let film_y = sub_region[2] as f32 + rng.gen::<f32>() * film_height;
        let time = params.time_start
            + rng.gen::<f32>() * (params.time_end - params.time_start);
        let (ray, volume) = camera.generate_ray(time, film_x, film_y, rng.gen(), rng.gen());

        if let Some((hit, bsdf)) = scene.trace_through(&ray, &volume, rng.gen()) {
            if is_valid_hit(bsdf.as_ref()) {
                let distance = hit.t * ray.direction.length();
                radius_sum += (distance * footprint_angle.tan()) as f64;
                radius_count += 1;
            }
        }
    }

    if radius_count == 0 {
        debug!("scene radius estimate did not converge, using default");
        return params.default_radius;
    }

    let radius = (radius_sum / radius_count as f64) as f32;
    debug!(
        "scene radius estimate: {} over {} hits",
        radius, radius_count
    );
    if radius > 0.0 && radius.is_finite() {
        radius
    } else {
        params.default_radius
    }
}
