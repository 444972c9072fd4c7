//! Host-provided collaborator traits
//!
//! The host supplies shading, lights, the camera and the film; the core
//! calls back through these object-safe traits during cache builds and
//! queries. All value conventions follow the path-tracing usual: sampled
//! BSDF values are pre-weighted (`f * |cos| / pdf`), evaluated BSDF values
//! include the cosine toward the light.

use std::sync::Arc;

use glam::Vec3;

use crate::geometry::{Ray, RayHit};
use crate::scene::{BsdfEvent, Scene};
use crate::spectrum::Spectrum;

/// Geometric context at a path vertex
#[derive(Debug, Clone, Copy)]
pub struct HitPoint {
    pub p: Vec3,
    /// Geometric normal, oriented toward the front side
    pub geometry_n: Vec3,
    /// Interpolated shading normal, oriented toward the front side
    pub shade_n: Vec3,
    /// True when the ray arrived from the front side
    pub into_object: bool,
}

impl HitPoint {
    /// Shading normal oriented toward the side the path landed on
    pub fn landing_shade_n(&self) -> Vec3 {
        if self.into_object {
            self.shade_n
        } else {
            -self.shade_n
        }
    }

    /// Geometric normal oriented toward the side the path landed on
    pub fn landing_geometry_n(&self) -> Vec3 {
        if self.into_object {
            self.geometry_n
        } else {
            -self.geometry_n
        }
    }
}

/// Opaque-to-the-core volume bookkeeping carried along a path
///
/// Hosts that track participating media map `current_volume` to their own
/// volume table; the core only copies the value around.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeInfo {
    pub current_volume: Option<u32>,
}

/// Result of evaluating a BSDF toward a known direction
#[derive(Debug, Clone, Copy)]
pub struct BsdfEval {
    /// `f(wi, wo) * |cos(n, wi)|`
    pub value: Spectrum,
    pub event: BsdfEvent,
    pub direct_pdf_w: f32,
    pub reverse_pdf_w: f32,
}

/// Result of sampling a BSDF
#[derive(Debug, Clone, Copy)]
pub struct BsdfSample {
    pub dir: Vec3,
    /// `f * |cos| / pdf`, ready to multiply into the path throughput
    pub value: Spectrum,
    pub pdf_w: f32,
    pub cos_dir: f32,
    pub event: BsdfEvent,
}

/// A BSDF snapshot at a hit point
pub trait Bsdf: Send + Sync {
    fn hit_point(&self) -> &HitPoint;

    /// Evaluate toward `light_dir` (world space); `None` when the direction
    /// is below the surface or the BSDF is black there.
    fn evaluate(&self, light_dir: Vec3) -> Option<BsdfEval>;

    /// Sample an outgoing direction; `None` on a zero-probability sample.
    fn sample(&self, u0: f32, u1: f32) -> Option<BsdfSample>;

    /// Forward and reverse pdfs toward `light_dir`
    fn pdf(&self, light_dir: Vec3) -> (f32, f32);

    /// Hemispherical-hemispherical reflectance estimate, used to weight
    /// cached radiance.
    fn evaluate_total(&self) -> Spectrum;

    fn event_types(&self) -> BsdfEvent;

    fn is_delta(&self) -> bool {
        self.event_types().is_specular()
    }

    fn is_volume(&self) -> bool {
        false
    }

    /// Roughly "how mirror-like": 0 is ideal diffuse, 1 is a delta lobe
    fn glossiness(&self) -> f32 {
        0.0
    }

    fn is_photon_gi_enabled(&self) -> bool {
        !self.is_delta()
    }

    /// Transparency for shadow rays through null/alpha-cutout materials
    fn pass_through_transparency(&self, _dir: Vec3) -> Spectrum {
        Spectrum::BLACK
    }

    /// Offset origin for a secondary ray leaving in `dir`
    fn ray_origin(&self, dir: Vec3) -> Vec3 {
        let hp = self.hit_point();
        let n = if dir.dot(hp.geometry_n) >= 0.0 {
            hp.geometry_n
        } else {
            -hp.geometry_n
        };
        hp.p + n * 1e-4
    }
}

/// Direct-lighting sample toward a point
#[derive(Debug, Clone, Copy)]
pub struct Illumination {
    pub dir: Vec3,
    pub distance: f32,
    pub direct_pdf_w: f32,
    pub emission_pdf_w: f32,
    pub cos_at_light: f32,
    pub radiance: Spectrum,
}

/// Emission sample leaving a light
#[derive(Debug, Clone, Copy)]
pub struct Emission {
    pub origin: Vec3,
    pub dir: Vec3,
    pub emission_pdf_w: f32,
    pub direct_pdf_w: f32,
    pub cos_at_light: f32,
    pub radiance: Spectrum,
}

/// A light source as the core sees it
pub trait LightSource: Send + Sync {
    /// Stable index of this light in the scene's light table
    fn light_scene_index(&self) -> u32;

    fn light_group(&self) -> u32 {
        0
    }

    /// Emitted power used by the power-based strategies
    fn power(&self) -> f32;

    fn is_environmental(&self) -> bool {
        false
    }

    /// Sample a shadow-ray connection from `p` to the light
    fn illuminate(&self, p: Vec3, u0: f32, u1: f32, u2: f32) -> Option<Illumination>;

    /// Sample a photon leaving the light
    fn emit(&self, u: [f32; 5]) -> Option<Emission>;

    /// Radiance arriving from `dir`, for environment lights
    fn radiance(&self, _dir: Vec3) -> Option<(Spectrum, f32, f32)> {
        None
    }

    /// Map a world direction into the light's local frame (environment
    /// lights with a rotated mapping override this)
    fn world_to_light(&self, dir: Vec3) -> Vec3 {
        dir
    }
}

/// The host camera
pub trait Camera: Send + Sync {
    /// `[x_min, x_max, y_min, y_max]` of the film region in pixels
    fn film_sub_region(&self) -> [u32; 4];

    fn generate_ray(
        &self,
        time: f32,
        film_x: f32,
        film_y: f32,
        u0: f32,
        u1: f32,
    ) -> (Ray, VolumeInfo);

    /// Map a uniform sample to a shutter time
    fn generate_ray_time(&self, u: f32) -> f32 {
        u
    }
}

/// Resolves a ray hit into a BSDF snapshot
///
/// Returning `None` declares the hit pass-through (null material or alpha
/// cutout); the core continues the ray behind it. `pass_through_event` is a
/// uniform sample for stochastic transparency and volume-scattering
/// decisions.
pub trait SurfaceShader: Send + Sync {
    fn bsdf_at(
        &self,
        scene: &Scene,
        ray: &Ray,
        hit: &RayHit,
        volume: &VolumeInfo,
        pass_through_event: f32,
    ) -> Option<Arc<dyn Bsdf>>;
}

/// Destination for weighted pixel contributions
pub trait Film: Send + Sync {
    fn add_sample(&self, x: u32, y: u32, radiance: Spectrum, weight: f32);
}
