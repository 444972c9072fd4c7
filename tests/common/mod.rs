#![allow(dead_code)]
//! Shared mock host types for integration tests
//!
//! A minimal diffuse-only host: lambertian BSDFs, point and uniform
//! environment lights, and a downward-looking orthographic camera. Enough
//! to exercise the caches end-to-end without a real renderer.

use std::sync::Arc;

use glam::Vec3;

use photon_engine::geometry::Frame;
use photon_engine::sampling::{concentric_sample_disk, uniform_sample_sphere};
use photon_engine::scene::{
    Bsdf, BsdfEval, BsdfSample, Camera, Emission, HitPoint, Illumination, LightSource,
    SurfaceShader, VolumeInfo,
};
use photon_engine::{
    BsdfEvent, BvhBuilderType, BvhParams, Ray, RayHit, RenderResult, Scene, SceneMesh, Spectrum,
    TriangleMesh, VertexBuffer,
};

/// Lambertian BSDF snapshot
pub struct DiffuseBsdf {
    hit: HitPoint,
    albedo: Spectrum,
}

impl DiffuseBsdf {
    pub fn new(hit: HitPoint, albedo: Spectrum) -> Self {
        Self { hit, albedo }
    }

    /// Standalone snapshot for query-only tests
    pub fn at(p: Vec3, n: Vec3, albedo: Spectrum) -> Self {
        Self {
            hit: HitPoint {
                p,
                geometry_n: n,
                shade_n: n,
                into_object: true,
            },
            albedo,
        }
    }
}

impl Bsdf for DiffuseBsdf {
    fn hit_point(&self) -> &HitPoint {
        &self.hit
    }

    fn evaluate(&self, light_dir: Vec3) -> Option<BsdfEval> {
        let n = self.hit.landing_shade_n();
        let cos = n.dot(light_dir);
        if cos <= 0.0 {
            return None;
        }
        Some(BsdfEval {
            value: self.albedo * (cos / std::f32::consts::PI),
            event: BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
            direct_pdf_w: cos / std::f32::consts::PI,
            reverse_pdf_w: cos / std::f32::consts::PI,
        })
    }

    fn sample(&self, u0: f32, u1: f32) -> Option<BsdfSample> {
        let n = self.hit.landing_shade_n();
        let frame = Frame::from_z(n);
        let (dx, dy) = concentric_sample_disk(u0, u1);
        let z2 = 1.0 - dx * dx - dy * dy;
        if z2 <= 1e-6 {
            return None;
        }
        let z = z2.sqrt();
        Some(BsdfSample {
            dir: frame.to_world(Vec3::new(dx, dy, z)),
            // f * cos / pdf for a lambertian is just the albedo
            value: self.albedo,
            pdf_w: z / std::f32::consts::PI,
            cos_dir: z,
            event: BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
        })
    }

    fn pdf(&self, light_dir: Vec3) -> (f32, f32) {
        let cos = self.hit.landing_shade_n().dot(light_dir).max(0.0);
        let pdf = cos / std::f32::consts::PI;
        (pdf, pdf)
    }

    fn evaluate_total(&self) -> Spectrum {
        self.albedo
    }

    fn event_types(&self) -> BsdfEvent {
        BsdfEvent::DIFFUSE | BsdfEvent::REFLECT
    }
}

/// Shades every surface with the same lambertian albedo
pub struct DiffuseShader {
    pub albedo: Spectrum,
}

impl SurfaceShader for DiffuseShader {
    fn bsdf_at(
        &self,
        scene: &Scene,
        ray: &Ray,
        hit: &RayHit,
        _volume: &VolumeInfo,
        _pass_through_event: f32,
    ) -> Option<Arc<dyn Bsdf>> {
        let object = &scene.objects()[hit.mesh_index as usize];
        let local_n = object.base().geometric_normal(hit.triangle_index);
        let n = object
            .local_to_world(ray.time)
            .transform_normal(local_n)
            .normalize();
        let into_object = ray.direction.dot(n) < 0.0;
        Some(Arc::new(DiffuseBsdf::new(
            HitPoint {
                p: ray.at(hit.t),
                geometry_n: n,
                shade_n: n,
                into_object,
            },
            self.albedo,
        )))
    }
}

/// Omnidirectional point light
pub struct PointLight {
    pub index: u32,
    pub position: Vec3,
    pub intensity: Spectrum,
}

impl LightSource for PointLight {
    fn light_scene_index(&self) -> u32 {
        self.index
    }

    fn power(&self) -> f32 {
        self.intensity.y() * 4.0 * std::f32::consts::PI
    }

    fn illuminate(&self, p: Vec3, _u0: f32, _u1: f32, _u2: f32) -> Option<Illumination> {
        let to_light = self.position - p;
        let distance2 = to_light.length_squared();
        if distance2 == 0.0 {
            return None;
        }
        let distance = distance2.sqrt();
        Some(Illumination {
            dir: to_light / distance,
            distance,
            direct_pdf_w: 1.0,
            emission_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            cos_at_light: 1.0,
            radiance: self.intensity / distance2,
        })
    }

    fn emit(&self, u: [f32; 5]) -> Option<Emission> {
        Some(Emission {
            origin: self.position,
            dir: uniform_sample_sphere(u[0], u[1]),
            emission_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            direct_pdf_w: 1.0,
            cos_at_light: 1.0,
            radiance: self.intensity,
        })
    }
}

/// Constant-radiance environment sphere
pub struct UniformEnvLight {
    pub index: u32,
    pub radiance: Spectrum,
}

impl LightSource for UniformEnvLight {
    fn light_scene_index(&self) -> u32 {
        self.index
    }

    fn power(&self) -> f32 {
        self.radiance.y() * 4.0 * std::f32::consts::PI
    }

    fn is_environmental(&self) -> bool {
        true
    }

    fn illuminate(&self, _p: Vec3, u0: f32, u1: f32, _u2: f32) -> Option<Illumination> {
        Some(Illumination {
            dir: uniform_sample_sphere(u0, u1),
            distance: 1e30,
            direct_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            emission_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            cos_at_light: 1.0,
            radiance: self.radiance,
        })
    }

    fn emit(&self, u: [f32; 5]) -> Option<Emission> {
        let dir = uniform_sample_sphere(u[0], u[1]);
        Some(Emission {
            origin: dir * -1e4,
            dir,
            emission_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            direct_pdf_w: 1.0 / (4.0 * std::f32::consts::PI),
            cos_at_light: 1.0,
            radiance: self.radiance,
        })
    }

    fn radiance(&self, _dir: Vec3) -> Option<(Spectrum, f32, f32)> {
        Some((
            self.radiance,
            1.0 / (4.0 * std::f32::consts::PI),
            1.0 / (4.0 * std::f32::consts::PI),
        ))
    }
}

/// Orthographic camera looking down -Y over a rectangle of the y = `height`
/// plane
pub struct TopDownCamera {
    pub x_range: (f32, f32),
    pub z_range: (f32, f32),
    pub height: f32,
    pub film_width: u32,
    pub film_height: u32,
}

impl Camera for TopDownCamera {
    fn film_sub_region(&self) -> [u32; 4] {
        [0, self.film_width - 1, 0, self.film_height - 1]
    }

    fn generate_ray(
        &self,
        time: f32,
        film_x: f32,
        film_y: f32,
        _u0: f32,
        _u1: f32,
    ) -> (Ray, VolumeInfo) {
        let fx = (film_x / self.film_width as f32).clamp(0.0, 1.0);
        let fy = (film_y / self.film_height as f32).clamp(0.0, 1.0);
        let x = self.x_range.0 + fx * (self.x_range.1 - self.x_range.0);
        let z = self.z_range.0 + fy * (self.z_range.1 - self.z_range.0);
        let ray = Ray::new(Vec3::new(x, self.height, z), -Vec3::Y).with_time(time);
        (ray, VolumeInfo::default())
    }
}

/// Quad in the y=0 plane is the canonical test surface; all quads are two
/// triangles with CCW winding so the normal points along `normal`.
pub fn quad(
    corner: Vec3,
    edge_u: Vec3,
    edge_v: Vec3,
) -> Arc<TriangleMesh> {
    let mut vb = VertexBuffer::with_capacity(4);
    vb.push(corner);
    vb.push(corner + edge_u);
    vb.push(corner + edge_u + edge_v);
    vb.push(corner + edge_v);
    Arc::new(TriangleMesh::new(vb, vec![[0, 1, 2], [0, 2, 3]]).unwrap())
}

/// Floor quad at y=0 with +Y normal covering the given ranges
pub fn floor_quad(x0: f32, x1: f32, z0: f32, z1: f32) -> Arc<TriangleMesh> {
    // Winding chosen so (p1-p0) x (p2-p0) = +Y
    quad(
        Vec3::new(x0, 0.0, z0),
        Vec3::new(0.0, 0.0, z1 - z0),
        Vec3::new(x1 - x0, 0.0, 0.0),
    )
}

pub fn build_scene(
    objects: Vec<SceneMesh>,
    lights: Vec<Arc<dyn LightSource>>,
    camera: Arc<dyn Camera>,
    albedo: Spectrum,
) -> RenderResult<Scene> {
    Scene::new(
        objects,
        lights,
        camera,
        Arc::new(DiffuseShader { albedo }),
        BvhBuilderType::Sah,
        &BvhParams::default(),
    )
}
