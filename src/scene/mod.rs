//! Scene assembly and the host-facing seam
//!
//! The core owns geometry and acceleration; shading, light emission and
//! camera models stay on the host side behind the traits in this module.
//! Cache builders hold BSDF snapshots as `Arc<dyn Bsdf>` so a particle can
//! be revisited long after the path that produced it finished.

mod traits;

pub use traits::{
    Bsdf, BsdfEval, BsdfSample, Camera, Emission, Film, HitPoint, Illumination, LightSource,
    SurfaceShader, VolumeInfo,
};

use std::sync::Arc;

use crate::bvh::{BvhBuilderType, BvhParams, SceneBvh};
use crate::error::RenderResult;
use crate::geometry::{Bbox, Ray, RayHit};
use crate::mesh::SceneMesh;

/// BSDF scattering event bitflags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BsdfEvent(pub u32);

impl BsdfEvent {
    pub const NONE: BsdfEvent = BsdfEvent(0);
    pub const DIFFUSE: BsdfEvent = BsdfEvent(1 << 0);
    pub const GLOSSY: BsdfEvent = BsdfEvent(1 << 1);
    pub const SPECULAR: BsdfEvent = BsdfEvent(1 << 2);
    pub const REFLECT: BsdfEvent = BsdfEvent(1 << 3);
    pub const TRANSMIT: BsdfEvent = BsdfEvent(1 << 4);

    pub fn contains(&self, other: BsdfEvent) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_specular(&self) -> bool {
        self.contains(BsdfEvent::SPECULAR)
    }

    pub fn is_diffuse(&self) -> bool {
        self.contains(BsdfEvent::DIFFUSE)
    }
}

impl std::ops::BitOr for BsdfEvent {
    type Output = BsdfEvent;
    fn bitor(self, o: BsdfEvent) -> BsdfEvent {
        BsdfEvent(self.0 | o.0)
    }
}

/// The scene the core renders from: objects, lights, camera and the
/// acceleration structure, read-only for the duration of a render.
pub struct Scene {
    objects: Vec<SceneMesh>,
    lights: Vec<Arc<dyn LightSource>>,
    camera: Arc<dyn Camera>,
    shader: Arc<dyn SurfaceShader>,
    accel: SceneBvh,
    world_bbox: Bbox,
}

impl Scene {
    pub fn new(
        objects: Vec<SceneMesh>,
        lights: Vec<Arc<dyn LightSource>>,
        camera: Arc<dyn Camera>,
        shader: Arc<dyn SurfaceShader>,
        builder: BvhBuilderType,
        params: &BvhParams,
    ) -> RenderResult<Self> {
        let accel = SceneBvh::build(&objects, builder, params)?;
        let world_bbox = objects
            .iter()
            .fold(Bbox::EMPTY, |b, o| b.union(&o.world_bbox()));
        Ok(Self {
            objects,
            lights,
            camera,
            shader,
            accel,
            world_bbox,
        })
    }

    pub fn objects(&self) -> &[SceneMesh] {
        &self.objects
    }

    pub fn lights(&self) -> &[Arc<dyn LightSource>] {
        &self.lights
    }

    pub fn camera(&self) -> &Arc<dyn Camera> {
        &self.camera
    }

    pub fn shader(&self) -> &Arc<dyn SurfaceShader> {
        &self.shader
    }

    pub fn accel(&self) -> &SceneBvh {
        &self.accel
    }

    pub fn world_bbox(&self) -> Bbox {
        self.world_bbox
    }

    /// The first environment light, if the scene has one
    pub fn env_light(&self) -> Option<&Arc<dyn LightSource>> {
        self.lights.iter().find(|l| l.is_environmental())
    }

    pub fn intersect(&self, ray: &Ray) -> RayHit {
        self.accel.intersect(ray)
    }

    pub fn intersect_any(&self, ray: &Ray) -> bool {
        self.accel.intersect_any(ray)
    }

    /// Trace a ray to the first shaded surface, passing through null/cutout
    /// hits the host declines to shade. `pass_through_event` feeds the
    /// host's stochastic transparency and volume-scattering decisions.
    pub fn trace_through(
        &self,
        ray: &Ray,
        volume: &VolumeInfo,
        pass_through_event: f32,
    ) -> Option<(RayHit, Arc<dyn Bsdf>)> {
        const MAX_PASS_THROUGH: u32 = 32;

        let mut ray = *ray;
        for _ in 0..MAX_PASS_THROUGH {
            let hit = self.accel.intersect(&ray);
            if hit.is_miss() {
                return None;
            }
            match self
                .shader
                .bsdf_at(self, &ray, &hit, volume, pass_through_event)
            {
                Some(bsdf) => return Some((hit, bsdf)),
                None => {
                    // Pass-through surface: continue from just past the hit,
                    // keeping whatever segment length is left
                    let remaining = ray.t_max - hit.t;
                    let origin = ray.at(hit.t);
                    ray.update(origin, ray.direction);
                    if remaining <= ray.t_min {
                        return None;
                    }
                    ray.t_max = remaining;
                }
            }
        }
        None
    }

    /// Occlusion query that honors pass-through surfaces
    pub fn occluded(&self, ray: &Ray, volume: &VolumeInfo, pass_through_event: f32) -> bool {
        self.trace_through(ray, volume, pass_through_event).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_flags() {
        let e = BsdfEvent::DIFFUSE | BsdfEvent::REFLECT;
        assert!(e.is_diffuse());
        assert!(!e.is_specular());
        assert!(e.contains(BsdfEvent::REFLECT));
        assert!(!e.contains(BsdfEvent::TRANSMIT));
    }
}
