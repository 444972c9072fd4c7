//! Photon-GI caches
//!
//! Two density-estimation caches built from a photon-tracing pass: the
//! indirect cache stores pre-integrated outgoing radiance at visibility
//! points (one BVH lookup replaces a full diffuse bounce), the caustic
//! cache keeps raw photons and evaluates the BSDF against each at query
//! time. Photon workers hand their batches to the collector over a
//! channel; only photons landing near a visibility point are kept.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use glam::Vec3;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::Props;
use crate::error::{RenderError, RenderResult};
use crate::geometry::Ray;
use crate::index::{accepts_entry, IndexBvh, SpatialEntry, VisibilityPoint};
use crate::sampling::Distribution1D;
use crate::scene::{Bsdf, Scene, VolumeInfo};
use crate::spectrum::{Spectrum, SpectrumGroup};
use crate::utils::{film_to_scene_radius, RadiusEstimateParams};

use super::visibility::{trace_visibility, VisibilityHandler, VisibilityParams};
use super::CancelToken;

/// Photons per worker block
const PHOTON_BLOCK: u32 = 8192;
/// Russian roulette depth and survival floor for photon paths
const RR_DEPTH: u32 = 3;
const RR_IMPORTANCE_CAP: f32 = 0.5;
/// Grazing-angle rejection threshold for caustic connections
const COS_EPSILON: f32 = 1e-4;

/// Cache visualization modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PgicDebugType {
    #[default]
    None,
    ShowIndirect,
    ShowCaustic,
    ShowIndirectPathMix,
}

impl PgicDebugType {
    pub fn tag(&self) -> &'static str {
        match self {
            PgicDebugType::None => "none",
            PgicDebugType::ShowIndirect => "showindirect",
            PgicDebugType::ShowCaustic => "showcaustic",
            PgicDebugType::ShowIndirectPathMix => "showindirectpathmix",
        }
    }

    pub fn from_tag(tag: &str) -> RenderResult<Self> {
        match tag {
            "none" => Ok(PgicDebugType::None),
            "showindirect" => Ok(PgicDebugType::ShowIndirect),
            "showcaustic" => Ok(PgicDebugType::ShowCaustic),
            "showindirectpathmix" => Ok(PgicDebugType::ShowIndirectPathMix),
            other => Err(RenderError::invalid_parameter(format!(
                "unknown photongi debug type: {}",
                other
            ))),
        }
    }
}

/// Photon-tracing tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgicPhotonParams {
    /// Photon paths to emit
    pub max_path_count: u32,
    pub max_path_depth: u32,
    pub time_start: f32,
    pub time_end: f32,
}

/// Caustic-cache lookup tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgicCausticParams {
    pub lookup_radius: f32,
    pub lookup_normal_angle: f32,
}

/// Photon-GI parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotonGiParams {
    pub indirect_enabled: bool,
    pub caustic_enabled: bool,
    pub debug: PgicDebugType,
    /// BSDFs more mirror-like than this bypass the cache and are sampled
    /// directly
    pub glossiness_usage_threshold: f32,
    pub photon: PgicPhotonParams,
    pub visibility: VisibilityParams,
    pub caustic: PgicCausticParams,
}

impl Default for PhotonGiParams {
    fn default() -> Self {
        Self {
            indirect_enabled: false,
            caustic_enabled: false,
            debug: PgicDebugType::None,
            glossiness_usage_threshold: 0.9,
            photon: PgicPhotonParams {
                max_path_count: 500_000,
                max_path_depth: 4,
                time_start: 0.0,
                time_end: 1.0,
            },
            visibility: VisibilityParams {
                max_path_depth: 4,
                max_sample_count: 1024 * 1024,
                target_hit_rate: 0.99,
                lookup_radius: 0.0,
                lookup_normal_angle: 10.0,
                time_start: 0.0,
                time_end: 1.0,
            },
            caustic: PgicCausticParams {
                lookup_radius: 0.15,
                lookup_normal_angle: 10.0,
            },
        }
    }
}

impl PhotonGiParams {
    pub fn from_props(cfg: &Props) -> RenderResult<Self> {
        let d = Self::default();
        Ok(Self {
            indirect_enabled: cfg.get_bool("photongi.indirect.enabled", d.indirect_enabled),
            caustic_enabled: cfg.get_bool("photongi.caustic.enabled", d.caustic_enabled),
            debug: PgicDebugType::from_tag(&cfg.get_str("photongi.debug.type", "none"))?,
            glossiness_usage_threshold: cfg
                .get_f32(
                    "photongi.glossinessusagethreshold",
                    d.glossiness_usage_threshold,
                )
                .clamp(0.0, 1.0),
            photon: PgicPhotonParams {
                max_path_count: cfg
                    .get_u32("photongi.photon.maxcount", d.photon.max_path_count)
                    .max(1),
                max_path_depth: cfg
                    .get_u32("photongi.photon.maxdepth", d.photon.max_path_depth)
                    .max(1),
                time_start: d.photon.time_start,
                time_end: d.photon.time_end,
            },
            visibility: VisibilityParams {
                max_sample_count: cfg.get_u32(
                    "photongi.visibility.maxsamplescount",
                    d.visibility.max_sample_count,
                ),
                target_hit_rate: cfg.get_f32(
                    "photongi.visibility.targethitrate",
                    d.visibility.target_hit_rate,
                ),
                lookup_radius: cfg
                    .get_f32("photongi.visibility.lookup.radius", d.visibility.lookup_radius)
                    .max(0.0),
                lookup_normal_angle: cfg.get_f32(
                    "photongi.visibility.lookup.normalangle",
                    d.visibility.lookup_normal_angle,
                ),
                ..d.visibility
            },
            caustic: PgicCausticParams {
                lookup_radius: cfg
                    .get_f32("photongi.caustic.lookup.radius", d.caustic.lookup_radius)
                    .max(1e-6),
                lookup_normal_angle: cfg.get_f32(
                    "photongi.caustic.lookup.normalangle",
                    d.caustic.lookup_normal_angle,
                ),
            },
        })
    }

    pub fn to_props(&self) -> Props {
        Props::new()
            .with("photongi.indirect.enabled", self.indirect_enabled)
            .with("photongi.caustic.enabled", self.caustic_enabled)
            .with("photongi.debug.type", self.debug.tag())
            .with(
                "photongi.glossinessusagethreshold",
                self.glossiness_usage_threshold,
            )
            .with("photongi.photon.maxcount", self.photon.max_path_count)
            .with("photongi.photon.maxdepth", self.photon.max_path_depth)
            .with("photongi.caustic.lookup.radius", self.caustic.lookup_radius)
            .with(
                "photongi.caustic.lookup.normalangle",
                self.caustic.lookup_normal_angle,
            )
    }
}

/// A raw photon as stored by the caustic cache
#[derive(Debug, Clone, Copy)]
pub struct Photon {
    pub p: Vec3,
    /// Direction of travel when it landed
    pub d: Vec3,
    /// Light group it came from
    pub light_id: u32,
    pub alpha: Spectrum,
    pub landing_surface_normal: Vec3,
    pub is_volume: bool,
}

impl SpatialEntry for Photon {
    fn position(&self) -> Vec3 {
        self.p
    }
}

/// Pre-integrated outgoing radiance at a cached point
#[derive(Debug, Clone)]
pub struct RadiancePhoton {
    pub p: Vec3,
    pub n: Vec3,
    pub outgoing_radiance: SpectrumGroup,
    pub is_volume: bool,
}

impl SpatialEntry for RadiancePhoton {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for RadiancePhoton {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// Visibility particle with local-density statistics
struct PgicVisibilityParticle {
    p: Vec3,
    n: Vec3,
    bsdf_eval_total: Spectrum,
    is_volume: bool,
    hits_accumulated_distance: f32,
    hits_count: u32,
}

impl SpatialEntry for PgicVisibilityParticle {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for PgicVisibilityParticle {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

struct PgicVisibilityBuilder {
    glossiness_usage_threshold: f32,
}

impl PgicVisibilityBuilder {
    fn is_enabled(&self, bsdf: &dyn Bsdf) -> bool {
        bsdf.is_photon_gi_enabled() && bsdf.glossiness() <= self.glossiness_usage_threshold
    }
}

impl VisibilityHandler for PgicVisibilityBuilder {
    type Particle = PgicVisibilityParticle;

    fn process_hit_point(
        &self,
        bsdf: &Arc<dyn Bsdf>,
        _volume: &VolumeInfo,
        out: &mut Vec<Self::Particle>,
    ) -> bool {
        if self.is_enabled(bsdf.as_ref()) {
            let total = bsdf.evaluate_total();
            debug_assert!(total.is_valid());
            let hp = bsdf.hit_point();
            out.push(PgicVisibilityParticle {
                p: hp.p,
                n: hp.landing_geometry_n(),
                bsdf_eval_total: total,
                is_volume: bsdf.is_volume(),
                hits_accumulated_distance: 0.0,
                hits_count: 0,
            });
        }
        true
    }

    fn merge(&self, existing: &mut Self::Particle, incoming: Self::Particle) {
        existing.hits_accumulated_distance += existing.p.distance(incoming.p);
        existing.hits_count += 1;
    }
}

/// Caustic photon BVH with its normalization state
struct PhotonBvh {
    bvh: IndexBvh<Photon>,
    normal_cos_angle: f32,
    photon_traced_count: u32,
}

impl PhotonBvh {
    /// Density-estimate the caustic radiance arriving at `bsdf`
    ///
    /// Returning zero photons yields a black group, never NaN.
    fn connect_all_near_entries(&self, bsdf: &dyn Bsdf) -> SpectrumGroup {
        let hp = bsdf.hit_point();
        let p = hp.p;
        let n = hp.landing_geometry_n();
        let is_volume = bsdf.is_volume();

        let mut result = SpectrumGroup::new();
        self.bvh.for_each_near_entry(p, |photon, _d2| {
            if photon.is_volume != is_volume {
                return;
            }
            if !is_volume
                && (n.dot(-photon.d) <= COS_EPSILON
                    || n.dot(photon.landing_surface_normal) <= self.normal_cos_angle)
            {
                return;
            }
            if let Some(eval) = bsdf.evaluate(-photon.d) {
                // Evaluate() includes the surface cosine; the density
                // estimation already accounts for it, cancel the factor
                let value = if is_volume {
                    if eval.direct_pdf_w > 0.0 {
                        eval.value / eval.direct_pdf_w
                    } else {
                        return;
                    }
                } else {
                    let cos = hp.landing_shade_n().dot(-photon.d).abs();
                    if cos <= 0.0 {
                        return;
                    }
                    eval.value / cos
                };
                result.add(photon.light_id, photon.alpha * value);
            }
        });

        let radius2 = self.bvh.entry_radius2();
        let kernel = if is_volume {
            4.0 / 3.0 * PI * radius2 * self.bvh.entry_radius()
        } else {
            PI * radius2
        };
        result /= self.photon_traced_count as f32 * kernel;
        result
    }
}

/// Radiance-photon BVH with the lookup normal cone
struct RadiancePhotonBvh {
    bvh: IndexBvh<RadiancePhoton>,
    normal_cos_angle: f32,
}

struct PhotonBatch {
    indirect: Vec<Photon>,
    caustic: Vec<Photon>,
    paths: u32,
}

/// The photon-GI cache pair
pub struct PhotonGiCache {
    params: PhotonGiParams,
    indirect: Option<RadiancePhotonBvh>,
    caustic: Option<PhotonBvh>,
    photon_traced_count: u32,
}

impl PhotonGiCache {
    pub fn new(params: PhotonGiParams) -> Self {
        Self {
            params,
            indirect: None,
            caustic: None,
            photon_traced_count: 0,
        }
    }

    pub fn params(&self) -> &PhotonGiParams {
        &self.params
    }

    pub fn debug_type(&self) -> PgicDebugType {
        self.params.debug
    }

    /// Whether this BSDF should use the cache at all; near-specular
    /// surfaces are sampled directly since the cache is too coarse for
    /// them.
    pub fn is_photon_gi_enabled(&self, bsdf: &dyn Bsdf) -> bool {
        bsdf.is_photon_gi_enabled()
            && bsdf.glossiness() <= self.params.glossiness_usage_threshold
    }

    pub fn has_indirect(&self) -> bool {
        self.indirect.is_some()
    }

    pub fn has_caustic(&self) -> bool {
        self.caustic.is_some()
    }

    /// Build the enabled caches for `scene`
    pub fn build(&mut self, scene: &Scene, cancel: &CancelToken) -> RenderResult<()> {
        if !self.params.indirect_enabled && !self.params.caustic_enabled {
            return Ok(());
        }
        if scene.lights().is_empty() {
            info!("photon GI: no lights, caches disabled");
            return Ok(());
        }

        if self.params.visibility.lookup_radius == 0.0 {
            self.params.visibility.lookup_radius = film_to_scene_radius(
                scene,
                &RadiusEstimateParams {
                    time_start: self.params.photon.time_start,
                    time_end: self.params.photon.time_end,
                    ..Default::default()
                },
                |bsdf| bsdf.is_photon_gi_enabled(),
            );
            info!(
                "photon GI best lookup radius: {}",
                self.params.visibility.lookup_radius
            );
        }

        // Visibility pass: where are photons worth keeping
        let handler = PgicVisibilityBuilder {
            glossiness_usage_threshold: self.params.glossiness_usage_threshold,
        };
        let (particles, _stats) =
            trace_visibility(scene, &handler, &self.params.visibility, cancel);
        if particles.is_empty() {
            warn!("photon GI: nothing visible is cache-enabled, caches disabled");
            return Ok(());
        }
        info!("photon GI visibility particles: {}", particles.len());

        let visibility_bvh = IndexBvh::new(particles, self.params.visibility.lookup_radius);
        let visibility_cos = self
            .params
            .visibility
            .lookup_normal_angle
            .to_radians()
            .cos();

        // Photon pass
        let (indirect_photons, caustic_photons, traced) =
            self.trace_photons(scene, &visibility_bvh, visibility_cos, cancel);
        info!(
            "photon GI traced {} paths: {} indirect, {} caustic photons",
            traced,
            indirect_photons.len(),
            caustic_photons.len()
        );
        if traced == 0 {
            return Ok(());
        }
        self.photon_traced_count = traced;

        if self.params.indirect_enabled && !indirect_photons.is_empty() {
            self.indirect = Some(self.build_radiance_photons(
                &visibility_bvh,
                indirect_photons,
                traced,
            ));
        }

        if self.params.caustic_enabled && !caustic_photons.is_empty() {
            self.caustic = Some(PhotonBvh {
                bvh: IndexBvh::new(caustic_photons, self.params.caustic.lookup_radius),
                normal_cos_angle: self.params.caustic.lookup_normal_angle.to_radians().cos(),
                photon_traced_count: traced,
            });
        }

        Ok(())
    }

    fn trace_photons(
        &self,
        scene: &Scene,
        visibility_bvh: &IndexBvh<PgicVisibilityParticle>,
        visibility_cos: f32,
        cancel: &CancelToken,
    ) -> (Vec<Photon>, Vec<Photon>, u32) {
        let lights = scene.lights();
        let weights: Vec<f32> = lights.iter().map(|l| l.power().max(0.0)).collect();
        let light_distribution = Distribution1D::new(&weights);

        let thread_count = num_cpus::get();
        let counter = AtomicU32::new(0);
        let (sender, receiver) = unbounded::<PhotonBatch>();
        let params = &self.params;

        std::thread::scope(|scope| {
            for thread_index in 0..thread_count {
                let sender = sender.clone();
                let counter = &counter;
                let light_distribution = &light_distribution;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(0x7060_5040 + thread_index as u64);
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let start = counter.fetch_add(PHOTON_BLOCK, Ordering::Relaxed);
                        if start >= params.photon.max_path_count {
                            break;
                        }
                        let count = PHOTON_BLOCK.min(params.photon.max_path_count - start);

                        let mut batch = PhotonBatch {
                            indirect: Vec::new(),
                            caustic: Vec::new(),
                            paths: count,
                        };
                        for _ in 0..count {
                            trace_one_photon_path(
                                scene,
                                params,
                                light_distribution,
                                visibility_bvh,
                                visibility_cos,
                                &mut rng,
                                &mut batch,
                            );
                        }
                        if sender.send(batch).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(sender);

            // Collector: fold worker batches as they arrive
            let mut indirect = Vec::new();
            let mut caustic = Vec::new();
            let mut traced = 0u32;
            for batch in receiver {
                indirect.extend(batch.indirect);
                caustic.extend(batch.caustic);
                traced += batch.paths;
            }
            (indirect, caustic, traced)
        })
    }

    fn build_radiance_photons(
        &self,
        visibility_bvh: &IndexBvh<PgicVisibilityParticle>,
        indirect_photons: Vec<Photon>,
        traced: u32,
    ) -> RadiancePhotonBvh {
        info!(
            "photon GI building radiance photons over {} entries",
            visibility_bvh.entries().len()
        );
        let radius = self.params.visibility.lookup_radius;
        let radius2 = radius * radius;
        let normal_cos = self
            .params
            .visibility
            .lookup_normal_angle
            .to_radians()
            .cos();
        let photon_bvh = IndexBvh::new(indirect_photons, radius);

        let radiance_photons: Vec<RadiancePhoton> = visibility_bvh
            .entries()
            .par_iter()
            .map(|particle| {
                let mut gathered = SpectrumGroup::new();
                photon_bvh.for_each_near_entry(particle.p, |photon, _d2| {
                    if photon.is_volume == particle.is_volume
                        && (particle.is_volume
                            || photon.landing_surface_normal.dot(particle.n) > normal_cos)
                    {
                        gathered.add(photon.light_id, photon.alpha);
                    }
                });

                // Irradiance over the gather disc, turned into outgoing
                // radiance with the cached reflectance
                let kernel = if particle.is_volume {
                    4.0 / 3.0 * PI * radius2 * radius
                } else {
                    PI * radius2
                };
                gathered /= traced as f32 * kernel;

                let mut outgoing = gathered;
                outgoing.scale_by(particle.bsdf_eval_total / PI);

                RadiancePhoton {
                    p: particle.p,
                    n: particle.n,
                    outgoing_radiance: outgoing,
                    is_volume: particle.is_volume,
                }
            })
            .collect();

        RadiancePhotonBvh {
            bvh: IndexBvh::new(radiance_photons, radius),
            normal_cos_angle: normal_cos,
        }
    }

    /// Nearest cached radiance for indirect illumination
    pub fn indirect_radiance(&self, bsdf: &dyn Bsdf) -> Option<&RadiancePhoton> {
        let cache = self.indirect.as_ref()?;
        if !self.is_photon_gi_enabled(bsdf) {
            return None;
        }
        let hp = bsdf.hit_point();
        cache.bvh.nearest_entry(hp.p, |e| {
            accepts_entry(
                e,
                hp.landing_geometry_n(),
                bsdf.is_volume(),
                cache.normal_cos_angle,
            )
        })
    }

    /// Density-estimated caustic radiance at `bsdf`
    pub fn caustic_radiance(&self, bsdf: &dyn Bsdf) -> SpectrumGroup {
        match &self.caustic {
            Some(cache) if self.is_photon_gi_enabled(bsdf) => {
                cache.connect_all_near_entries(bsdf)
            }
            _ => SpectrumGroup::new(),
        }
    }

    /// Photon paths used for normalization (0 before `build`)
    pub fn photon_traced_count(&self) -> u32 {
        self.photon_traced_count
    }
}

fn trace_one_photon_path(
    scene: &Scene,
    params: &PhotonGiParams,
    light_distribution: &Distribution1D,
    visibility_bvh: &IndexBvh<PgicVisibilityParticle>,
    visibility_cos: f32,
    rng: &mut StdRng,
    batch: &mut PhotonBatch,
) {
    let lights = scene.lights();
    let (light_index, pick_pdf, _) = light_distribution.sample_discrete(rng.gen());
    if pick_pdf <= 0.0 {
        return;
    }
    let light = &lights[light_index];

    let Some(emission) = light.emit([rng.gen(), rng.gen(), rng.gen(), rng.gen(), rng.gen()])
    else {
        return;
    };
    if emission.emission_pdf_w <= 0.0 || emission.radiance.is_black() {
        return;
    }

    let mut alpha = emission.radiance
        * (emission.cos_at_light.abs() / (emission.emission_pdf_w * pick_pdf));
    let time = params.photon.time_start
        + rng.gen::<f32>() * (params.photon.time_end - params.photon.time_start);
    let mut ray = Ray::new(emission.origin, emission.dir).with_time(time);
    let volume = VolumeInfo::default();

    let mut specular_only_path = true;
    let mut depth = 0u32;
    loop {
        let Some((_hit, bsdf)) = scene.trace_through(&ray, &volume, rng.gen()) else {
            break;
        };
        depth += 1;

        let cache_enabled = bsdf.is_photon_gi_enabled()
            && bsdf.glossiness() <= params.glossiness_usage_threshold;
        // Depth 1 is direct lighting, handled by light sampling
        if cache_enabled && depth > 1 {
            let hp = bsdf.hit_point();
            let landing_n = hp.landing_geometry_n();
            let near_particle = visibility_bvh
                .nearest_entry(hp.p, |e| {
                    accepts_entry(e, landing_n, bsdf.is_volume(), visibility_cos)
                })
                .is_some();
            if near_particle {
                let photon = Photon {
                    p: hp.p,
                    d: ray.direction.normalize(),
                    light_id: light.light_group(),
                    alpha,
                    landing_surface_normal: landing_n,
                    is_volume: bsdf.is_volume(),
                };
                if specular_only_path {
                    if params.caustic_enabled {
                        batch.caustic.push(photon);
                    }
                } else if params.indirect_enabled {
                    batch.indirect.push(photon);
                }
            }
        }

        if depth >= params.photon.max_path_depth {
            break;
        }

        let Some(sample) = bsdf.sample(rng.gen(), rng.gen()) else {
            break;
        };
        if sample.value.is_black() {
            break;
        }
        if !sample.event.is_specular() {
            specular_only_path = false;
        }

        if depth >= RR_DEPTH {
            let prob = sample.value.filter().clamp(RR_IMPORTANCE_CAP, 1.0);
            if prob < rng.gen::<f32>() {
                break;
            }
            alpha /= prob;
        }

        alpha *= sample.value;
        if !alpha.is_valid() {
            break;
        }

        ray.update(bsdf.ray_origin(sample.dir), sample.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_type_tags() {
        for t in [
            PgicDebugType::None,
            PgicDebugType::ShowIndirect,
            PgicDebugType::ShowCaustic,
            PgicDebugType::ShowIndirectPathMix,
        ] {
            assert_eq!(PgicDebugType::from_tag(t.tag()).unwrap(), t);
        }
        assert!(PgicDebugType::from_tag("wat").is_err());
    }

    #[test]
    fn test_props_parsing() {
        let cfg = Props::new()
            .with("photongi.indirect.enabled", true)
            .with("photongi.caustic.enabled", true)
            .with("photongi.debug.type", "showcaustic")
            .with("photongi.glossinessusagethreshold", 0.5f32);
        let params = PhotonGiParams::from_props(&cfg).unwrap();
        assert!(params.indirect_enabled);
        assert!(params.caustic_enabled);
        assert_eq!(params.debug, PgicDebugType::ShowCaustic);
        assert_eq!(params.glossiness_usage_threshold, 0.5);
    }

    #[test]
    fn test_empty_caustic_cache_is_black() {
        let cache = PhotonGiCache::new(PhotonGiParams {
            caustic_enabled: true,
            ..Default::default()
        });
        // No build: queries must yield zero, never NaN
        assert_eq!(cache.photon_traced_count(), 0);
        assert!(!cache.has_caustic());
    }
}
