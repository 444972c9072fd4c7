//! Direct-light-sampling cache
//!
//! At each cached point the reachable contribution of every light is
//! estimated with visibility-sampled shadow rays, giving a discrete
//! distribution over lights that replaces the global strategy for shading
//! points near the entry. Points no light reaches are stored with sampling
//! disabled so queries can skip direct lighting entirely.

use std::sync::Arc;

use glam::Vec3;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::Props;
use crate::error::RenderResult;
use crate::geometry::Ray;
use crate::index::{accepts_entry, IndexOctree, SpatialEntry, VisibilityPoint};
use crate::sampling::Distribution1D;
use crate::scene::{Bsdf, Scene, VolumeInfo};
use crate::utils::{film_to_scene_radius, RadiusEstimateParams, WarnCounter};

use super::visibility::{trace_visibility, VisibilityHandler, VisibilityParams};
use super::CancelToken;

/// Per-entry builder parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DlsEntryParams {
    /// World-unit lookup radius; 0 picks one automatically
    pub radius: f32,
    /// Lookup normal cone, degrees
    pub normal_angle: f32,
    pub max_passes: u32,
    pub convergence_threshold: f32,
    pub warm_up_samples: u32,
    pub merge_passes: u32,
    pub enabled_on_volumes: bool,
}

/// Direct-light-sampling cache parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DlsParams {
    pub entry: DlsEntryParams,
    /// Bins below this fraction of the maximum are zeroed
    pub light_threshold: f32,
    pub target_cache_hit_rate: f32,
    /// Visibility-trace path depth
    pub max_depth: u32,
    pub max_sample_count: u32,
}

impl Default for DlsParams {
    fn default() -> Self {
        Self {
            entry: DlsEntryParams {
                radius: 0.0,
                normal_angle: 10.0,
                max_passes: 1024,
                convergence_threshold: 0.01,
                warm_up_samples: 12,
                merge_passes: 1,
                enabled_on_volumes: false,
            },
            light_threshold: 0.01,
            target_cache_hit_rate: 0.995,
            max_depth: 4,
            max_sample_count: 10_000_000,
        }
    }
}

impl DlsParams {
    pub fn from_props(cfg: &Props) -> Self {
        let d = Self::default();
        Self {
            entry: DlsEntryParams {
                radius: cfg.get_f32("lightstrategy.entry.radius", d.entry.radius).max(0.0),
                normal_angle: cfg
                    .get_f32("lightstrategy.entry.normalangle", d.entry.normal_angle)
                    .max(0.0),
                max_passes: cfg.get_u32("lightstrategy.entry.maxpasses", d.entry.max_passes),
                convergence_threshold: cfg
                    .get_f32(
                        "lightstrategy.entry.convergencethreshold",
                        d.entry.convergence_threshold,
                    )
                    .clamp(0.0, 1.0),
                warm_up_samples: cfg
                    .get_u32("lightstrategy.entry.warmupsamples", d.entry.warm_up_samples)
                    .max(1),
                merge_passes: cfg
                    .get_u32("lightstrategy.entry.mergepasses", d.entry.merge_passes)
                    .max(1),
                enabled_on_volumes: cfg.get_bool(
                    "lightstrategy.entry.volumes.enable",
                    d.entry.enabled_on_volumes,
                ),
            },
            light_threshold: cfg
                .get_f32("lightstrategy.lightthreshold", d.light_threshold)
                .clamp(0.0, 1.0),
            target_cache_hit_rate: cfg
                .get_f32("lightstrategy.targetcachehitratio", d.target_cache_hit_rate)
                .clamp(0.0, 1.0),
            max_depth: cfg.get_u32("lightstrategy.maxdepth", d.max_depth).max(1),
            max_sample_count: cfg
                .get_u32("lightstrategy.maxsamplescount", d.max_sample_count)
                .max(1),
        }
    }

    pub fn to_props(&self) -> Props {
        Props::new()
            .with("lightstrategy.entry.radius", self.entry.radius)
            .with("lightstrategy.entry.normalangle", self.entry.normal_angle)
            .with("lightstrategy.entry.maxpasses", self.entry.max_passes)
            .with(
                "lightstrategy.entry.convergencethreshold",
                self.entry.convergence_threshold,
            )
            .with("lightstrategy.entry.warmupsamples", self.entry.warm_up_samples)
            .with("lightstrategy.entry.mergepasses", self.entry.merge_passes)
            .with("lightstrategy.entry.volumes.enable", self.entry.enabled_on_volumes)
            .with("lightstrategy.lightthreshold", self.light_threshold)
            .with("lightstrategy.targetcachehitratio", self.target_cache_hit_rate)
            .with("lightstrategy.maxdepth", self.max_depth)
            .with("lightstrategy.maxsamplescount", self.max_sample_count)
    }
}

/// A visibility particle waiting to become a cache entry
pub struct DlsVisibilityParticle {
    p: Vec3,
    n: Vec3,
    is_volume: bool,
    bsdfs: Vec<Arc<dyn Bsdf>>,
    volumes: Vec<VolumeInfo>,
}

impl SpatialEntry for DlsVisibilityParticle {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for DlsVisibilityParticle {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// One cache entry: a point with its discrete light distribution
///
/// `lights_distribution == None` marks a point no light reaches; direct
/// light sampling is skipped there.
pub struct DlsCacheEntry {
    pub p: Vec3,
    pub n: Vec3,
    pub is_volume: bool,
    pub distribution_index_to_light_index: Vec<u32>,
    pub lights_distribution: Option<Distribution1D>,
}

impl DlsCacheEntry {
    pub fn is_direct_light_sampling_disabled(&self) -> bool {
        self.lights_distribution.is_none()
    }
}

impl SpatialEntry for DlsCacheEntry {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for DlsCacheEntry {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

struct DlsVisibilityBuilder {
    enabled_on_volumes: bool,
}

impl VisibilityHandler for DlsVisibilityBuilder {
    type Particle = DlsVisibilityParticle;

    fn process_hit_point(
        &self,
        bsdf: &Arc<dyn Bsdf>,
        volume: &VolumeInfo,
        out: &mut Vec<Self::Particle>,
    ) -> bool {
        if bsdf.is_delta() {
            // Keep following the path through specular surfaces
            return true;
        }
        if bsdf.is_volume() && !self.enabled_on_volumes {
            return true;
        }
        let hp = bsdf.hit_point();
        out.push(DlsVisibilityParticle {
            p: hp.p,
            n: hp.landing_shade_n(),
            is_volume: bsdf.is_volume(),
            bsdfs: vec![bsdf.clone()],
            volumes: vec![*volume],
        });
        // Stop at the first diffuse-ish surface
        false
    }

    fn merge(&self, existing: &mut Self::Particle, incoming: Self::Particle) {
        existing.bsdfs.extend(incoming.bsdfs);
        existing.volumes.extend(incoming.volumes);
    }
}

/// The direct-light-sampling cache
pub struct DirectLightSamplingCache {
    params: DlsParams,
    octree: Option<IndexOctree<DlsCacheEntry>>,
}

impl DirectLightSamplingCache {
    pub fn new(params: DlsParams) -> Self {
        Self {
            params,
            octree: None,
        }
    }

    pub fn params(&self) -> &DlsParams {
        &self.params
    }

    pub fn is_built(&self) -> bool {
        self.octree.is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.octree.as_ref().map_or(0, IndexOctree::entry_count)
    }

    /// Build the cache for `scene`
    pub fn build(&mut self, scene: &Scene, cancel: &CancelToken) -> RenderResult<()> {
        if scene.lights().is_empty() {
            info!("DLS cache: no lights, cache disabled");
            return Ok(());
        }

        let mut radius = self.params.entry.radius;
        if radius == 0.0 {
            radius = film_to_scene_radius(
                scene,
                &RadiusEstimateParams {
                    time_start: 0.0,
                    time_end: 1.0,
                    ..Default::default()
                },
                |bsdf| !bsdf.is_delta(),
            );
            info!("DLS cache best radius: {}", radius);
        }
        self.params.entry.radius = radius;

        let handler = DlsVisibilityBuilder {
            enabled_on_volumes: self.params.entry.enabled_on_volumes,
        };
        let visibility = VisibilityParams {
            max_path_depth: self.params.max_depth,
            max_sample_count: self.params.max_sample_count,
            target_hit_rate: self.params.target_cache_hit_rate,
            lookup_radius: radius,
            lookup_normal_angle: self.params.entry.normal_angle,
            time_start: 0.0,
            time_end: 1.0,
        };
        let (particles, stats) = trace_visibility(scene, &handler, &visibility, cancel);
        if particles.is_empty() {
            warn!("DLS cache is empty, direct light sampling falls back to the global strategy");
            return Ok(());
        }
        info!(
            "DLS cache: building {} entries ({} warnings during trace)",
            particles.len(),
            stats.warning_count
        );

        let warnings = WarnCounter::new();
        let entries: Vec<DlsCacheEntry> = particles
            .par_iter()
            .enumerate()
            .map(|(i, particle)| build_entry(scene, &self.params, particle, i as u64, &warnings))
            .collect();

        let disabled = entries
            .iter()
            .filter(|e| e.is_direct_light_sampling_disabled())
            .count();
        info!(
            "DLS cache entries: {} ({} with direct light sampling disabled, {} warnings)",
            entries.len(),
            disabled,
            warnings.get()
        );

        let mut octree = IndexOctree::new(
            scene.world_bbox(),
            radius,
            self.params.entry.normal_angle,
        );
        for entry in entries {
            octree.add(entry);
        }
        self.octree = Some(octree);
        Ok(())
    }

    /// Nearest cache entry covering `(p, n, is_volume)`
    pub fn entry(&self, p: Vec3, n: Vec3, is_volume: bool) -> Option<&DlsCacheEntry> {
        let octree = self.octree.as_ref()?;
        let normal_cos_angle = octree.normal_cos_angle();
        octree
            .nearest_entry(p, |e| accepts_entry(e, n, is_volume, normal_cos_angle))
            .map(|index| octree.entry(index))
    }
}

fn build_entry(
    scene: &Scene,
    params: &DlsParams,
    particle: &DlsVisibilityParticle,
    seed: u64,
    warnings: &WarnCounter,
) -> DlsCacheEntry {
    let lights = scene.lights();
    let light_count = lights.len();
    let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(0x9e37_79b9) + 1);

    let mut estimator = vec![0.0f32; light_count];
    let mut pick_distribution: Option<Distribution1D> = None;
    let mut previous_snapshot: Option<Vec<f32>> = None;

    let entry = &params.entry;
    let mut pass = 0u32;
    while pass < entry.max_passes {
        pass += 1;

        // Warm-up picks uniformly, afterwards proportionally to the
        // running estimator
        let (light_index, pick_pdf) = match &pick_distribution {
            Some(dist) if pass > entry.warm_up_samples => {
                let (index, pdf, _) = dist.sample_discrete(rng.gen());
                (index, pdf)
            }
            _ => (
                rng.gen_range(0..light_count),
                1.0 / light_count as f32,
            ),
        };
        if pick_pdf <= 0.0 {
            continue;
        }

        let sample_index = rng.gen_range(0..particle.bsdfs.len());
        let bsdf = &particle.bsdfs[sample_index];
        let volume = &particle.volumes[sample_index];

        if let Some(ill) =
            lights[light_index].illuminate(particle.p, rng.gen(), rng.gen(), rng.gen())
        {
            if ill.direct_pdf_w > 0.0 && !ill.radiance.is_black() {
                let shadow_ray = Ray::segment(
                    bsdf.ray_origin(ill.dir),
                    ill.dir,
                    1e-4,
                    ill.distance * (1.0 - 1e-3),
                )
                .with_time(rng.gen());
                if !scene.occluded(&shadow_ray, volume, rng.gen()) {
                    if let Some(eval) = bsdf.evaluate(ill.dir) {
                        let contribution =
                            (ill.radiance * eval.value).y() / (ill.direct_pdf_w * pick_pdf);
                        if contribution.is_finite() && contribution >= 0.0 {
                            estimator[light_index] += contribution;
                        } else {
                            warnings.bump();
                        }
                    }
                }
            }
        }

        if pass % entry.merge_passes == 0 {
            let total: f32 = estimator.iter().sum();
            if total > 0.0 {
                pick_distribution = Some(Distribution1D::new(&estimator));

                if pass > entry.warm_up_samples {
                    let snapshot: Vec<f32> = estimator.iter().map(|&v| v / total).collect();
                    if let Some(prev) = &previous_snapshot {
                        let change: f32 = snapshot
                            .iter()
                            .zip(prev.iter())
                            .map(|(a, b)| (a - b).abs())
                            .sum();
                        if change < entry.convergence_threshold {
                            break;
                        }
                    }
                    previous_snapshot = Some(snapshot);
                }
            }
        }
    }

    // Drop lights contributing below the threshold
    let max_bin = estimator.iter().cloned().fold(0.0f32, f32::max);
    let threshold = params.light_threshold * max_bin;
    let mut distribution_index_to_light_index = Vec::new();
    let mut retained = Vec::new();
    for (light_index, &value) in estimator.iter().enumerate() {
        if value > 0.0 && value >= threshold {
            distribution_index_to_light_index
                .push(lights[light_index].light_scene_index());
            retained.push(value);
        }
    }

    let lights_distribution = if retained.is_empty() {
        None
    } else {
        Some(Distribution1D::new(&retained))
    };

    DlsCacheEntry {
        p: particle.p,
        n: particle.n,
        is_volume: particle.is_volume,
        distribution_index_to_light_index,
        lights_distribution,
    }
}
