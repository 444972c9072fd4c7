//! Environment-light visibility cache
//!
//! For each cached point the environment sphere is split into tiles and the
//! visibility of each tile is measured with occlusion rays; the result,
//! multiplied by the (optional) environment luminance, becomes a 2D
//! distribution so environment sampling concentrates on directions that
//! actually reach the point. Sampling is hierarchical: the per-point tile
//! map picks a tile, the per-tile luminance distribution refines inside it.

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Props;
use crate::error::{RenderError, RenderResult};
use crate::geometry::{Frame, Ray};
use crate::index::{accepts_entry, IndexBvh, SpatialEntry, VisibilityPoint};
use crate::sampling::{
    gaussian_blur_3x3, radical_inverse, to_lat_long, uniform_sample_hemisphere,
    uniform_sample_sphere, Distribution2D,
};
use crate::scene::{Bsdf, LightSource, Scene, VolumeInfo};
use crate::utils::{film_to_scene_radius, RadiusEstimateParams};

use super::persist::{read_cache_file, write_cache_file};
use super::visibility::{trace_visibility, VisibilityHandler, VisibilityParams};
use super::CancelToken;

/// "ELVC" in the file header
pub const ELVC_FILE_MAGIC: u32 = 0x454c_5643;
/// Bumped on any incompatible record change
pub const ELVC_FILE_VERSION: u32 = 4;

/// Default environment map resolution when no luminance image is given
const DEFAULT_MAP_WIDTH: u32 = 1024;
const DEFAULT_MAP_HEIGHT: u32 = 512;

/// Equirectangular grayscale luminance image supplied by the host
#[derive(Debug, Clone)]
pub struct LuminanceMap {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
}

impl LuminanceMap {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> RenderResult<Self> {
        if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
            return Err(RenderError::invalid_parameter(
                "luminance map dimensions do not match the pixel array",
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> f32 {
        self.pixels[(y.min(self.height - 1) * self.width + x.min(self.width - 1)) as usize]
    }

    /// Box-filter downscale to `(out_width, out_height)`
    fn resample(&self, out_width: u32, out_height: u32) -> Vec<f32> {
        let mut out = vec![0.0f32; (out_width * out_height) as usize];
        for oy in 0..out_height {
            let y0 = oy * self.height / out_height;
            let y1 = (((oy + 1) * self.height).div_ceil(out_height)).max(y0 + 1);
            for ox in 0..out_width {
                let x0 = ox * self.width / out_width;
                let x1 = (((ox + 1) * self.width).div_ceil(out_width)).max(x0 + 1);
                let mut sum = 0.0;
                for y in y0..y1.min(self.height) {
                    for x in x0..x1.min(self.width) {
                        sum += self.pixel(x, y);
                    }
                }
                let count = (y1.min(self.height) - y0) * (x1.min(self.width) - x0);
                out[(oy * out_width + ox) as usize] = sum / count.max(1) as f32;
            }
        }
        out
    }
}

/// Tile-map shape and per-entry sampling effort
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElvcMapParams {
    /// 0.0-1.0; higher quality derives smaller tiles and more samples
    pub quality: f32,
    /// Explicit overrides; 0 derives from `quality`
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_sample_count: u32,
    pub sample_upper_hemisphere_only: bool,
}

/// Visibility-trace tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElvcVisibilityParams {
    pub max_sample_count: u32,
    pub max_path_depth: u32,
    pub target_hit_rate: f32,
    pub lookup_radius: f32,
    pub lookup_normal_angle: f32,
}

/// Persistent-cache location
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElvcPersistentParams {
    pub file_name: String,
    pub safe_save: bool,
}

/// Full ELVC parameter block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElvcParams {
    pub map: ElvcMapParams,
    pub visibility: ElvcVisibilityParams,
    pub persistent: ElvcPersistentParams,
}

impl Default for ElvcParams {
    fn default() -> Self {
        Self {
            map: ElvcMapParams {
                quality: 0.5,
                tile_width: 0,
                tile_height: 0,
                tile_sample_count: 0,
                sample_upper_hemisphere_only: false,
            },
            visibility: ElvcVisibilityParams {
                max_sample_count: 1024 * 1024,
                max_path_depth: 4,
                target_hit_rate: 0.99,
                lookup_radius: 0.0,
                lookup_normal_angle: 25.0,
            },
            persistent: ElvcPersistentParams {
                file_name: String::new(),
                safe_save: true,
            },
        }
    }
}

impl ElvcParams {
    pub fn from_props(prefix: &str, cfg: &Props) -> Self {
        let d = Self::default();
        let key = |suffix: &str| format!("{}.visibilitymapcache.{}", prefix, suffix);
        Self {
            map: ElvcMapParams {
                quality: cfg
                    .get_f32(&key("map.quality"), d.map.quality)
                    .clamp(0.0, 1.0),
                tile_width: cfg.get_u32(&key("map.tilewidth"), 0),
                tile_height: cfg.get_u32(&key("map.tileheight"), 0),
                tile_sample_count: cfg.get_u32(&key("map.tilesamplecount"), 0),
                sample_upper_hemisphere_only: cfg.get_bool(
                    &key("map.sampleupperhemisphereonly"),
                    d.map.sample_upper_hemisphere_only,
                ),
            },
            visibility: ElvcVisibilityParams {
                max_sample_count: cfg
                    .get_u32(
                        &key("visibility.maxsamplecount"),
                        d.visibility.max_sample_count,
                    )
                    .max(1),
                max_path_depth: cfg
                    .get_u32(&key("visibility.maxdepth"), d.visibility.max_path_depth)
                    .max(1),
                target_hit_rate: cfg
                    .get_f32(&key("visibility.targethitrate"), d.visibility.target_hit_rate)
                    .max(0.0),
                lookup_radius: cfg
                    .get_f32(&key("visibility.radius"), d.visibility.lookup_radius)
                    .max(0.0),
                lookup_normal_angle: cfg
                    .get_f32(
                        &key("visibility.normalangle"),
                        d.visibility.lookup_normal_angle,
                    )
                    .max(0.0),
            },
            persistent: ElvcPersistentParams {
                file_name: cfg.get_str(&key("persistent.file"), ""),
                safe_save: cfg.get_bool(&key("persistent.safesave"), d.persistent.safe_save),
            },
        }
    }

    pub fn to_props(&self, prefix: &str) -> Props {
        let key = |suffix: &str| format!("{}.visibilitymapcache.{}", prefix, suffix);
        Props::new()
            .with(key("map.quality"), self.map.quality)
            .with(key("map.tilewidth"), self.map.tile_width)
            .with(key("map.tileheight"), self.map.tile_height)
            .with(key("map.tilesamplecount"), self.map.tile_sample_count)
            .with(
                key("map.sampleupperhemisphereonly"),
                self.map.sample_upper_hemisphere_only,
            )
            .with(
                key("visibility.maxsamplecount"),
                self.visibility.max_sample_count,
            )
            .with(key("visibility.maxdepth"), self.visibility.max_path_depth)
            .with(
                key("visibility.targethitrate"),
                self.visibility.target_hit_rate,
            )
            .with(key("visibility.radius"), self.visibility.lookup_radius)
            .with(
                key("visibility.normalangle"),
                self.visibility.lookup_normal_angle,
            )
            .with(key("persistent.file"), self.persistent.file_name.clone())
            .with(key("persistent.safesave"), self.persistent.safe_save)
    }
}

/// A visibility particle accumulating BSDF snapshots at one point
pub struct ElvcVisibilityParticle {
    p: Vec3,
    n: Vec3,
    is_volume: bool,
    bsdfs: Vec<Arc<dyn Bsdf>>,
    volumes: Vec<VolumeInfo>,
}

impl SpatialEntry for ElvcVisibilityParticle {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for ElvcVisibilityParticle {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// One cache entry: a point with its tile-resolution visibility
/// distribution (`None` when nothing was visible and the luminance-only
/// fallback applies)
#[derive(Clone, Serialize, Deserialize)]
pub struct ElvcCacheEntry {
    pub p: Vec3,
    pub n: Vec3,
    pub is_volume: bool,
    pub visibility_map: Option<Distribution2D>,
}

impl SpatialEntry for ElvcCacheEntry {
    fn position(&self) -> Vec3 {
        self.p
    }
}

impl VisibilityPoint for ElvcCacheEntry {
    fn normal(&self) -> Vec3 {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

#[derive(Serialize, Deserialize)]
struct ElvcBvh {
    bvh: IndexBvh<ElvcCacheEntry>,
    normal_cos_angle: f32,
}

impl ElvcBvh {
    fn new(entries: Vec<ElvcCacheEntry>, radius: f32, normal_angle_deg: f32) -> Self {
        Self {
            bvh: IndexBvh::new(entries, radius),
            normal_cos_angle: normal_angle_deg.to_radians().cos(),
        }
    }

    fn nearest_entry(&self, p: Vec3, n: Vec3, is_volume: bool) -> Option<&ElvcCacheEntry> {
        self.bvh
            .nearest_entry(p, |e| accepts_entry(e, n, is_volume, self.normal_cos_angle))
    }
}

struct ElvcVisibilityBuilder;

impl VisibilityHandler for ElvcVisibilityBuilder {
    type Particle = ElvcVisibilityParticle;

    fn process_hit_point(
        &self,
        bsdf: &Arc<dyn Bsdf>,
        volume: &VolumeInfo,
        out: &mut Vec<Self::Particle>,
    ) -> bool {
        if !bsdf.is_delta() {
            let hp = bsdf.hit_point();
            out.push(ElvcVisibilityParticle {
                p: hp.p,
                n: hp.landing_shade_n(),
                is_volume: bsdf.is_volume(),
                bsdfs: vec![bsdf.clone()],
                volumes: vec![*volume],
            });
        }
        true
    }

    fn merge(&self, existing: &mut Self::Particle, incoming: Self::Particle) {
        existing.bsdfs.extend(incoming.bsdfs);
        existing.volumes.extend(incoming.volumes);
    }
}

/// On-disk record
#[derive(Serialize, Deserialize)]
struct ElvcCacheFile {
    map_width: u32,
    map_height: u32,
    params: ElvcParams,
    bvh: Option<ElvcBvh>,
}

/// The environment-light visibility cache
pub struct EnvLightVisibilityCache {
    params: ElvcParams,
    luminance_map: Option<LuminanceMap>,
    map_width: u32,
    map_height: u32,
    tiles_x: u32,
    tiles_y: u32,
    bvh: Option<ElvcBvh>,
    tile_distributions: Vec<Distribution2D>,
}

impl EnvLightVisibilityCache {
    /// A cache driven by a luminance image; the map resolution follows the
    /// image.
    pub fn with_luminance_map(map: LuminanceMap, params: ElvcParams) -> Self {
        let (w, h) = (map.width(), map.height());
        Self {
            params,
            luminance_map: Some(map),
            map_width: w,
            map_height: h,
            tiles_x: 0,
            tiles_y: 0,
            bvh: None,
            tile_distributions: Vec::new(),
        }
    }

    /// A cache with uniform luminance at the given resolution
    pub fn with_map_size(map_width: u32, map_height: u32, params: ElvcParams) -> Self {
        Self {
            params,
            luminance_map: None,
            map_width: map_width.max(1),
            map_height: map_height.max(1),
            tiles_x: 0,
            tiles_y: 0,
            bvh: None,
            tile_distributions: Vec::new(),
        }
    }

    /// A cache with uniform luminance at the default resolution
    pub fn with_default_map_size(params: ElvcParams) -> Self {
        Self::with_map_size(DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT, params)
    }

    pub fn params(&self) -> &ElvcParams {
        &self.params
    }

    pub fn is_built(&self) -> bool {
        self.bvh.is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.bvh.as_ref().map_or(0, |b| b.bvh.entries().len())
    }

    pub fn tiles_x_count(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y_count(&self) -> u32 {
        self.tiles_y
    }

    pub fn has_tile_distributions(&self) -> bool {
        !self.tile_distributions.is_empty()
    }

    pub fn is_cache_enabled(&self, bsdf: &dyn Bsdf) -> bool {
        !bsdf.is_delta()
    }

    /// Derive tile sizes and per-tile sample counts from the quality knob
    ///
    /// The bands correspond to 64x32 / 32x16 / 16x8 tiles on a 1024x512
    /// map, scaled to the actual resolution.
    fn evaluate_map_params(&mut self) {
        let p = &mut self.params.map;
        if p.tile_width == 0 || p.tile_height == 0 || p.tile_sample_count == 0 {
            let lerp = |t: f32, a: f32, b: f32| a + t * (b - a);
            if p.quality < 1.0 / 3.0 {
                p.tile_width = (self.map_width / (1024 / 64)).max(1);
                p.tile_height = (self.map_height / (512 / 32)).max(1);
                p.tile_sample_count = lerp(p.quality / (1.0 / 3.0), 4.0, 12.0) as u32;
            } else if p.quality < 2.0 / 3.0 {
                p.tile_width = (self.map_width / (1024 / 32)).max(1);
                p.tile_height = (self.map_height / (512 / 16)).max(1);
                p.tile_sample_count =
                    lerp((p.quality - 1.0 / 3.0) / (1.0 / 3.0), 12.0, 22.0) as u32;
            } else {
                p.tile_width = (self.map_width / (1024 / 16)).max(1);
                p.tile_height = (self.map_height / (512 / 8)).max(1);
                p.tile_sample_count =
                    lerp((p.quality - 2.0 / 3.0) / (1.0 / 3.0), 22.0, 32.0) as u32;
            }
        }

        self.tiles_x = self.map_width.div_ceil(p.tile_width);
        self.tiles_y = self.map_height.div_ceil(p.tile_height);
        info!(
            "ELVC map {}x{}, tiles {}x{} of {}x{}, {} samples/tile",
            self.map_width,
            self.map_height,
            self.tiles_x,
            self.tiles_y,
            p.tile_width,
            p.tile_height,
            p.tile_sample_count
        );
    }

    /// Build the cache, or load it when a persistent file already exists
    pub fn build(
        &mut self,
        scene: &Scene,
        env_light: &Arc<dyn LightSource>,
        cancel: &CancelToken,
    ) -> RenderResult<()> {
        if !self.params.persistent.file_name.is_empty() {
            let path = Path::new(&self.params.persistent.file_name).to_path_buf();
            if path.exists() {
                return self.load_persistent(&path);
            }
        }

        self.evaluate_map_params();

        if self.params.visibility.lookup_radius == 0.0 {
            self.params.visibility.lookup_radius = film_to_scene_radius(
                scene,
                &RadiusEstimateParams::default(),
                |bsdf| !bsdf.is_delta(),
            );
            info!(
                "ELVC best cache radius: {}",
                self.params.visibility.lookup_radius
            );
        }

        let visibility = VisibilityParams {
            max_path_depth: self.params.visibility.max_path_depth,
            max_sample_count: self.params.visibility.max_sample_count,
            target_hit_rate: self.params.visibility.target_hit_rate,
            lookup_radius: self.params.visibility.lookup_radius,
            lookup_normal_angle: self.params.visibility.lookup_normal_angle,
            time_start: 0.0,
            time_end: 1.0,
        };
        let (particles, _stats) =
            trace_visibility(scene, &ElvcVisibilityBuilder, &visibility, cancel);
        if particles.is_empty() {
            warn!("ELVC has an empty cache");
            return Ok(());
        }

        info!("ELVC building {} cache entries", particles.len());
        let luminance_tiles = self
            .luminance_map
            .as_ref()
            .map(|m| m.resample(self.tiles_x, self.tiles_y));
        let entries: Vec<ElvcCacheEntry> = particles
            .par_iter()
            .map(|particle| self.build_cache_entry(scene, env_light, particle, &luminance_tiles))
            .collect();

        info!("ELVC building cache entries BVH");
        self.bvh = Some(ElvcBvh::new(
            entries,
            self.params.visibility.lookup_radius,
            self.params.visibility.lookup_normal_angle,
        ));

        if self.luminance_map.is_some() {
            self.build_tile_distributions();
        } else {
            self.tile_distributions.clear();
        }

        if !self.params.persistent.file_name.is_empty() {
            let path = Path::new(&self.params.persistent.file_name).to_path_buf();
            self.save_persistent(&path)?;
        }

        Ok(())
    }

    fn build_cache_entry(
        &self,
        scene: &Scene,
        env_light: &Arc<dyn LightSource>,
        particle: &ElvcVisibilityParticle,
        luminance_tiles: &Option<Vec<f32>>,
    ) -> ElvcCacheEntry {
        let tiles_x = self.tiles_x as usize;
        let tiles_y = self.tiles_y as usize;
        let tile_count = tiles_x * tiles_y;
        let mut visibility = vec![0.0f32; tile_count];
        let mut sample_counts = vec![0u32; tile_count];

        let map_params = &self.params.map;
        let total_samples = (tile_count as u32) * map_params.tile_sample_count;
        for pass in 1..=total_samples {
            let u0 = radical_inverse(pass, 3);
            let u1 = radical_inverse(pass, 5);
            let u2 = radical_inverse(pass, 7);
            let u3 = radical_inverse(pass, 11);
            let u4 = radical_inverse(pass, 13);

            // Pick one of the accumulated sampling points
            let point_index =
                ((u0 * particle.bsdfs.len() as f32) as usize).min(particle.bsdfs.len() - 1);
            let bsdf = &particle.bsdfs[point_index];
            let volume = &particle.volumes[point_index];
            let hp = bsdf.hit_point();

            // Local direction over the hemisphere (surfaces) or sphere
            // (volumes); the shading frame faces the front side, flip when
            // the path landed on the back
            let mut local_dir = if bsdf.is_volume() {
                uniform_sample_sphere(u1, u2)
            } else {
                uniform_sample_hemisphere(u1, u2)
            };
            if !hp.into_object {
                local_dir.z = -local_dir.z;
            }
            let frame = Frame::from_z(hp.shade_n);
            let world_dir = frame.to_world(local_dir);

            let light_dir = env_light.world_to_light(world_dir).normalize();
            let (u, v, mapping_pdf) = to_lat_long(light_dir);
            if mapping_pdf == 0.0 {
                continue;
            }

            let x = ((u * self.map_width as f32) as u32).min(self.map_width - 1);
            let y = ((v * self.map_height as f32) as u32).min(self.map_height - 1);
            let tile_x = (x / map_params.tile_width).min(self.tiles_x - 1) as usize;
            let tile_y = (y / map_params.tile_height).min(self.tiles_y - 1) as usize;
            let pixel_index = tile_x + tile_y * tiles_x;

            let shadow_ray = Ray::new(bsdf.ray_origin(world_dir), world_dir).with_time(u3);
            if !scene.occluded(&shadow_ray, volume, u4) {
                visibility[pixel_index] += 1.0;
            }
            sample_counts[pixel_index] += 1;
        }

        for (value, &count) in visibility.iter_mut().zip(sample_counts.iter()) {
            if count > 0 {
                *value /= count as f32;
            }
        }

        gaussian_blur_3x3(tiles_x, tiles_y, &mut visibility);

        if map_params.sample_upper_hemisphere_only {
            for y in (tiles_y / 2 + 1)..tiles_y {
                for x in 0..tiles_x {
                    visibility[x + y * tiles_x] = 0.0;
                }
            }
        }

        let first = &particle.bsdfs[0];
        let hp = first.hit_point();
        let mut entry = ElvcCacheEntry {
            p: hp.p,
            n: hp.landing_shade_n(),
            is_volume: first.is_volume(),
            visibility_map: None,
        };

        let max_visibility = visibility.iter().cloned().fold(0.0f32, f32::max);
        if max_visibility == 0.0 {
            // Nothing visible from here; queries fall back to the
            // luminance-only strategy
            return entry;
        }
        let inv_max = 1.0 / max_visibility;
        for v in visibility.iter_mut() {
            *v *= inv_max;
        }

        if let Some(tiles) = luminance_tiles {
            let max_luminance = tiles.iter().cloned().fold(0.0f32, f32::max);
            if max_luminance > 0.0 {
                let inv = 1.0 / max_luminance;
                for (v, &l) in visibility.iter_mut().zip(tiles.iter()) {
                    *v *= l * inv;
                }
            }
        }

        entry.visibility_map = Some(Distribution2D::new(&visibility, tiles_x, tiles_y));
        entry
    }

    fn build_tile_distributions(&mut self) {
        let map = self
            .luminance_map
            .as_ref()
            .expect("tile distributions need a luminance map");
        let tile_w = self.params.map.tile_width;
        let tile_h = self.params.map.tile_height;
        let tiles_x = self.tiles_x;

        info!(
            "ELVC building {} tile distributions",
            self.tiles_x * self.tiles_y
        );
        self.tile_distributions = (0..self.tiles_x * self.tiles_y)
            .into_par_iter()
            .map(|i| {
                let tile_x = i % tiles_x;
                let tile_y = i / tiles_x;
                let mut tile_luminance = vec![0.0f32; (tile_w * tile_h) as usize];
                for y in 0..tile_h {
                    for x in 0..tile_w {
                        let map_x = tile_x * tile_w + x;
                        let map_y = tile_y * tile_h + y;
                        if map_x < map.width() && map_y < map.height() {
                            tile_luminance[(x + y * tile_w) as usize] = map.pixel(map_x, map_y);
                        }
                    }
                }
                Distribution2D::new(&tile_luminance, tile_w as usize, tile_h as usize)
            })
            .collect();
    }

    /// The visibility distribution covering this shading point, if any
    pub fn visibility_map(&self, bsdf: &dyn Bsdf) -> Option<&Distribution2D> {
        let bvh = self.bvh.as_ref()?;
        let hp = bsdf.hit_point();
        let entry = bvh.nearest_entry(hp.p, hp.landing_shade_n(), bsdf.is_volume())?;
        entry.visibility_map.as_ref()
    }

    /// Hierarchically sample an environment direction `(u, v)`
    ///
    /// Returns `None` when no cache entry covers the point; the caller
    /// falls back to luminance-only sampling.
    pub fn sample(&self, bsdf: &dyn Bsdf, u0: f32, u1: f32) -> Option<([f32; 2], f32)> {
        let cache_dist = self.visibility_map(bsdf)?;

        let (x, y, cache_pdf, du, dv) = cache_dist.sample_discrete(u0, u1);
        if cache_pdf <= 0.0 {
            return None;
        }
        let tiles = self.tiles_x as f32 * self.tiles_y as f32;

        if !self.tile_distributions.is_empty() {
            let tile = &self.tile_distributions[x + y * self.tiles_x as usize];
            let (tile_uv, tile_pdf) = tile.sample_continuous(du, dv);
            if tile_pdf <= 0.0 {
                return None;
            }
            let uv = [
                (x as f32 + tile_uv[0]) / self.tiles_x as f32,
                (y as f32 + tile_uv[1]) / self.tiles_y as f32,
            ];
            Some((uv, cache_pdf * tile_pdf * tiles))
        } else {
            let uv = [
                (x as f32 + du) / self.tiles_x as f32,
                (y as f32 + dv) / self.tiles_y as f32,
            ];
            Some((uv, cache_pdf * tiles))
        }
    }

    /// Pdf of the hierarchical sampler at `(u, v)`
    pub fn pdf(&self, bsdf: &dyn Bsdf, u: f32, v: f32) -> f32 {
        let Some(cache_dist) = self.visibility_map(bsdf) else {
            return 0.0;
        };

        let (cache_pdf, x, y, du, dv) = cache_dist.pdf(u, v);
        if cache_pdf <= 0.0 {
            return 0.0;
        }

        if !self.tile_distributions.is_empty() {
            let tile = &self.tile_distributions[x + y * self.tiles_x as usize];
            let (tile_pdf, _, _, _, _) = tile.pdf(du, dv);
            cache_pdf * tile_pdf
        } else {
            cache_pdf
        }
    }

    fn save_persistent(&self, path: &Path) -> RenderResult<()> {
        info!("saving persistent ELVC cache: {}", path.display());
        let record = ElvcCacheFile {
            map_width: self.map_width,
            map_height: self.map_height,
            params: self.params.clone(),
            bvh: self.bvh.as_ref().map(|b| ElvcBvh {
                bvh: b.bvh.clone(),
                normal_cos_angle: b.normal_cos_angle,
            }),
        };
        let payload = bincode::serialize(&record)
            .map_err(|e| RenderError::corrupt(format!("serialization failed: {}", e)))?;
        write_cache_file(
            path,
            ELVC_FILE_MAGIC,
            ELVC_FILE_VERSION,
            &payload,
            self.params.persistent.safe_save,
        )?;
        info!("persistent ELVC cache saved: {} KiB", payload.len() / 1024);
        Ok(())
    }

    fn load_persistent(&mut self, path: &Path) -> RenderResult<()> {
        info!("loading persistent ELVC cache: {}", path.display());
        let payload = read_cache_file(path, ELVC_FILE_MAGIC, ELVC_FILE_VERSION)?;
        let record: ElvcCacheFile = bincode::deserialize(&payload)
            .map_err(|e| RenderError::corrupt(format!("{}: {}", path.display(), e)))?;

        self.map_width = record.map_width;
        self.map_height = record.map_height;
        self.params = record.params;
        self.bvh = record.bvh;
        self.tiles_x = self.map_width.div_ceil(self.params.map.tile_width.max(1));
        self.tiles_y = self.map_height.div_ceil(self.params.map.tile_height.max(1));

        // Tile distributions derive deterministically from the luminance
        // map, so they are rebuilt rather than stored
        if self.luminance_map.is_some() {
            self.build_tile_distributions();
        } else {
            self.tile_distributions.clear();
        }
        Ok(())
    }
}
