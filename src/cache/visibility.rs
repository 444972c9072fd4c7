//! Scene-visibility driver
//!
//! Multi-threaded path tracing whose only product is a deduplicated set of
//! "interesting hit points". Workers pull 4096-sample blocks off a shared
//! counter, trace camera paths and queue their particles; the octree insert
//! runs under one coarse mutex, which is acceptable because inserts are
//! rare next to the ray work inside a block. Once the measured cache-hit
//! rate clears the target, the counter is jumped past the budget and every
//! worker exits at its next block boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::index::{accepts_entry, IndexOctree, SpatialEntry, VisibilityPoint};
use crate::scene::{Bsdf, Scene, VolumeInfo};
use crate::spectrum::Spectrum;
use crate::utils::WarnCounter;

use super::CancelToken;

/// Samples per work block
const WORK_SIZE: u32 = 4096;
/// Russian roulette kicks in at this path depth
const RR_DEPTH: u32 = 3;
/// Minimum survival probability
const RR_IMPORTANCE_CAP: f32 = 0.5;
/// Lookups required before the hit-rate check may terminate the build
const MIN_LOOKUPS: u64 = 64 * 64;

/// Driver tuning shared by all cache kinds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityParams {
    pub max_path_depth: u32,
    pub max_sample_count: u32,
    pub target_hit_rate: f32,
    pub lookup_radius: f32,
    pub lookup_normal_angle: f32,
    pub time_start: f32,
    pub time_end: f32,
}

impl Default for VisibilityParams {
    fn default() -> Self {
        Self {
            max_path_depth: 4,
            max_sample_count: 1024 * 1024,
            target_hit_rate: 0.99,
            lookup_radius: 0.15,
            lookup_normal_angle: 25.0,
            time_start: 0.0,
            time_end: 1.0,
        }
    }
}

/// Cache-specific behavior plugged into the driver
pub trait VisibilityHandler: Sync {
    type Particle: VisibilityPoint + Send;

    /// Inspect a path vertex; optionally push a particle. The return value
    /// decides whether the path continues past this vertex.
    fn process_hit_point(
        &self,
        bsdf: &Arc<dyn Bsdf>,
        volume: &VolumeInfo,
        out: &mut Vec<Self::Particle>,
    ) -> bool;

    /// Fold a duplicate particle into the entry that already covers it
    fn merge(&self, existing: &mut Self::Particle, incoming: Self::Particle);
}

/// Outcome of a visibility build
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityStats {
    pub particle_count: usize,
    pub lookups: u64,
    pub hits: u64,
    pub hit_rate: f64,
    /// Highest sample offset merged before the build stopped
    pub samples: u64,
    pub cancelled: bool,
    pub warning_count: u64,
}

struct SharedState<P> {
    octree: IndexOctree<P>,
    lookups: u64,
    hits: u64,
    samples: u64,
    warm_up: bool,
    done: bool,
    hit_rate: f64,
}

fn process_particle<H: VisibilityHandler>(
    handler: &H,
    octree: &mut IndexOctree<H::Particle>,
    particle: H::Particle,
    max_distance2: f32,
) -> bool {
    let normal_cos_angle = octree.normal_cos_angle();
    let nearest = octree.nearest_entry(particle.position(), |e| {
        accepts_entry(e, particle.normal(), particle.is_volume(), normal_cos_angle)
    });

    match nearest {
        None => {
            octree.add(particle);
            false
        }
        Some(index) => {
            let d2 = particle
                .position()
                .distance_squared(octree.entry(index).position());
            if d2 > max_distance2 {
                octree.add(particle);
                false
            } else {
                handler.merge(octree.entry_mut(index), particle);
                true
            }
        }
    }
}

/// Trace visibility particles until the target hit rate or the sample
/// budget is reached. Returns the deduplicated particles.
pub fn trace_visibility<H: VisibilityHandler>(
    scene: &Scene,
    handler: &H,
    params: &VisibilityParams,
    cancel: &CancelToken,
) -> (Vec<H::Particle>, VisibilityStats) {
    let thread_count = num_cpus::get();
    info!("visibility trace thread count: {}", thread_count);

    let shared = Mutex::new(SharedState {
        octree: IndexOctree::new(
            scene.world_bbox(),
            params.lookup_radius,
            params.lookup_normal_angle,
        ),
        lookups: 0,
        hits: 0,
        samples: 0,
        warm_up: true,
        done: false,
        hit_rate: 0.0,
    });
    let counter = AtomicU32::new(0);
    let warnings = WarnCounter::new();
    let start_time = Instant::now();

    std::thread::scope(|scope| {
        for thread_index in 0..thread_count {
            let shared = &shared;
            let counter = &counter;
            let warnings = &warnings;
            scope.spawn(move || {
                worker(
                    scene,
                    handler,
                    params,
                    cancel,
                    shared,
                    counter,
                    warnings,
                    thread_index,
                    start_time,
                );
            });
        }
    });

    let state = shared.into_inner();
    let stats = VisibilityStats {
        particle_count: state.octree.entry_count(),
        lookups: state.lookups,
        hits: state.hits,
        hit_rate: state.hit_rate,
        samples: state.samples,
        cancelled: cancel.is_cancelled(),
        warning_count: warnings.get(),
    };
    info!(
        "visibility trace done: {} particles, hit rate {:.2}%",
        stats.particle_count,
        stats.hit_rate * 100.0
    );

    (state.octree.into_entries(), stats)
}

#[allow(clippy::too_many_arguments)]
fn worker<H: VisibilityHandler>(
    scene: &Scene,
    handler: &H,
    params: &VisibilityParams,
    cancel: &CancelToken,
    shared: &Mutex<SharedState<H::Particle>>,
    counter: &AtomicU32,
    warnings: &WarnCounter,
    thread_index: usize,
    start_time: Instant,
) {
    let camera = scene.camera().clone();
    let sub_region = camera.film_sub_region();
    let film_width = (sub_region[1] - sub_region[0] + 1) as f32;
    let film_height = (sub_region[3] - sub_region[2] + 1) as f32;

    let mut rng = StdRng::seed_from_u64(1 + thread_index as u64);
    let mut particles: Vec<H::Particle> = Vec::new();
    let mut last_print = start_time;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let work_counter = counter.fetch_add(WORK_SIZE, Ordering::Relaxed);
        if work_counter >= params.max_sample_count {
            break;
        }
        let work_to_do = WORK_SIZE.min(params.max_sample_count - work_counter);

        particles.clear();
        for _ in 0..work_to_do {
            let film_x = sub_region[0] as f32 + rng.gen::<f32>() * film_width;
            let film_y = sub_region[2] as f32 + rng.gen::<f32>() * film_height;
            let time_sample = rng.gen::<f32>();
            let time = if params.time_start <= params.time_end {
                params.time_start + time_sample * (params.time_end - params.time_start)
            } else {
                camera.generate_ray_time(time_sample)
            };
            let (mut ray, volume) =
                camera.generate_ray(time, film_x, film_y, rng.gen(), rng.gen());

            let mut throughput = Spectrum::WHITE;
            let mut depth = 0u32;
            loop {
                let Some((_hit, bsdf)) = scene.trace_through(&ray, &volume, rng.gen()) else {
                    break;
                };

                if !handler.process_hit_point(&bsdf, &volume, &mut particles) {
                    break;
                }

                depth += 1;
                if depth >= params.max_path_depth {
                    break;
                }

                let Some(sample) = bsdf.sample(rng.gen(), rng.gen()) else {
                    break;
                };
                if sample.value.is_black() {
                    break;
                }

                if !sample.event.is_specular() && depth >= RR_DEPTH {
                    let prob = sample.value.filter().clamp(RR_IMPORTANCE_CAP, 1.0);
                    if prob < rng.gen::<f32>() {
                        break;
                    }
                    throughput /= prob;
                }

                throughput *= sample.value;
                if !throughput.is_valid() {
                    warnings.bump();
                    break;
                }

                ray.update(bsdf.ray_origin(sample.dir), sample.dir);
            }
        }

        if particles.is_empty() {
            continue;
        }

        // Merge the block's particles into the shared octree
        let mut state = shared.lock();
        let mut block_lookups = 0u64;
        let mut block_hits = 0u64;
        // 10% overlap between entries avoids tiny hard-to-hit boundary
        // regions
        let max_distance2 = (params.lookup_radius * 0.9) * (params.lookup_radius * 0.9);
        for particle in particles.drain(..) {
            if process_particle(handler, &mut state.octree, particle, max_distance2) {
                block_hits += 1;
            }
            block_lookups += 1;
        }
        state.lookups += block_lookups;
        state.hits += block_hits;
        state.samples = state.samples.max((work_counter + work_to_do) as u64);

        if state.warm_up && work_counter > 8 * WORK_SIZE {
            // End of the warm-up period, restart the hit counters
            state.lookups = 0;
            state.hits = 0;
            state.warm_up = false;
        } else if !state.warm_up && work_counter > 2 * 8 * WORK_SIZE {
            // Only past the second plateau is the hit rate trustworthy
            state.hit_rate = if state.lookups > 0 {
                state.hits as f64 / state.lookups as f64
            } else {
                0.0
            };
            if state.lookups > MIN_LOOKUPS && state.hit_rate > params.target_hit_rate as f64 {
                state.done = true;
                // Push the counter past the budget so every worker stops at
                // its next block boundary
                counter.store(params.max_sample_count, Ordering::Relaxed);
            }
        }

        let done = state.done;
        let hits = state.hits;
        let lookups = state.lookups;
        let hit_rate = state.hit_rate;
        drop(state);

        if thread_index == 0 {
            let now = Instant::now();
            if now.duration_since(last_print).as_secs_f64() > 2.0 {
                info!(
                    "visibility hits: {}/{} [{:.1}%, {:.1}M samples/sec]",
                    hits,
                    lookups,
                    hit_rate * 100.0,
                    work_counter as f64 / (1e6 * now.duration_since(start_time).as_secs_f64())
                );
                last_print = now;
            }
        }

        if done {
            break;
        }
    }
}
