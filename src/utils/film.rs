//! Lock-free sample accumulation film
//!
//! Per-pixel RGB plus a weight channel, all accumulated with atomic float
//! adds. Writers tolerate lost updates on torn contention; the totals are
//! published by an acquire fence when reading results out.

use std::sync::atomic::{fence, AtomicU32, Ordering};

use crate::scene::Film;
use crate::spectrum::Spectrum;
use crate::utils::atomic;

/// Accumulation buffer with atomic-add channels
pub struct SampleFilm {
    width: u32,
    height: u32,
    // r, g, b, weight per pixel
    channels: Vec<[AtomicU32; 4]>,
}

impl SampleFilm {
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0);
        let zero = 0.0f32.to_bits();
        let channels = (0..(width * height) as usize)
            .map(|_| {
                [
                    AtomicU32::new(zero),
                    AtomicU32::new(zero),
                    AtomicU32::new(zero),
                    AtomicU32::new(zero),
                ]
            })
            .collect();
        Self {
            width,
            height,
            channels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Weight-normalized pixel value
    pub fn pixel(&self, x: u32, y: u32) -> Spectrum {
        fence(Ordering::Acquire);
        let c = &self.channels[(y * self.width + x) as usize];
        let weight = atomic::load_f32(&c[3]);
        if weight == 0.0 {
            return Spectrum::BLACK;
        }
        Spectrum::new(
            atomic::load_f32(&c[0]) / weight,
            atomic::load_f32(&c[1]) / weight,
            atomic::load_f32(&c[2]) / weight,
        )
    }

    pub fn total_weight(&self) -> f32 {
        fence(Ordering::Acquire);
        self.channels
            .iter()
            .map(|c| atomic::load_f32(&c[3]))
            .sum()
    }
}

impl Film for SampleFilm {
    fn add_sample(&self, x: u32, y: u32, radiance: Spectrum, weight: f32) {
        if x >= self.width || y >= self.height || !radiance.is_valid() {
            return;
        }
        let c = &self.channels[(y * self.width + x) as usize];
        atomic::add_f32(&c[0], radiance.r * weight);
        atomic::add_f32(&c[1], radiance.g * weight);
        atomic::add_f32(&c[2], radiance.b * weight);
        atomic::add_f32(&c[3], weight);
    }
}
