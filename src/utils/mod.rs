//! Shared utilities
//!
//! Atomic float accumulation, the atomic-rename save discipline used by
//! persistent caches, a film that accepts concurrent sample adds and the
//! image-plane-to-scene radius estimator shared by the caches.

pub mod atomic;
mod film;
mod radius;
mod safe_save;

pub use film::SampleFilm;
pub use radius::{film_to_scene_radius, RadiusEstimateParams};
pub use safe_save::SafeSave;

use std::sync::atomic::{AtomicU64, Ordering};

/// Relaxed counter for non-fatal numerical warnings
///
/// Incremented at sampling call sites that hit a NaN/zero-pdf edge case and
/// surfaced in post-build statistics.
#[derive(Debug, Default)]
pub struct WarnCounter(AtomicU64);

impl WarnCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
