//! Spatial visibility caches
//!
//! The three render-time caches (direct-light sampling, environment-light
//! visibility, photon GI) and the multi-threaded scene-visibility driver
//! that feeds them their sample points.

mod dls;
mod elvc;
mod persist;
mod photongi;
mod visibility;

pub use dls::{DirectLightSamplingCache, DlsCacheEntry, DlsEntryParams, DlsParams};
pub use elvc::{
    ElvcCacheEntry, ElvcMapParams, ElvcParams, ElvcPersistentParams, ElvcVisibilityParams,
    EnvLightVisibilityCache, LuminanceMap, ELVC_FILE_MAGIC, ELVC_FILE_VERSION,
};
pub use photongi::{
    PgicCausticParams, PgicDebugType, PgicPhotonParams, Photon, PhotonGiCache, PhotonGiParams,
    RadiancePhoton,
};
pub use visibility::{
    trace_visibility, VisibilityHandler, VisibilityParams, VisibilityStats,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token polled at work-block boundaries
///
/// A cancelled cache build stops early but leaves a partial, valid cache;
/// lookups that miss fall back to the host's non-cached strategy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
