//! Monte Carlo sampling support
//!
//! Piecewise-constant 1D/2D distributions, low-discrepancy radical-inverse
//! sequences, direction mappings and the small blur filter used on cache
//! tile maps.

mod blur;
mod distribution;
mod mc;

pub use blur::gaussian_blur_3x3;
pub use distribution::{Distribution1D, Distribution2D};
pub use mc::{
    concentric_sample_disk, from_lat_long, radical_inverse, to_lat_long, uniform_sample_hemisphere,
    uniform_sample_sphere,
};
