//! photon-engine: the core of a physically-based, unbiased path tracer
//!
//! Four layers, each depending only on the ones below:
//!
//! - geometry primitives and the motion system,
//! - triangle meshes with instancing/motion wrappers and the two-level BVH,
//! - generic point-set indices (BVH and octree),
//! - the render-time caches: direct-light sampling, environment-light
//!   visibility and photon GI, all fed by the multi-threaded
//!   scene-visibility driver.
//!
//! Shading, lights, cameras and films are host concerns behind the traits
//! in [`scene`].

// Core modules
pub mod config;
pub mod error;

// Geometry and sampling
pub mod geometry;
pub mod mesh;
pub mod motion;
pub mod sampling;
pub mod spectrum;

// Acceleration structures
pub mod bvh;
pub mod index;

// Scene and render-time systems
pub mod cache;
pub mod lightstrategy;
pub mod scene;

// Utilities
pub mod utils;

pub use config::{PropValue, Props};
pub use error::{RenderError, RenderResult};

pub use geometry::{Bbox, DecomposedTransform, Frame, Ray, RayHit, Transform, NULL_INDEX};
pub use mesh::{ExtTriangleMesh, SceneMesh, TriangleMesh, VertexBuffer};
pub use motion::{InterpolatedTransform, MotionSystem, MotionTransform};
pub use sampling::{Distribution1D, Distribution2D};
pub use spectrum::{Spectrum, SpectrumGroup};

pub use bvh::{BvhBuilderType, BvhParams, SceneBvh};
pub use index::{IndexBvh, IndexOctree, SpatialEntry, VisibilityPoint};

pub use cache::{
    CancelToken, DirectLightSamplingCache, DlsParams, ElvcParams, EnvLightVisibilityCache,
    LuminanceMap, PhotonGiCache, PhotonGiParams,
};
pub use lightstrategy::{LightStrategy, LightStrategyType};
pub use scene::{
    Bsdf, BsdfEvent, Camera, Film, HitPoint, LightSource, Scene, SurfaceShader, VolumeInfo,
};
pub use utils::SampleFilm;
