//! Light sampling strategies
//!
//! Global distributions over the scene lights (uniform, power-proportional,
//! log-power) plus the cache-backed strategy that answers per-point and
//! falls back to log-power when the cache misses.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::cache::{CancelToken, DirectLightSamplingCache, DlsParams};
use crate::config::Props;
use crate::error::{RenderError, RenderResult};
use crate::sampling::Distribution1D;
use crate::scene::Scene;

/// Strategy selector, configured by `lightstrategy.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightStrategyType {
    Uniform,
    Power,
    #[default]
    LogPower,
    DlsCache,
}

impl LightStrategyType {
    pub fn tag(&self) -> &'static str {
        match self {
            LightStrategyType::Uniform => "UNIFORM",
            LightStrategyType::Power => "POWER",
            LightStrategyType::LogPower => "LOG_POWER",
            LightStrategyType::DlsCache => "DLS_CACHE",
        }
    }

    pub fn from_tag(tag: &str) -> RenderResult<Self> {
        match tag {
            "UNIFORM" => Ok(LightStrategyType::Uniform),
            "POWER" => Ok(LightStrategyType::Power),
            "LOG_POWER" => Ok(LightStrategyType::LogPower),
            "DLS_CACHE" => Ok(LightStrategyType::DlsCache),
            other => Err(RenderError::invalid_parameter(format!(
                "unknown light strategy type: {}",
                other
            ))),
        }
    }
}

/// A global discrete distribution over the scene lights
#[derive(Debug, Clone)]
pub struct LightDistribution {
    strategy_type: LightStrategyType,
    distribution: Option<Distribution1D>,
}

impl LightDistribution {
    pub fn build(strategy_type: LightStrategyType, scene: &Scene) -> Self {
        let lights = scene.lights();
        let weights: Vec<f32> = match strategy_type {
            LightStrategyType::Uniform => lights.iter().map(|_| 1.0).collect(),
            LightStrategyType::Power => lights.iter().map(|l| l.power().max(0.0)).collect(),
            LightStrategyType::LogPower | LightStrategyType::DlsCache => lights
                .iter()
                .map(|l| (l.power().max(0.0) + 1.0).ln())
                .collect(),
        };
        let distribution = if weights.is_empty() {
            None
        } else {
            Some(Distribution1D::new(&weights))
        };
        Self {
            strategy_type,
            distribution,
        }
    }

    pub fn strategy_type(&self) -> LightStrategyType {
        self.strategy_type
    }

    /// Sample a light index and its discrete pdf
    pub fn sample(&self, u: f32) -> Option<(u32, f32)> {
        let dist = self.distribution.as_ref()?;
        let (index, pdf, _) = dist.sample_discrete(u);
        if pdf > 0.0 {
            Some((index as u32, pdf))
        } else {
            None
        }
    }

    pub fn pdf(&self, light_index: u32) -> f32 {
        match &self.distribution {
            Some(dist) if (light_index as usize) < dist.count() => {
                dist.pdf_discrete(light_index as usize)
            }
            _ => 0.0,
        }
    }
}

/// A light sampling strategy ready for queries
pub enum LightStrategy {
    Distribution(LightDistribution),
    DlsCache {
        cache: DirectLightSamplingCache,
        fallback: LightDistribution,
    },
}

impl LightStrategy {
    /// Parse the strategy selection from a property bag
    pub fn from_props(cfg: &Props) -> RenderResult<LightStrategyType> {
        LightStrategyType::from_tag(&cfg.get_str("lightstrategy.type", "LOG_POWER"))
    }

    /// Build (and for the cache strategy, preprocess) for `scene`
    pub fn build(
        strategy_type: LightStrategyType,
        cfg: &Props,
        scene: &Scene,
        cancel: &CancelToken,
    ) -> RenderResult<Self> {
        match strategy_type {
            LightStrategyType::DlsCache => {
                let mut cache = DirectLightSamplingCache::new(DlsParams::from_props(cfg));
                cache.build(scene, cancel)?;
                Ok(LightStrategy::DlsCache {
                    cache,
                    fallback: LightDistribution::build(LightStrategyType::LogPower, scene),
                })
            }
            other => Ok(LightStrategy::Distribution(LightDistribution::build(
                other, scene,
            ))),
        }
    }

    pub fn strategy_type(&self) -> LightStrategyType {
        match self {
            LightStrategy::Distribution(d) => d.strategy_type(),
            LightStrategy::DlsCache { .. } => LightStrategyType::DlsCache,
        }
    }

    /// Sample a light for illuminating `(p, n, is_volume)`
    ///
    /// `None` either means no lights, or, for a cache entry marked
    /// disabled, that direct light sampling should be skipped entirely.
    pub fn sample_lights(
        &self,
        u: f32,
        p: Vec3,
        n: Vec3,
        is_volume: bool,
    ) -> Option<(u32, f32)> {
        match self {
            LightStrategy::Distribution(d) => d.sample(u),
            LightStrategy::DlsCache { cache, fallback } => {
                match cache.entry(p, n, is_volume) {
                    Some(entry) => {
                        let dist = entry.lights_distribution.as_ref()?;
                        let (index, pdf, _) = dist.sample_discrete(u);
                        if pdf > 0.0 {
                            Some((entry.distribution_index_to_light_index[index], pdf))
                        } else {
                            None
                        }
                    }
                    None => fallback.sample(u),
                }
            }
        }
    }

    /// Pdf of picking `light_index` at `(p, n, is_volume)`
    pub fn sample_light_pdf(&self, light_index: u32, p: Vec3, n: Vec3, is_volume: bool) -> f32 {
        match self {
            LightStrategy::Distribution(d) => d.pdf(light_index),
            LightStrategy::DlsCache { cache, fallback } => {
                match cache.entry(p, n, is_volume) {
                    Some(entry) => match &entry.lights_distribution {
                        Some(dist) => entry
                            .distribution_index_to_light_index
                            .iter()
                            .position(|&l| l == light_index)
                            .map_or(0.0, |i| dist.pdf_discrete(i)),
                        None => 0.0,
                    },
                    None => fallback.pdf(light_index),
                }
            }
        }
    }

    /// Sample a light for emission (photon shooting)
    pub fn sample_lights_emission(&self, u: f32) -> Option<(u32, f32)> {
        match self {
            LightStrategy::Distribution(d) => d.sample(u),
            LightStrategy::DlsCache { fallback, .. } => fallback.sample(u),
        }
    }

    pub fn to_props(&self) -> Props {
        let mut props = Props::new().with("lightstrategy.type", self.strategy_type().tag());
        if let LightStrategy::DlsCache { cache, .. } = self {
            props.merge(&cache.params().to_props());
        }
        props
    }
}
