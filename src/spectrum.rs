//! RGB spectrum arithmetic
//!
//! The core carries radiance as linear RGB triplets. `SpectrumGroup` keys a
//! spectrum per light group so cached radiance can be split per group at
//! film-output time.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub};

use serde::{Deserialize, Serialize};

/// Linear RGB radiance/throughput value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Spectrum {
    pub const BLACK: Spectrum = Spectrum::splat(0.0);
    pub const WHITE: Spectrum = Spectrum::splat(1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn splat(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }

    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// CIE luminance of the linear RGB value
    pub fn y(&self) -> f32 {
        0.212671 * self.r + 0.715160 * self.g + 0.072169 * self.b
    }

    pub fn max_component(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    /// Importance value used by Russian roulette
    pub fn filter(&self) -> f32 {
        self.max_component()
    }

    pub fn is_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    pub fn is_infinite(&self) -> bool {
        self.r.is_infinite() || self.g.is_infinite() || self.b.is_infinite()
    }

    /// Finite and non-negative on every channel
    pub fn is_valid(&self) -> bool {
        self.r.is_finite()
            && self.g.is_finite()
            && self.b.is_finite()
            && self.r >= 0.0
            && self.g >= 0.0
            && self.b >= 0.0
    }

    pub fn clamp_min(&self, min: f32) -> Spectrum {
        Spectrum::new(self.r.max(min), self.g.max(min), self.b.max(min))
    }
}

impl Add for Spectrum {
    type Output = Spectrum;
    fn add(self, o: Spectrum) -> Spectrum {
        Spectrum::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl AddAssign for Spectrum {
    fn add_assign(&mut self, o: Spectrum) {
        self.r += o.r;
        self.g += o.g;
        self.b += o.b;
    }
}

impl Sub for Spectrum {
    type Output = Spectrum;
    fn sub(self, o: Spectrum) -> Spectrum {
        Spectrum::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl Mul for Spectrum {
    type Output = Spectrum;
    fn mul(self, o: Spectrum) -> Spectrum {
        Spectrum::new(self.r * o.r, self.g * o.g, self.b * o.b)
    }
}

impl MulAssign for Spectrum {
    fn mul_assign(&mut self, o: Spectrum) {
        self.r *= o.r;
        self.g *= o.g;
        self.b *= o.b;
    }
}

impl Mul<f32> for Spectrum {
    type Output = Spectrum;
    fn mul(self, s: f32) -> Spectrum {
        Spectrum::new(self.r * s, self.g * s, self.b * s)
    }
}

impl MulAssign<f32> for Spectrum {
    fn mul_assign(&mut self, s: f32) {
        self.r *= s;
        self.g *= s;
        self.b *= s;
    }
}

impl Div<f32> for Spectrum {
    type Output = Spectrum;
    fn div(self, s: f32) -> Spectrum {
        let inv = 1.0 / s;
        Spectrum::new(self.r * inv, self.g * inv, self.b * inv)
    }
}

impl DivAssign<f32> for Spectrum {
    fn div_assign(&mut self, s: f32) {
        let inv = 1.0 / s;
        self.r *= inv;
        self.g *= inv;
        self.b *= inv;
    }
}

/// One spectrum per light group
///
/// Grows on demand; absent groups are black.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumGroup {
    groups: Vec<Spectrum>,
}

impl SpectrumGroup {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn get(&self, group: u32) -> Spectrum {
        self.groups
            .get(group as usize)
            .copied()
            .unwrap_or(Spectrum::BLACK)
    }

    pub fn add(&mut self, group: u32, value: Spectrum) {
        let index = group as usize;
        if index >= self.groups.len() {
            self.groups.resize(index + 1, Spectrum::BLACK);
        }
        self.groups[index] += value;
    }

    /// Multiply every group by `s` componentwise
    pub fn scale_by(&mut self, s: Spectrum) {
        for g in &mut self.groups {
            *g = *g * s;
        }
    }

    /// Sum across all groups
    pub fn total(&self) -> Spectrum {
        self.groups
            .iter()
            .fold(Spectrum::BLACK, |acc, &s| acc + s)
    }

    pub fn is_black(&self) -> bool {
        self.groups.iter().all(Spectrum::is_black)
    }
}

impl AddAssign<&SpectrumGroup> for SpectrumGroup {
    fn add_assign(&mut self, o: &SpectrumGroup) {
        if o.groups.len() > self.groups.len() {
            self.groups.resize(o.groups.len(), Spectrum::BLACK);
        }
        for (dst, src) in self.groups.iter_mut().zip(o.groups.iter()) {
            *dst += *src;
        }
    }
}

impl MulAssign<f32> for SpectrumGroup {
    fn mul_assign(&mut self, s: f32) {
        for g in &mut self.groups {
            *g *= s;
        }
    }
}

impl DivAssign<f32> for SpectrumGroup {
    fn div_assign(&mut self, s: f32) {
        for g in &mut self.groups {
            *g /= s;
        }
    }
}
