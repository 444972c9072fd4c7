//! Piecewise-constant probability distributions
//!
//! All query paths derive probabilities from CDF differences rather than the
//! raw function values, so a distribution reloaded from its persisted CDFs
//! samples bit-identically to the one that was saved.

use serde::{Deserialize, Serialize};

/// 1D piecewise-constant distribution over `[0, 1)`
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution1D {
    count: usize,
    cdf: Vec<f32>,
    func_int: f32,
}

impl Distribution1D {
    /// Build from non-negative function values; a zero integral falls back
    /// to the uniform distribution.
    pub fn new(func: &[f32]) -> Self {
        assert!(!func.is_empty());
        let n = func.len();
        let mut cdf = vec![0.0f32; n + 1];
        for (i, &f) in func.iter().enumerate() {
            debug_assert!(f >= 0.0 && f.is_finite());
            cdf[i + 1] = cdf[i] + f / n as f32;
        }
        let func_int = cdf[n];
        if func_int == 0.0 {
            for (i, c) in cdf.iter_mut().enumerate() {
                *c = i as f32 / n as f32;
            }
        } else {
            for c in cdf.iter_mut() {
                *c /= func_int;
            }
        }
        Self {
            count: n,
            cdf,
            func_int,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Total integral of the input function over `[0, 1)`
    pub fn integral(&self) -> f32 {
        self.func_int
    }

    pub fn cdf(&self) -> &[f32] {
        &self.cdf
    }

    fn offset_of(&self, u: f32) -> usize {
        // Last cdf entry <= u; the first entry is always 0
        let idx = self.cdf.partition_point(|&c| c <= u);
        idx.saturating_sub(1).min(self.count - 1)
    }

    /// Discrete probability mass of bin `index`
    pub fn pdf_discrete(&self, index: usize) -> f32 {
        self.cdf[index + 1] - self.cdf[index]
    }

    /// Continuous density at `u`
    pub fn pdf_continuous(&self, u: f32) -> f32 {
        let o = self.offset_of(u.clamp(0.0, 1.0));
        self.pdf_discrete(o) * self.count as f32
    }

    /// Sample a bin; returns `(index, pdf, residual)` where `residual` is the
    /// position of `u` inside the chosen bin's CDF span.
    pub fn sample_discrete(&self, u: f32) -> (usize, f32, f32) {
        let o = self.offset_of(u);
        let mass = self.pdf_discrete(o);
        let du = if mass > 0.0 {
            (u - self.cdf[o]) / mass
        } else {
            0.0
        };
        (o, mass, du)
    }

    /// Sample a continuous position in `[0, 1)`; returns `(x, pdf, index)`
    pub fn sample_continuous(&self, u: f32) -> (f32, f32, usize) {
        let (o, mass, du) = self.sample_discrete(u);
        let x = (o as f32 + du) / self.count as f32;
        (x, mass * self.count as f32, o)
    }
}

/// 2D piecewise-constant distribution over the unit square
///
/// Rows are conditional distributions along `u`; the marginal distributes
/// across rows along `v`.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution2D {
    width: usize,
    height: usize,
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    /// Build from `width * height` row-major non-negative values
    pub fn new(func: &[f32], width: usize, height: usize) -> Self {
        assert_eq!(func.len(), width * height);
        let conditional: Vec<Distribution1D> = (0..height)
            .map(|y| Distribution1D::new(&func[y * width..(y + 1) * width]))
            .collect();
        let marginal_func: Vec<f32> = conditional.iter().map(|d| d.integral()).collect();
        let marginal = Distribution1D::new(&marginal_func);
        Self {
            width,
            height,
            conditional,
            marginal,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total integral over the unit square
    pub fn integral(&self) -> f32 {
        self.marginal.integral()
    }

    /// Sample a cell; returns `(x, y, pdf, du, dv)` with the discrete cell
    /// probability and the residuals inside the cell.
    pub fn sample_discrete(&self, u0: f32, u1: f32) -> (usize, usize, f32, f32, f32) {
        let (y, pdf_y, dv) = self.marginal.sample_discrete(u1);
        let (x, pdf_x, du) = self.conditional[y].sample_discrete(u0);
        (x, y, pdf_x * pdf_y, du, dv)
    }

    /// Sample a continuous `(u, v)`; returns `(uv, pdf)` with the continuous
    /// joint density.
    pub fn sample_continuous(&self, u0: f32, u1: f32) -> ([f32; 2], f32) {
        let (v, pdf_v, y) = self.marginal.sample_continuous(u1);
        let (u, pdf_u, _x) = self.conditional[y].sample_continuous(u0);
        ([u, v], pdf_u * pdf_v)
    }

    /// Continuous joint density at `(u, v)`, also reporting the cell and the
    /// in-cell residuals.
    pub fn pdf(&self, u: f32, v: f32) -> (f32, usize, usize, f32, f32) {
        let u = u.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let y = ((v * self.height as f32) as usize).min(self.height - 1);
        let x = ((u * self.width as f32) as usize).min(self.width - 1);
        let du = u * self.width as f32 - x as f32;
        let dv = v * self.height as f32 - y as f32;
        let pdf = self.conditional[y].pdf_discrete(x)
            * self.width as f32
            * self.marginal.pdf_discrete(y)
            * self.height as f32;
        (pdf, x, y, du, dv)
    }
}

/// On-disk form of a `Distribution2D`
///
/// Layout: `{width, height, rowCDFs[height][width+1], marginalCDF[height+1],
/// integral}`; CDFs are stored flattened, reloaded verbatim, and since every
/// query derives its probabilities from CDF differences, a reloaded
/// distribution answers bit-identically. Row integrals are recovered from
/// the marginal CDF.
#[derive(Serialize, Deserialize)]
struct Distribution2DDisk {
    width: u32,
    height: u32,
    row_cdfs: Vec<f32>,
    marginal_cdf: Vec<f32>,
    integral: f32,
}

impl Serialize for Distribution2D {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row_cdfs = Vec::with_capacity(self.height * (self.width + 1));
        for c in &self.conditional {
            row_cdfs.extend_from_slice(c.cdf());
        }
        Distribution2DDisk {
            width: self.width as u32,
            height: self.height as u32,
            row_cdfs,
            marginal_cdf: self.marginal.cdf().to_vec(),
            integral: self.marginal.integral(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Distribution2D {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let disk = Distribution2DDisk::deserialize(deserializer)?;
        let width = disk.width as usize;
        let height = disk.height as usize;
        if width == 0
            || height == 0
            || disk.row_cdfs.len() != height * (width + 1)
            || disk.marginal_cdf.len() != height + 1
        {
            return Err(D::Error::custom("malformed 2D distribution record"));
        }

        let conditional = (0..height)
            .map(|y| Distribution1D {
                count: width,
                cdf: disk.row_cdfs[y * (width + 1)..(y + 1) * (width + 1)].to_vec(),
                // The marginal's bin masses are the normalized row integrals
                func_int: (disk.marginal_cdf[y + 1] - disk.marginal_cdf[y])
                    * disk.integral
                    * height as f32,
            })
            .collect();
        Ok(Distribution2D {
            width,
            height,
            conditional,
            marginal: Distribution1D {
                count: height,
                cdf: disk.marginal_cdf,
                func_int: disk.integral,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_pdf_sums_to_one() {
        let d = Distribution1D::new(&[1.0, 3.0, 0.0, 4.0]);
        let total: f32 = (0..4).map(|i| d.pdf_discrete(i)).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(d.pdf_discrete(2), 0.0);
        assert!((d.pdf_discrete(1) - 3.0 / 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_integral_uniform_fallback() {
        let d = Distribution1D::new(&[0.0, 0.0, 0.0]);
        for i in 0..3 {
            assert!((d.pdf_discrete(i) - 1.0 / 3.0).abs() < 1e-6);
        }
        assert_eq!(d.integral(), 0.0);
    }

    #[test]
    fn test_sample_discrete_matches_mass() {
        let d = Distribution1D::new(&[1.0, 3.0]);
        let (i, pdf, _) = d.sample_discrete(0.1);
        assert_eq!(i, 0);
        assert!((pdf - 0.25).abs() < 1e-6);
        let (i, pdf, _) = d.sample_discrete(0.9);
        assert_eq!(i, 1);
        assert!((pdf - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_continuous_pdf_integrates_to_one() {
        let d = Distribution1D::new(&[2.0, 1.0, 5.0, 0.5]);
        let n = 1000;
        let mut sum = 0.0;
        for i in 0..n {
            let u = (i as f32 + 0.5) / n as f32;
            sum += d.pdf_continuous(u) / n as f32;
        }
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_2d_pdf_consistency() {
        let func = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let d = Distribution2D::new(&func, 3, 2);

        // Discrete masses sum to one
        let mut total = 0.0;
        for y in 0..2 {
            for x in 0..3 {
                let u = (x as f32 + 0.5) / 3.0;
                let v = (y as f32 + 0.5) / 2.0;
                let (pdf, px, py, _, _) = d.pdf(u, v);
                assert_eq!((px, py), (x, y));
                total += pdf / 6.0;
            }
        }
        assert!((total - 1.0).abs() < 1e-5);

        // Sampling returns the continuous density of the chosen point
        let (uv, pdf) = d.sample_continuous(0.7, 0.3);
        let (pdf2, _, _, _, _) = d.pdf(uv[0], uv[1]);
        assert!((pdf - pdf2).abs() < 1e-5);
    }

    #[test]
    fn test_2d_discrete_vs_continuous_scale() {
        let func = [1.0, 0.0, 0.0, 3.0];
        let d = Distribution2D::new(&func, 2, 2);
        let (x, y, mass, _, _) = d.sample_discrete(0.1, 0.1);
        let u = (x as f32 + 0.5) / 2.0;
        let v = (y as f32 + 0.5) / 2.0;
        let (pdf, _, _, _, _) = d.pdf(u, v);
        assert!((pdf - mass * 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_disk_round_trip_bit_exact() {
        let func: Vec<f32> = (0..32).map(|i| ((i * 7) % 11) as f32 * 0.37).collect();
        let d = Distribution2D::new(&func, 8, 4);
        let bytes = bincode::serialize(&d).unwrap();
        let d2: Distribution2D = bincode::deserialize(&bytes).unwrap();

        for i in 0..64 {
            let u0 = (i as f32 + 0.5) / 64.0;
            let u1 = ((i * 13 % 64) as f32 + 0.5) / 64.0;
            let (uv_a, pdf_a) = d.sample_continuous(u0, u1);
            let (uv_b, pdf_b) = d2.sample_continuous(u0, u1);
            assert_eq!(uv_a, uv_b);
            assert_eq!(pdf_a.to_bits(), pdf_b.to_bits());
        }
    }
}
