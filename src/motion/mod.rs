//! Motion system
//!
//! An ordered sequence of `(time, transform)` knots sampled at arbitrary
//! times. Each segment pre-decomposes its endpoint matrices so sampling only
//! pays for the components that actually change: rotation interpolates by
//! quaternion slerp, translation and scale by per-axis lerp, and a fully
//! static segment returns the start matrix untouched.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::geometry::decompose::{mat_to_rows, rows_to_mat};
use crate::geometry::{Bbox, DecomposedTransform, Transform};

/// Number of uniformly spaced samples used to bound a moving bbox
const BOUND_SAMPLES: u32 = 1024;

fn transform_bbox_mat(m: &Mat4, bbox: &Bbox) -> Bbox {
    if bbox.is_empty() {
        return Bbox::EMPTY;
    }
    let mut out = Bbox::EMPTY;
    for i in 0..8u32 {
        let corner = Vec3::new(
            if i & 1 != 0 { bbox.max.x } else { bbox.min.x },
            if i & 2 != 0 { bbox.max.y } else { bbox.min.y },
            if i & 4 != 0 { bbox.max.z } else { bbox.min.z },
        );
        out = out.union_point(m.transform_point3(corner));
    }
    out
}

/// One motion segment with precomputed decompositions and activity flags
#[derive(Debug, Clone)]
pub struct InterpolatedTransform {
    pub start_time: f32,
    pub end_time: f32,
    pub start: Transform,
    pub end: Transform,

    start_t: DecomposedTransform,
    end_t: DecomposedTransform,
    start_q: Quat,
    end_q: Quat,

    has_rotation: bool,
    has_translation_x: bool,
    has_translation_y: bool,
    has_translation_z: bool,
    has_translation: bool,
    has_scale_x: bool,
    has_scale_y: bool,
    has_scale_z: bool,
    has_scale: bool,
    is_active: bool,
}

impl InterpolatedTransform {
    pub fn new(
        start_time: f32,
        end_time: f32,
        start: Transform,
        end: Transform,
    ) -> RenderResult<Self> {
        let mut out = InterpolatedTransform {
            start_time,
            end_time,
            start,
            end,
            start_t: DecomposedTransform::default(),
            end_t: DecomposedTransform::default(),
            start_q: Quat::IDENTITY,
            end_q: Quat::IDENTITY,
            has_rotation: false,
            has_translation_x: false,
            has_translation_y: false,
            has_translation_z: false,
            has_translation: false,
            has_scale_x: false,
            has_scale_y: false,
            has_scale_z: false,
            has_scale: false,
            is_active: false,
        };

        if start_time == end_time {
            return Ok(out);
        }

        out.start_t = DecomposedTransform::decompose(&start.m);
        out.end_t = DecomposedTransform::decompose(&end.m);
        if !out.start_t.valid {
            return Err(RenderError::invalid_motion(
                "singular start matrix in motion segment",
            ));
        }
        if !out.end_t.valid {
            return Err(RenderError::invalid_motion(
                "singular end matrix in motion segment",
            ));
        }

        out.start_q = out.start_t.rotation_quat();
        out.end_q = out.end_t.rotation_quat();

        out.has_translation_x = out.start_t.tx != out.end_t.tx;
        out.has_translation_y = out.start_t.ty != out.end_t.ty;
        out.has_translation_z = out.start_t.tz != out.end_t.tz;
        out.has_translation =
            out.has_translation_x || out.has_translation_y || out.has_translation_z;

        out.has_scale_x = out.start_t.sx != out.end_t.sx;
        out.has_scale_y = out.start_t.sy != out.end_t.sy;
        out.has_scale_z = out.start_t.sz != out.end_t.sz;
        out.has_scale = out.has_scale_x || out.has_scale_y || out.has_scale_z;

        out.has_rotation = (out.start_q.dot(out.end_q) - 1.0).abs() >= 1e-6;

        out.is_active = out.has_translation || out.has_scale || out.has_rotation;

        Ok(out)
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Interpolated matrix at `time`, clamped to the segment endpoints
    pub fn sample(&self, time: f32) -> Mat4 {
        if !self.is_active {
            return self.start.m;
        }
        if time <= self.start_time {
            return self.start.m;
        }
        if time >= self.end_time {
            return self.end.m;
        }

        let le = (time - self.start_time) / (self.end_time - self.start_time);
        let lerp = |a: f32, b: f32| a + le * (b - a);

        // Translation-only segments just patch the start matrix
        if self.has_translation && !(self.has_scale || self.has_rotation) {
            let mut rows = mat_to_rows(&self.start.m);
            if self.has_translation_x {
                rows[0][3] = lerp(self.start_t.tx, self.end_t.tx);
            }
            if self.has_translation_y {
                rows[1][3] = lerp(self.start_t.ty, self.end_t.ty);
            }
            if self.has_translation_z {
                rows[2][3] = lerp(self.start_t.tz, self.end_t.tz);
            }
            return rows_to_mat(&rows);
        }

        let mut rows = if self.has_rotation {
            let q = self.start_q.slerp(self.end_q, le);
            let m3 = Mat3::from_quat(q);
            let mut rows = [[0.0f32; 4]; 4];
            for r in 0..3 {
                for c in 0..3 {
                    rows[r][c] = m3.col(c)[r];
                }
            }
            rows[3][3] = 1.0;
            rows
        } else {
            self.start_t.rotation
        };

        // Scale applied post-rotation
        let (sx, sy, sz) = if self.has_scale {
            (
                lerp(self.start_t.sx, self.end_t.sx),
                lerp(self.start_t.sy, self.end_t.sy),
                lerp(self.start_t.sz, self.end_t.sz),
            )
        } else {
            (self.start_t.sx, self.start_t.sy, self.start_t.sz)
        };
        for j in 0..3 {
            rows[0][j] *= sx;
            rows[1][j] *= sy;
            rows[2][j] *= sz;
        }

        rows[0][3] = if self.has_translation_x {
            lerp(self.start_t.tx, self.end_t.tx)
        } else {
            self.start_t.tx
        };
        rows[1][3] = if self.has_translation_y {
            lerp(self.start_t.ty, self.end_t.ty)
        } else {
            self.start_t.ty
        };
        rows[2][3] = if self.has_translation_z {
            lerp(self.start_t.tz, self.end_t.tz)
        } else {
            self.start_t.tz
        };

        rows_to_mat(&rows)
    }

    /// Union of sampled transforms of `bbox` across the segment
    pub fn bound(&self, bbox: &Bbox, storing_global_to_local: bool) -> Bbox {
        let mut out = Bbox::EMPTY;
        for i in 0..=BOUND_SAMPLES {
            let u = i as f32 / BOUND_SAMPLES as f32;
            let t = self.start_time + u * (self.end_time - self.start_time);
            let mut m = self.sample(t);
            if storing_global_to_local {
                m = m.inverse();
            }
            out = out.union(&transform_bbox_mat(&m, bbox));
        }
        out
    }
}

/// Sorted `(time, transform)` knots with precomputed segments
///
/// One extra static segment is kept at each end of the array so sampling
/// needs no bounds checks.
#[derive(Debug, Clone)]
pub struct MotionSystem {
    times: Vec<f32>,
    interpolated: Vec<InterpolatedTransform>,
    interpolated_inverse: Vec<InterpolatedTransform>,
}

impl MotionSystem {
    pub fn new(times: Vec<f32>, transforms: Vec<Transform>) -> RenderResult<Self> {
        validate_knots(&times, transforms.len())?;

        let mut out = MotionSystem {
            times: Vec::new(),
            interpolated: Vec::new(),
            interpolated_inverse: Vec::new(),
        };
        out.init(times, &transforms)?;
        Ok(out)
    }

    /// A static motion system holding a single transform
    pub fn from_transform(t: Transform) -> Self {
        // A single-knot system cannot fail: static segments skip decomposition
        Self::new(vec![0.0], vec![t]).expect("static motion system")
    }

    fn init(&mut self, times: Vec<f32>, transforms: &[Transform]) -> RenderResult<()> {
        self.interpolated.clear();
        self.interpolated_inverse.clear();
        self.interpolated.reserve(times.len() + 1);
        self.interpolated_inverse.reserve(times.len() + 1);

        let mut prev = 0usize;
        for i in 0..times.len() {
            self.interpolated.push(InterpolatedTransform::new(
                times[prev],
                times[i],
                transforms[prev],
                transforms[i],
            )?);
            self.interpolated_inverse.push(InterpolatedTransform::new(
                times[prev],
                times[i],
                transforms[prev].inverse(),
                transforms[i].inverse(),
            )?);
            prev = i;
        }
        let last = times.len() - 1;
        self.interpolated.push(InterpolatedTransform::new(
            times[last],
            times[last],
            transforms[last],
            transforms[last],
        )?);
        self.interpolated_inverse.push(InterpolatedTransform::new(
            times[last],
            times[last],
            transforms[last].inverse(),
            transforms[last].inverse(),
        )?);

        self.times = times;
        Ok(())
    }

    pub fn is_static(&self) -> bool {
        self.times.len() <= 1
    }

    pub fn interval(&self) -> (f32, f32) {
        (self.times[0], *self.times.last().unwrap())
    }

    fn segment_index(&self, time: f32) -> usize {
        let upper = self.times.partition_point(|&t| t <= time);
        upper.min(self.times.len() - 1)
    }

    /// Local-to-world matrix at `time`
    pub fn sample(&self, time: f32) -> Mat4 {
        self.interpolated[self.segment_index(time)].sample(time)
    }

    /// World-to-local matrix at `time`
    pub fn sample_inverse(&self, time: f32) -> Mat4 {
        self.interpolated_inverse[self.segment_index(time)].sample(time)
    }

    /// Conservative bound of `bbox` over all segments
    pub fn bound(&self, bbox: &Bbox, storing_global_to_local: bool) -> Bbox {
        let mut out = Bbox::EMPTY;
        for it in &self.interpolated {
            out = out.union(&it.bound(bbox, storing_global_to_local));
        }
        out
    }

    /// Right-compose every knot with `trans`
    pub fn apply_transform(&mut self, trans: &Transform) -> RenderResult<()> {
        let times = self.times.clone();
        // Skip the leading static duplicate segment; the trailing one is
        // covered by taking the last real segment's end knot.
        let mut transforms = Vec::with_capacity(times.len());
        for it in self.interpolated.iter().skip(1).take(times.len() - 1) {
            transforms.push(it.start.compose(trans));
        }
        let last_seg = &self.interpolated[self.interpolated.len() - 2];
        transforms.push(last_seg.end.compose(trans));
        self.init(times, &transforms)
    }

    pub fn knot_times(&self) -> &[f32] {
        &self.times
    }
}

fn validate_knots(times: &[f32], transform_count: usize) -> RenderResult<()> {
    if times.is_empty() {
        return Err(RenderError::invalid_motion("no motion knots"));
    }
    if times.len() != transform_count {
        return Err(RenderError::invalid_motion(format!(
            "knot count mismatch: {} times vs {} transforms",
            times.len(),
            transform_count
        )));
    }
    for w in times.windows(2) {
        if w[1] <= w[0] {
            return Err(RenderError::invalid_motion(format!(
                "knot times not strictly increasing: {} then {}",
                w[0], w[1]
            )));
        }
    }
    Ok(())
}

/// A `(times, transforms)` knot list value, validated before use
///
/// The value form exists so scenes can concatenate and invert motion paths
/// before committing them to a `MotionSystem`.
#[derive(Debug, Clone)]
pub struct MotionTransform {
    pub times: Vec<f32>,
    pub transforms: Vec<Transform>,
}

impl MotionTransform {
    pub fn new(times: Vec<f32>, transforms: Vec<Transform>) -> RenderResult<Self> {
        if times.is_empty() && transforms.len() == 1 {
            return Ok(Self { times, transforms });
        }
        validate_knots(&times, transforms.len())?;
        Ok(Self { times, transforms })
    }

    pub fn from_transform(t: Transform) -> Self {
        Self {
            times: Vec::new(),
            transforms: vec![t],
        }
    }

    pub fn is_static(&self) -> bool {
        self.times.len() <= 1
    }

    pub fn interval(&self) -> (f32, f32) {
        if self.times.is_empty() {
            (0.0, 0.0)
        } else {
            (self.times[0], *self.times.last().unwrap())
        }
    }

    pub fn static_transform(&self) -> Transform {
        self.transforms[0]
    }

    pub fn motion_system(&self) -> RenderResult<MotionSystem> {
        if self.is_static() {
            Ok(MotionSystem::from_transform(self.transforms[0]))
        } else {
            MotionSystem::new(self.times.clone(), self.transforms.clone())
        }
    }

    /// Concatenate two motion paths
    ///
    /// The output knots are the union of both knot sets; each side is
    /// resampled at the other's unique knots so every output knot has a
    /// defined transform on both sides.
    pub fn concat(&self, other: &MotionTransform) -> RenderResult<MotionTransform> {
        if self.is_static() && other.is_static() {
            return MotionTransform::new(
                Vec::new(),
                vec![self.transforms[0].compose(&other.transforms[0])],
            );
        }

        let mut new_times: Vec<f32> = self
            .times
            .iter()
            .chain(other.times.iter())
            .copied()
            .collect();
        new_times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        new_times.dedup();

        let left = self.motion_system()?;
        let right = other.motion_system()?;

        let mut new_transforms = Vec::with_capacity(new_times.len());
        for &t in &new_times {
            let l = Transform::new(left.sample(t));
            let r = Transform::new(right.sample(t));
            new_transforms.push(l.compose(&r));
        }

        MotionTransform::new(new_times, new_transforms)
    }

    pub fn compose_static(&self, t: &Transform) -> MotionTransform {
        MotionTransform {
            times: self.times.clone(),
            transforms: self.transforms.iter().map(|m| m.compose(t)).collect(),
        }
    }

    pub fn inverse(&self) -> MotionTransform {
        MotionTransform {
            times: self.times.clone(),
            transforms: self.transforms.iter().map(Transform::inverse).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(x: f32, y: f32, z: f32) -> Transform {
        Transform::new(Mat4::from_translation(Vec3::new(x, y, z)))
    }

    fn mats_close(a: &Mat4, b: &Mat4, tol: f32) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn test_endpoints_exact() {
        let t0 = translation(0.0, 0.0, 0.0);
        let t1 = translation(10.0, 0.0, 0.0);
        let ms = MotionSystem::new(vec![1.0, 3.0], vec![t0, t1]).unwrap();
        assert_eq!(ms.sample(1.0), t0.m);
        assert_eq!(ms.sample(3.0), t1.m);
        // Clamped outside the interval
        assert_eq!(ms.sample(0.0), t0.m);
        assert_eq!(ms.sample(5.0), t1.m);
    }

    #[test]
    fn test_translation_midpoint() {
        let ms = MotionSystem::new(
            vec![0.0, 1.0],
            vec![translation(0.0, 0.0, 0.0), translation(4.0, 2.0, 0.0)],
        )
        .unwrap();
        let m = ms.sample(0.5);
        let p = m.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_rotation_slerp_midpoint() {
        let r0 = Transform::new(Mat4::IDENTITY);
        let r1 = Transform::new(Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let ms = MotionSystem::new(vec![0.0, 1.0], vec![r0, r1]).unwrap();
        let m = ms.sample(0.5);
        let p = m.transform_point3(Vec3::X);
        let expected = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4).transform_point3(Vec3::X);
        assert!((p - expected).length() < 1e-4);
    }

    #[test]
    fn test_static_fast_path() {
        let t = translation(1.0, 2.0, 3.0);
        let ms = MotionSystem::from_transform(t);
        assert!(ms.is_static());
        assert_eq!(ms.sample(0.5), t.m);
        assert_eq!(ms.sample(-7.0), t.m);
    }

    #[test]
    fn test_inverse_sampling() {
        let ms = MotionSystem::new(
            vec![0.0, 1.0],
            vec![translation(0.0, 0.0, 0.0), translation(8.0, 0.0, 0.0)],
        )
        .unwrap();
        let fwd = ms.sample(0.25);
        let inv = ms.sample_inverse(0.25);
        let p = Vec3::new(0.3, 0.4, 0.5);
        let back = inv.transform_point3(fwd.transform_point3(p));
        assert!((back - p).length() < 1e-4);
    }

    #[test]
    fn test_bound_contains_samples() {
        let ms = MotionSystem::new(
            vec![0.0, 1.0],
            vec![translation(0.0, 0.0, 0.0), translation(5.0, 0.0, 0.0)],
        )
        .unwrap();
        let b = Bbox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let bound = ms.bound(&b, false);
        for i in 0..=16 {
            let t = i as f32 / 16.0;
            let m = ms.sample(t);
            let sampled = transform_bbox_mat(&m, &b);
            assert!(bound.contains_bbox(&sampled));
        }
    }

    #[test]
    fn test_invalid_knots_rejected() {
        let t = translation(0.0, 0.0, 0.0);
        assert!(matches!(
            MotionSystem::new(vec![0.0, 0.0], vec![t, t]),
            Err(RenderError::InvalidMotion(_))
        ));
        assert!(matches!(
            MotionSystem::new(vec![1.0, 0.5], vec![t, t]),
            Err(RenderError::InvalidMotion(_))
        ));
        assert!(matches!(
            MotionSystem::new(vec![0.0, 1.0], vec![t]),
            Err(RenderError::InvalidMotion(_))
        ));
    }

    #[test]
    fn test_singular_segment_rejected() {
        let flat = Transform::from_pair(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)), Mat4::IDENTITY);
        let ok = translation(1.0, 0.0, 0.0);
        assert!(matches!(
            MotionSystem::new(vec![0.0, 1.0], vec![flat, ok]),
            Err(RenderError::InvalidMotion(_))
        ));
    }

    #[test]
    fn test_concat_knot_union() {
        let a = MotionTransform::new(
            vec![1.0, 3.0],
            vec![translation(0.0, 0.0, 0.0), translation(2.0, 0.0, 0.0)],
        )
        .unwrap();
        let b = MotionTransform::new(
            vec![1.0, 4.0],
            vec![translation(0.0, 1.0, 0.0), translation(0.0, 7.0, 0.0)],
        )
        .unwrap();
        let c = a.concat(&b).unwrap();
        assert_eq!(c.times, vec![1.0, 3.0, 4.0]);

        // At t=3 the right side must be its own interpolation at t=3
        let right = b.motion_system().unwrap();
        let left = a.motion_system().unwrap();
        let expected =
            Transform::new(left.sample(3.0)).compose(&Transform::new(right.sample(3.0)));
        let got = c.motion_system().unwrap().sample(3.0);
        assert!(mats_close(&got, &expected.m, 1e-5));
    }

    #[test]
    fn test_scale_interpolation() {
        let s0 = Transform::new(Mat4::from_scale(Vec3::splat(1.0)));
        let s1 = Transform::new(Mat4::from_scale(Vec3::splat(3.0)));
        let ms = MotionSystem::new(vec![0.0, 1.0], vec![s0, s1]).unwrap();
        let p = ms.sample(0.5).transform_point3(Vec3::X);
        assert!((p.x - 2.0).abs() < 1e-4);
    }
}
