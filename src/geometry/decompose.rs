//! Transform decomposition
//!
//! Factors a 4x4 matrix into translation, scale, shear, rotation and
//! perspective components following the classic "unmatrix" procedure. The
//! motion system interpolates the factors instead of the raw matrices.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Row-major element view of a `Mat4`, matching the math below
pub(crate) fn mat_to_rows(m: &Mat4) -> [[f32; 4]; 4] {
    let cols = m.to_cols_array_2d();
    let mut rows = [[0.0f32; 4]; 4];
    for (c, col) in cols.iter().enumerate() {
        for (r, &v) in col.iter().enumerate() {
            rows[r][c] = v;
        }
    }
    rows
}

pub(crate) fn rows_to_mat(rows: &[[f32; 4]; 4]) -> Mat4 {
    let mut cols = [[0.0f32; 4]; 4];
    for (r, row) in rows.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            cols[c][r] = v;
        }
    }
    Mat4::from_cols_array_2d(&cols)
}

/// Decomposed transform factors
///
/// `valid` is false when the upper 3x3 is singular (or `m[3][3]` is zero);
/// callers must reject such transforms before interpolating them.
#[derive(Debug, Clone, Copy)]
pub struct DecomposedTransform {
    /// Translation
    pub tx: f32,
    pub ty: f32,
    pub tz: f32,
    /// Scale
    pub sx: f32,
    pub sy: f32,
    pub sz: f32,
    /// Shear
    pub sxy: f32,
    pub sxz: f32,
    pub syz: f32,
    /// Perspective row
    pub px: f32,
    pub py: f32,
    pub pz: f32,
    pub pw: f32,
    /// Pure rotation left over after factoring, as row-major rows
    pub rotation: [[f32; 4]; 4],
    pub valid: bool,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self::decompose(&Mat4::IDENTITY)
    }
}

impl DecomposedTransform {
    pub fn decompose(m: &Mat4) -> Self {
        let mut out = DecomposedTransform {
            tx: 0.0,
            ty: 0.0,
            tz: 0.0,
            sx: 1.0,
            sy: 1.0,
            sz: 1.0,
            sxy: 0.0,
            sxz: 0.0,
            syz: 0.0,
            px: 0.0,
            py: 0.0,
            pz: 0.0,
            pw: 0.0,
            rotation: mat_to_rows(m),
            valid: false,
        };
        let r = &mut out.rotation;

        // Normalize by the homogeneous component
        if r[3][3] == 0.0 {
            return out;
        }
        let inv_w = 1.0 / r[3][3];
        for row in r.iter_mut() {
            for v in row.iter_mut() {
                *v *= inv_w;
            }
        }

        // pmat tests the upper 3x3 for singularity and solves the
        // perspective row below
        let mut pmat = *r;
        for row in pmat.iter_mut().take(3) {
            row[3] = 0.0;
        }
        pmat[3][3] = 1.0;
        let pmat_m = rows_to_mat(&pmat);
        if pmat_m.determinant() == 0.0 {
            return out;
        }

        // Isolate perspective
        if r[3][0] != 0.0 || r[3][1] != 0.0 || r[3][2] != 0.0 {
            let rhs = glam::Vec4::new(r[3][0], r[3][1], r[3][2], r[3][3]);
            let solve = pmat_m.inverse().transpose();
            let rows = mat_to_rows(&solve);
            let mut sol = [0.0f32; 4];
            for (i, row) in rows.iter().enumerate() {
                sol[i] = row[0] * rhs.x + row[1] * rhs.y + row[2] * rhs.z + row[3] * rhs.w;
            }
            out.px = sol[0];
            out.py = sol[1];
            out.pz = sol[2];
            out.pw = sol[3];

            r[3][0] = 0.0;
            r[3][1] = 0.0;
            r[3][2] = 0.0;
            r[3][3] = 1.0;
        }

        // Translation is the last column
        out.tx = r[0][3];
        out.ty = r[1][3];
        out.tz = r[2][3];
        for row in r.iter_mut().take(3) {
            row[3] = 0.0;
        }

        let mut rows = [
            Vec3::new(r[0][0], r[0][1], r[0][2]),
            Vec3::new(r[1][0], r[1][1], r[1][2]),
            Vec3::new(r[2][0], r[2][1], r[2][2]),
        ];

        // Gram-Schmidt: lengths become scales, projections become shears
        out.sx = rows[0].length();
        rows[0] *= 1.0 / out.sx;

        out.sxy = rows[0].dot(rows[1]);
        rows[1] -= out.sxy * rows[0];
        out.sy = rows[1].length();
        rows[1] *= 1.0 / out.sy;
        out.sxy /= out.sy;

        out.sxz = rows[0].dot(rows[2]);
        rows[2] -= out.sxz * rows[0];
        out.syz = rows[1].dot(rows[2]);
        rows[2] -= out.syz * rows[1];
        out.sz = rows[2].length();
        rows[2] *= 1.0 / out.sz;
        out.sxz /= out.sz;
        out.syz /= out.sz;

        // Flip handedness if the orthonormal basis is left-handed
        if rows[0].dot(rows[1].cross(rows[2])) < 0.0 {
            out.sx = -out.sx;
            out.sy = -out.sy;
            out.sz = -out.sz;
            for row in rows.iter_mut() {
                *row = -*row;
            }
        }

        for (i, row) in rows.iter().enumerate() {
            r[i][0] = row.x;
            r[i][1] = row.y;
            r[i][2] = row.z;
        }

        out.valid = true;
        out
    }

    /// The rotation factor as a normalized quaternion
    pub fn rotation_quat(&self) -> Quat {
        let r = &self.rotation;
        let m3 = Mat3::from_cols(
            Vec3::new(r[0][0], r[1][0], r[2][0]),
            Vec3::new(r[0][1], r[1][1], r[2][1]),
            Vec3::new(r[0][2], r[1][2], r[2][2]),
        );
        Quat::from_mat3(&m3).normalize()
    }

    /// Recompose `T * S * K * R * P`, inverting the factorization exactly
    pub fn compose(&self) -> Mat4 {
        let r = &self.rotation;
        let row0 = Vec3::new(r[0][0], r[0][1], r[0][2]);
        let row1 = Vec3::new(r[1][0], r[1][1], r[1][2]) + self.sxy * row0;
        let row2 = Vec3::new(r[2][0], r[2][1], r[2][2])
            + self.sxz * row0
            + self.syz * (Vec3::new(r[1][0], r[1][1], r[1][2]));
        let rows3 = [row0 * self.sx, row1 * self.sy, row2 * self.sz];

        let mut rows = [[0.0f32; 4]; 4];
        for (i, row) in rows3.iter().enumerate() {
            rows[i][0] = row.x;
            rows[i][1] = row.y;
            rows[i][2] = row.z;
        }
        rows[0][3] = self.tx;
        rows[1][3] = self.ty;
        rows[2][3] = self.tz;
        rows[3] = if self.px == 0.0 && self.py == 0.0 && self.pz == 0.0 {
            [0.0, 0.0, 0.0, 1.0]
        } else {
            [self.px, self.py, self.pz, self.pw]
        };
        rows_to_mat(&rows)
    }

    /// Recompose `T * S * R` only, the subset the motion interpolation
    /// carries between knots
    pub fn compose_trs(&self) -> Mat4 {
        let r = &self.rotation;
        let mut rows = *r;
        for j in 0..3 {
            rows[0][j] *= self.sx;
            rows[1][j] *= self.sy;
            rows[2][j] *= self.sz;
        }
        rows[0][3] = self.tx;
        rows[1][3] = self.ty;
        rows[2][3] = self.tz;
        rows[3] = [0.0, 0.0, 0.0, 1.0];
        rows_to_mat(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frobenius_distance(a: &Mat4, b: &Mat4) -> f32 {
        let aa = a.to_cols_array();
        let bb = b.to_cols_array();
        aa.iter()
            .zip(bb.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn test_full_round_trip() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 3.0, 0.5),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.8, 1.2),
            Vec3::new(5.0, -1.0, 2.0),
        );
        let d = DecomposedTransform::decompose(&m);
        assert!(d.valid);
        assert!(frobenius_distance(&d.compose(), &m) < 1e-4);
    }

    #[test]
    fn test_round_trip_without_rotation_has_no_shear() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            * Mat4::from_scale(Vec3::new(2.0, 5.0, 0.25));
        let d = DecomposedTransform::decompose(&m);
        assert!(d.valid);
        assert_eq!((d.sxy, d.sxz, d.syz), (0.0, 0.0, 0.0));
        assert!(frobenius_distance(&d.compose_trs(), &m) < 1e-5);
    }

    #[test]
    fn test_random_matrices_round_trip() {
        // A batch of awkward but non-singular matrices
        for seed in 0..16u32 {
            let s = seed as f32;
            let m = Mat4::from_scale_rotation_translation(
                Vec3::new(0.5 + s * 0.3, 1.0 + (s * 0.7) % 2.0, 0.2 + (s * 1.3) % 3.0),
                Quat::from_euler(glam::EulerRot::ZYX, s * 0.37, -s * 0.21, s * 0.11),
                Vec3::new(s, -2.0 * s, s * 0.5),
            );
            let d = DecomposedTransform::decompose(&m);
            assert!(d.valid);
            let dist = frobenius_distance(&d.compose(), &m);
            assert!(dist < 1e-4, "seed {} distance {}", seed, dist);
        }
    }

    #[test]
    fn test_translation_extraction() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let d = DecomposedTransform::decompose(&m);
        assert!(d.valid);
        assert_eq!((d.tx, d.ty, d.tz), (1.0, 2.0, 3.0));
        assert_eq!((d.sx, d.sy, d.sz), (1.0, 1.0, 1.0));
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let d = DecomposedTransform::decompose(&m);
        assert!(!d.valid);
    }

    #[test]
    fn test_handedness_flip() {
        let m = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        let d = DecomposedTransform::decompose(&m);
        assert!(d.valid);
        // All three scales flip together so the rotation stays proper
        assert!(d.sx < 0.0 && d.sy < 0.0 && d.sz < 0.0);
        assert!(frobenius_distance(&d.compose(), &m) < 1e-4);
    }
}
