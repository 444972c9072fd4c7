//! Orthonormal shading frames

use glam::Vec3;

/// Orthonormal basis around a shading normal (`n` is the local Z axis)
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

impl Frame {
    /// Build a frame from a (unit) normal using the branchless Duff basis
    pub fn from_z(n: Vec3) -> Self {
        let sign = 1.0f32.copysign(n.z);
        let a = -1.0 / (sign + n.z);
        let b = n.x * n.y * a;
        Frame {
            x: Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x),
            y: Vec3::new(b, sign + n.y * n.y * a, -n.y),
            z: n,
        }
    }

    pub fn to_world(&self, v: Vec3) -> Vec3 {
        v.x * self.x + v.y * self.y + v.z * self.z
    }

    pub fn to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.x), v.dot(self.y), v.dot(self.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_orthonormal() {
        for n in [
            Vec3::Z,
            -Vec3::Z,
            Vec3::new(0.3, -0.5, 0.81).normalize(),
            Vec3::new(-0.9, 0.1, -0.4).normalize(),
        ] {
            let f = Frame::from_z(n);
            assert!(f.x.dot(f.y).abs() < 1e-5);
            assert!(f.x.dot(f.z).abs() < 1e-5);
            assert!(f.y.dot(f.z).abs() < 1e-5);
            assert!((f.x.length() - 1.0).abs() < 1e-5);
            assert!((f.y.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_round_trip() {
        let f = Frame::from_z(Vec3::new(0.6, 0.0, 0.8));
        let v = Vec3::new(0.1, -0.7, 0.4);
        assert!((f.to_local(f.to_world(v)) - v).length() < 1e-5);
    }
}
