//! Extended triangle meshes
//!
//! Adds shading attributes on top of the raw geometry: optional per-vertex
//! normals plus a fixed number of independent channels of UVs, colors,
//! alphas and AOV floats.

use glam::{Vec2, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::spectrum::Spectrum;

use super::TriangleMesh;

/// Maximum number of independent UV/color/alpha/AOV channels
pub const MAX_CHANNEL_COUNT: usize = 8;

type Channels<T> = [Option<Vec<T>>; MAX_CHANNEL_COUNT];

fn empty_channels<T>() -> Channels<T> {
    std::array::from_fn(|_| None)
}

/// A triangle mesh with shading attributes
#[derive(Debug, Clone)]
pub struct ExtTriangleMesh {
    mesh: TriangleMesh,
    normals: Option<Vec<Vec3>>,
    uvs: Channels<Vec2>,
    colors: Channels<Spectrum>,
    alphas: Channels<f32>,
    vertex_aovs: Channels<f32>,
    triangle_aovs: Channels<f32>,
}

impl ExtTriangleMesh {
    pub fn new(mesh: TriangleMesh) -> Self {
        Self {
            mesh,
            normals: None,
            uvs: empty_channels(),
            colors: empty_channels(),
            alphas: empty_channels(),
            vertex_aovs: empty_channels(),
            triangle_aovs: empty_channels(),
        }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn into_mesh(self) -> TriangleMesh {
        self.mesh
    }

    fn check_vertex_len(&self, len: usize, what: &str) -> RenderResult<()> {
        if len != self.mesh.vertex_count() as usize {
            return Err(RenderError::invalid_geometry(format!(
                "{} array length {} does not match vertex count {}",
                what,
                len,
                self.mesh.vertex_count()
            )));
        }
        Ok(())
    }

    fn check_channel(channel: usize) -> RenderResult<()> {
        if channel >= MAX_CHANNEL_COUNT {
            return Err(RenderError::invalid_parameter(format!(
                "channel index {} out of range (max {})",
                channel,
                MAX_CHANNEL_COUNT - 1
            )));
        }
        Ok(())
    }

    pub fn set_normals(&mut self, normals: Vec<Vec3>) -> RenderResult<()> {
        self.check_vertex_len(normals.len(), "normal")?;
        self.normals = Some(normals);
        Ok(())
    }

    pub fn set_uvs(&mut self, channel: usize, uvs: Vec<Vec2>) -> RenderResult<()> {
        Self::check_channel(channel)?;
        self.check_vertex_len(uvs.len(), "uv")?;
        self.uvs[channel] = Some(uvs);
        Ok(())
    }

    pub fn set_colors(&mut self, channel: usize, colors: Vec<Spectrum>) -> RenderResult<()> {
        Self::check_channel(channel)?;
        self.check_vertex_len(colors.len(), "color")?;
        self.colors[channel] = Some(colors);
        Ok(())
    }

    pub fn set_alphas(&mut self, channel: usize, alphas: Vec<f32>) -> RenderResult<()> {
        Self::check_channel(channel)?;
        self.check_vertex_len(alphas.len(), "alpha")?;
        self.alphas[channel] = Some(alphas);
        Ok(())
    }

    pub fn set_vertex_aovs(&mut self, channel: usize, aovs: Vec<f32>) -> RenderResult<()> {
        Self::check_channel(channel)?;
        self.check_vertex_len(aovs.len(), "vertex AOV")?;
        self.vertex_aovs[channel] = Some(aovs);
        Ok(())
    }

    pub fn set_triangle_aovs(&mut self, channel: usize, aovs: Vec<f32>) -> RenderResult<()> {
        Self::check_channel(channel)?;
        if aovs.len() != self.mesh.triangle_count() as usize {
            return Err(RenderError::invalid_geometry(format!(
                "triangle AOV array length {} does not match triangle count {}",
                aovs.len(),
                self.mesh.triangle_count()
            )));
        }
        self.triangle_aovs[channel] = Some(aovs);
        Ok(())
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_uvs(&self, channel: usize) -> bool {
        channel < MAX_CHANNEL_COUNT && self.uvs[channel].is_some()
    }

    /// Interpolated shading normal, falling back to the geometric normal
    pub fn shade_normal(&self, tri_index: u32, b1: f32, b2: f32) -> Vec3 {
        match &self.normals {
            Some(normals) => {
                let t = self.mesh.triangles()[tri_index as usize];
                let b0 = 1.0 - b1 - b2;
                (b0 * normals[t[0] as usize]
                    + b1 * normals[t[1] as usize]
                    + b2 * normals[t[2] as usize])
                    .normalize_or_zero()
            }
            None => self.mesh.geometric_normal(tri_index),
        }
    }

    pub fn uv(&self, channel: usize, tri_index: u32, b1: f32, b2: f32) -> Option<Vec2> {
        let uvs = self.uvs.get(channel)?.as_ref()?;
        let t = self.mesh.triangles()[tri_index as usize];
        let b0 = 1.0 - b1 - b2;
        Some(b0 * uvs[t[0] as usize] + b1 * uvs[t[1] as usize] + b2 * uvs[t[2] as usize])
    }

    pub fn alpha(&self, channel: usize, tri_index: u32, b1: f32, b2: f32) -> Option<f32> {
        let alphas = self.alphas.get(channel)?.as_ref()?;
        let t = self.mesh.triangles()[tri_index as usize];
        let b0 = 1.0 - b1 - b2;
        Some(b0 * alphas[t[0] as usize] + b1 * alphas[t[1] as usize] + b2 * alphas[t[2] as usize])
    }

    pub fn triangle_aov(&self, channel: usize, tri_index: u32) -> Option<f32> {
        Some(self.triangle_aovs.get(channel)?.as_ref()?[tri_index as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VertexBuffer;

    fn single_triangle() -> TriangleMesh {
        let mut vb = VertexBuffer::with_capacity(3);
        vb.push(Vec3::ZERO);
        vb.push(Vec3::X);
        vb.push(Vec3::Y);
        TriangleMesh::new(vb, vec![[0, 1, 2]]).unwrap()
    }

    #[test]
    fn test_shade_normal_interpolation() {
        let mut ext = ExtTriangleMesh::new(single_triangle());
        ext.set_normals(vec![Vec3::Z, Vec3::Z, Vec3::X]).unwrap();
        let n = ext.shade_normal(0, 0.0, 0.0);
        assert!((n - Vec3::Z).length() < 1e-6);
        let n = ext.shade_normal(0, 0.0, 1.0);
        assert!((n - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_channel_bounds() {
        let mut ext = ExtTriangleMesh::new(single_triangle());
        assert!(ext
            .set_uvs(MAX_CHANNEL_COUNT, vec![Vec2::ZERO; 3])
            .is_err());
        assert!(ext.set_uvs(0, vec![Vec2::ZERO; 2]).is_err());
        assert!(ext.set_uvs(7, vec![Vec2::ZERO; 3]).is_ok());
        assert!(ext.has_uvs(7));
        assert!(!ext.has_uvs(0));
    }

    #[test]
    fn test_uv_interpolation() {
        let mut ext = ExtTriangleMesh::new(single_triangle());
        ext.set_uvs(
            0,
            vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
        )
        .unwrap();
        let uv = ext.uv(0, 0, 0.5, 0.25).unwrap();
        assert!((uv - Vec2::new(0.5, 0.25)).length() < 1e-6);
        assert!(ext.uv(1, 0, 0.0, 0.0).is_none());
    }
}
