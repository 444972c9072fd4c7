//! Triangle meshes and their instanced / motion-blurred variants
//!
//! Base meshes own their vertex and triangle arrays; instances and motion
//! wrappers share a base mesh through `Arc` and contribute only their
//! transform. The `VertexBuffer` newtype is the allocation contract: a mesh
//! can only be built from a buffer the caller constructed through it.

mod ext;

pub use ext::{ExtTriangleMesh, MAX_CHANNEL_COUNT};

use std::sync::Arc;

use glam::Vec3;

use crate::error::{RenderError, RenderResult};
use crate::geometry::{triangle_area, Bbox, Transform};
use crate::motion::MotionSystem;

/// Owned vertex storage for mesh construction
///
/// Replaces the sentinel-float convention of checking "was this buffer
/// allocated by us" at run time; here the type system enforces it.
#[derive(Debug, Clone, Default)]
pub struct VertexBuffer(Vec<Vec3>);

impl VertexBuffer {
    pub fn with_capacity(vertex_count: usize) -> Self {
        Self(Vec::with_capacity(vertex_count))
    }

    pub fn from_points(points: Vec<Vec3>) -> Self {
        Self(points)
    }

    pub fn push(&mut self, p: Vec3) {
        self.0.push(p);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A triangle mesh owning its geometry
///
/// Surface area and the bounding box are cached at construction and
/// recomputed whenever a transform is applied to the vertices.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    area: f32,
    bbox: Bbox,
    applied_trans_swaps_handedness: bool,
}

impl TriangleMesh {
    pub fn new(vertices: VertexBuffer, triangles: Vec<[u32; 3]>) -> RenderResult<Self> {
        let vertices = vertices.0;
        if vertices.is_empty() {
            return Err(RenderError::invalid_geometry("mesh has no vertices"));
        }
        if triangles.is_empty() {
            return Err(RenderError::invalid_geometry("mesh has no triangles"));
        }
        let vertex_count = vertices.len() as u32;
        for (i, tri) in triangles.iter().enumerate() {
            if tri.iter().any(|&v| v >= vertex_count) {
                return Err(RenderError::invalid_geometry(format!(
                    "triangle {} references vertex out of range",
                    i
                )));
            }
        }

        let mut mesh = Self {
            vertices,
            triangles,
            area: 0.0,
            bbox: Bbox::EMPTY,
            applied_trans_swaps_handedness: false,
        };
        mesh.preprocess();
        Ok(mesh)
    }

    fn preprocess(&mut self) {
        self.area = (0..self.triangles.len())
            .map(|i| self.triangle_area(i as u32))
            .sum();
        self.bbox = self
            .vertices
            .iter()
            .fold(Bbox::EMPTY, |b, &v| b.union_point(v));
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangles.len() as u32
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn bbox(&self) -> Bbox {
        self.bbox
    }

    pub fn triangle_vertices(&self, tri_index: u32) -> [Vec3; 3] {
        let t = self.triangles[tri_index as usize];
        [
            self.vertices[t[0] as usize],
            self.vertices[t[1] as usize],
            self.vertices[t[2] as usize],
        ]
    }

    pub fn triangle_area(&self, tri_index: u32) -> f32 {
        let [p0, p1, p2] = self.triangle_vertices(tri_index);
        triangle_area(p0, p1, p2)
    }

    pub fn geometric_normal(&self, tri_index: u32) -> Vec3 {
        let [p0, p1, p2] = self.triangle_vertices(tri_index);
        (p1 - p0).cross(p2 - p0).normalize_or_zero()
    }

    /// Uniformly sample a point on a triangle
    pub fn sample(&self, tri_index: u32, u0: f32, u1: f32) -> (Vec3, f32, f32, f32) {
        let [p0, p1, p2] = self.triangle_vertices(tri_index);
        let su0 = u0.sqrt();
        let b0 = 1.0 - su0;
        let b1 = u1 * su0;
        let b2 = 1.0 - b0 - b1;
        (b0 * p0 + b1 * p1 + b2 * p2, b0, b1, b2)
    }

    /// Bake a transform into the vertices, invalidating the caches
    pub fn apply_transform(&mut self, trans: &Transform) {
        for v in &mut self.vertices {
            *v = trans.transform_point(*v);
        }
        self.applied_trans_swaps_handedness = trans.swaps_handedness();
        self.preprocess();
    }

    pub fn applied_trans_swaps_handedness(&self) -> bool {
        self.applied_trans_swaps_handedness
    }
}

/// A scene object's geometry: a base mesh plus how it is placed in the world
#[derive(Debug, Clone)]
pub enum SceneMesh {
    /// Vertices already in world space
    Plain(Arc<TriangleMesh>),
    /// Shared base mesh with a static placement
    Instance {
        mesh: Arc<TriangleMesh>,
        transform: Transform,
    },
    /// Shared base mesh following a motion system
    Motion {
        mesh: Arc<TriangleMesh>,
        motion: MotionSystem,
    },
}

impl SceneMesh {
    pub fn base(&self) -> &Arc<TriangleMesh> {
        match self {
            SceneMesh::Plain(mesh) => mesh,
            SceneMesh::Instance { mesh, .. } => mesh,
            SceneMesh::Motion { mesh, .. } => mesh,
        }
    }

    pub fn total_vertex_count(&self) -> u32 {
        self.base().vertex_count()
    }

    pub fn total_triangle_count(&self) -> u32 {
        self.base().triangle_count()
    }

    /// Local-to-world transform at `time`; plain meshes are identity
    pub fn local_to_world(&self, time: f32) -> Transform {
        match self {
            SceneMesh::Plain(_) => Transform::IDENTITY,
            SceneMesh::Instance { transform, .. } => *transform,
            SceneMesh::Motion { motion, .. } => Transform::new(motion.sample(time)),
        }
    }

    /// World-space bounds, conservative over the whole shutter for motion
    pub fn world_bbox(&self) -> Bbox {
        match self {
            SceneMesh::Plain(mesh) => mesh.bbox(),
            SceneMesh::Instance { mesh, transform } => transform.transform_bbox(&mesh.bbox()),
            SceneMesh::Motion { mesh, motion } => motion.bound(&mesh.bbox(), false),
        }
    }

    /// World-space surface area at `time`
    pub fn area(&self, time: f32) -> f32 {
        match self {
            SceneMesh::Plain(mesh) => mesh.area(),
            _ => {
                let mesh = self.base();
                let l2w = self.local_to_world(time);
                (0..mesh.triangle_count())
                    .map(|i| {
                        let [p0, p1, p2] = mesh.triangle_vertices(i);
                        triangle_area(
                            l2w.transform_point(p0),
                            l2w.transform_point(p1),
                            l2w.transform_point(p2),
                        )
                    })
                    .sum()
            }
        }
    }

    pub fn is_motion(&self) -> bool {
        matches!(self, SceneMesh::Motion { .. })
    }
}
