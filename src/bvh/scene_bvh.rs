//! Two-level scene accelerator
//!
//! One bottom-level BVH per distinct base mesh plus a top-level BVH over the
//! scene objects. Top-level leaves carry either a static transform index or
//! a motion-system index; the ray is moved into the mesh's local frame with
//! its direction left unnormalized so hit distances stay comparable across
//! both levels.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::error::{RenderError, RenderResult};
use crate::geometry::{intersect_triangle, Ray, RayHit, Transform, NULL_INDEX};
use crate::mesh::{SceneMesh, TriangleMesh};
use crate::motion::MotionSystem;

use super::build::{build_sah, flatten_tree, BuildItem, BvhParams};
use super::morton::build_morton;
use super::node::{BvhArrayNode, BvhLeaf, TriangleLeaf};

/// Which builder backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BvhBuilderType {
    /// Classical SAH build, better traversal
    #[default]
    Sah,
    /// Morton-order build, faster construction
    Morton,
}

/// Two-level BVH over the scene objects
pub struct SceneBvh {
    unique_meshes: Vec<Arc<TriangleMesh>>,
    mesh_bvhs: Vec<Vec<BvhArrayNode>>,
    transforms: Vec<Transform>,
    motions: Vec<MotionSystem>,
    top_nodes: Vec<BvhArrayNode>,
    total_vertex_count: u64,
    total_triangle_count: u64,
}

fn build_tree<L: Copy + Send>(
    builder: BvhBuilderType,
    params: &BvhParams,
    items: &mut [BuildItem<L>],
) -> super::build::BuildNode<L> {
    match builder {
        BvhBuilderType::Sah => build_sah(params, items),
        BvhBuilderType::Morton => build_morton(items),
    }
}

fn build_mesh_bvh(
    mesh: &TriangleMesh,
    mesh_index: u32,
    builder: BvhBuilderType,
    params: &BvhParams,
) -> Vec<BvhArrayNode> {
    let mut items: Vec<BuildItem<TriangleLeaf>> = mesh
        .triangles()
        .iter()
        .enumerate()
        .map(|(i, tri)| {
            let [p0, p1, p2] = mesh.triangle_vertices(i as u32);
            BuildItem {
                bbox: crate::geometry::Bbox::from_point(p0)
                    .union_point(p1)
                    .union_point(p2),
                item: TriangleLeaf {
                    v: *tri,
                    mesh_index,
                    triangle_index: i as u32,
                },
            }
        })
        .collect();
    let root = build_tree(builder, params, &mut items);
    flatten_tree(
        &root,
        |leaf, node_data| BvhArrayNode::triangle_leaf(leaf, node_data),
        |bbox, skip| BvhArrayNode::inner(bbox, skip),
    )
}

impl SceneBvh {
    /// Build the accelerator over `objects`
    pub fn build(
        objects: &[SceneMesh],
        builder: BvhBuilderType,
        params: &BvhParams,
    ) -> RenderResult<Self> {
        if objects.is_empty() {
            return Err(RenderError::invalid_geometry(
                "cannot build an accelerator over an empty scene",
            ));
        }

        // Deduplicate base meshes so instances share a bottom-level BVH
        let mut unique_meshes: Vec<Arc<TriangleMesh>> = Vec::new();
        let mut mesh_leaf_index = Vec::with_capacity(objects.len());
        for object in objects {
            let base = object.base();
            let index = unique_meshes
                .iter()
                .position(|m| Arc::ptr_eq(m, base))
                .unwrap_or_else(|| {
                    unique_meshes.push(base.clone());
                    unique_meshes.len() - 1
                });
            mesh_leaf_index.push(index as u32);
        }

        let mesh_bvhs: Vec<Vec<BvhArrayNode>> = unique_meshes
            .par_iter()
            .enumerate()
            .map(|(i, mesh)| build_mesh_bvh(mesh, i as u32, builder, params))
            .collect();

        // Top-level leaves: one per scene object
        let mut transforms = Vec::new();
        let mut motions = Vec::new();
        let mut top_items: Vec<BuildItem<BvhLeaf>> = Vec::with_capacity(objects.len());
        for (object_index, object) in objects.iter().enumerate() {
            let mut leaf = BvhLeaf {
                leaf_index: mesh_leaf_index[object_index],
                transform_index: NULL_INDEX,
                motion_index: NULL_INDEX,
                mesh_offset_index: object_index as u32,
            };
            match object {
                SceneMesh::Plain(_) => {}
                SceneMesh::Instance { transform, .. } => {
                    leaf.transform_index = transforms.len() as u32;
                    transforms.push(*transform);
                }
                SceneMesh::Motion { motion, .. } => {
                    leaf.motion_index = motions.len() as u32;
                    motions.push(motion.clone());
                }
            }
            top_items.push(BuildItem {
                bbox: object.world_bbox(),
                item: leaf,
            });
        }

        let top_root = build_tree(builder, params, &mut top_items);
        let top_nodes = flatten_tree(
            &top_root,
            |leaf, node_data| BvhArrayNode::bvh_leaf(leaf, node_data),
            |bbox, skip| BvhArrayNode::inner(bbox, skip),
        );

        let total_vertex_count = objects
            .iter()
            .map(|o| o.total_vertex_count() as u64)
            .sum();
        let total_triangle_count = objects
            .iter()
            .map(|o| o.total_triangle_count() as u64)
            .sum();

        debug!(
            "scene BVH built: {} objects, {} unique meshes, {} top nodes",
            objects.len(),
            unique_meshes.len(),
            top_nodes.len()
        );

        Ok(Self {
            unique_meshes,
            mesh_bvhs,
            transforms,
            motions,
            top_nodes,
            total_vertex_count,
            total_triangle_count,
        })
    }

    pub fn total_vertex_count(&self) -> u64 {
        self.total_vertex_count
    }

    pub fn total_triangle_count(&self) -> u64 {
        self.total_triangle_count
    }

    pub fn node_memory_usage(&self) -> usize {
        let bottom: usize = self.mesh_bvhs.iter().map(Vec::len).sum();
        (bottom + self.top_nodes.len()) * std::mem::size_of::<BvhArrayNode>()
    }

    /// In-place refit after vertex motion
    ///
    /// The shared bottom-level layout always requires a full rebuild.
    pub fn update(&mut self) -> RenderResult<()> {
        Err(RenderError::invalid_parameter(
            "two-level accelerator does not support in-place refit; rebuild instead",
        ))
    }

    fn local_ray(&self, leaf: &BvhLeaf, ray: &Ray) -> Ray {
        if leaf.transform_index != NULL_INDEX {
            self.transforms[leaf.transform_index as usize]
                .inverse()
                .transform_ray(ray)
        } else if leaf.motion_index != NULL_INDEX {
            let m = self.motions[leaf.motion_index as usize].sample_inverse(ray.time);
            Ray {
                origin: m.transform_point3(ray.origin),
                direction: m.transform_vector3(ray.direction),
                ..*ray
            }
        } else {
            *ray
        }
    }

    /// Does `(t, mesh, tri)` beat the current hit? Equal distances break
    /// ties toward the smaller mesh index, then triangle index.
    fn is_better_hit(hit: &RayHit, t: f32, mesh_index: u32, triangle_index: u32) -> bool {
        if t < hit.t {
            return true;
        }
        t == hit.t
            && (mesh_index < hit.mesh_index
                || (mesh_index == hit.mesh_index && triangle_index < hit.triangle_index))
    }

    fn intersect_mesh(
        &self,
        leaf_index: u32,
        mesh_offset_index: u32,
        local_ray: &Ray,
        hit: &mut RayHit,
    ) {
        let nodes = &self.mesh_bvhs[leaf_index as usize];
        let vertices = self.unique_meshes[leaf_index as usize].vertices();

        let mut ray = *local_ray;
        let mut current = 0u32;
        let stop = nodes[0].skip_index();
        while current < stop {
            let node = &nodes[current as usize];
            if node.is_leaf() {
                let leaf = node.as_triangle_leaf();
                let p0 = vertices[leaf.v[0] as usize];
                let p1 = vertices[leaf.v[1] as usize];
                let p2 = vertices[leaf.v[2] as usize];
                if let Some(tri_hit) = intersect_triangle(&ray, p0, p1, p2) {
                    if Self::is_better_hit(hit, tri_hit.t, mesh_offset_index, leaf.triangle_index)
                    {
                        *hit = RayHit {
                            t: tri_hit.t,
                            b1: tri_hit.b1,
                            b2: tri_hit.b2,
                            mesh_index: mesh_offset_index,
                            triangle_index: leaf.triangle_index,
                        };
                        ray.t_max = tri_hit.t;
                    }
                }
                current += 1;
            } else if node
                .bbox()
                .intersect_segment(ray.origin, ray.direction, ray.t_min, ray.t_max)
                .is_some()
            {
                current += 1;
            } else {
                current = node.skip_index();
            }
        }
    }

    /// Closest hit along `[ray.t_min, ray.t_max]`; misses have `t == +inf`
    pub fn intersect(&self, ray: &Ray) -> RayHit {
        let mut hit = RayHit::miss();

        let mut current = 0u32;
        let stop = self.top_nodes[0].skip_index();
        while current < stop {
            let node = &self.top_nodes[current as usize];
            if node.is_leaf() {
                let leaf = node.as_bvh_leaf();
                let mut local = self.local_ray(&leaf, ray);
                local.t_max = local.t_max.min(hit.t);
                self.intersect_mesh(leaf.leaf_index, leaf.mesh_offset_index, &local, &mut hit);
                current += 1;
            } else {
                let t_max = ray.t_max.min(hit.t);
                if node
                    .bbox()
                    .intersect_segment(ray.origin, ray.direction, ray.t_min, t_max)
                    .is_some()
                {
                    current += 1;
                } else {
                    current = node.skip_index();
                }
            }
        }

        hit
    }

    /// Any-hit query for shadow rays; returns on the first accepted hit
    pub fn intersect_any(&self, ray: &Ray) -> bool {
        let mut current = 0u32;
        let stop = self.top_nodes[0].skip_index();
        while current < stop {
            let node = &self.top_nodes[current as usize];
            if node.is_leaf() {
                let leaf = node.as_bvh_leaf();
                let local = self.local_ray(&leaf, ray);
                if self.intersect_mesh_any(leaf.leaf_index, &local) {
                    return true;
                }
                current += 1;
            } else if node
                .bbox()
                .intersect_segment(ray.origin, ray.direction, ray.t_min, ray.t_max)
                .is_some()
            {
                current += 1;
            } else {
                current = node.skip_index();
            }
        }
        false
    }

    fn intersect_mesh_any(&self, leaf_index: u32, ray: &Ray) -> bool {
        let nodes = &self.mesh_bvhs[leaf_index as usize];
        let vertices = self.unique_meshes[leaf_index as usize].vertices();

        let mut current = 0u32;
        let stop = nodes[0].skip_index();
        while current < stop {
            let node = &nodes[current as usize];
            if node.is_leaf() {
                let leaf = node.as_triangle_leaf();
                let p0 = vertices[leaf.v[0] as usize];
                let p1 = vertices[leaf.v[1] as usize];
                let p2 = vertices[leaf.v[2] as usize];
                if intersect_triangle(ray, p0, p1, p2).is_some() {
                    return true;
                }
                current += 1;
            } else if node
                .bbox()
                .intersect_segment(ray.origin, ray.direction, ray.t_min, ray.t_max)
                .is_some()
            {
                current += 1;
            } else {
                current = node.skip_index();
            }
        }
        false
    }
}
