//! Flattened BVH array nodes

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::geometry::Bbox;

/// Leaf flag, stored in bit 31 of the node-data word
pub const LEAF_FLAG: u32 = 0x8000_0000;

pub fn is_leaf(node_data: u32) -> bool {
    node_data & LEAF_FLAG != 0
}

pub fn skip_index(node_data: u32) -> u32 {
    node_data & !LEAF_FLAG
}

/// Triangle leaf payload: local vertex indices plus the owning mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleLeaf {
    pub v: [u32; 3],
    pub mesh_index: u32,
    pub triangle_index: u32,
}

/// BVH-of-BVH leaf payload
///
/// Exactly one of `transform_index` / `motion_index` is set (the other is
/// `NULL_INDEX`); both unset means an untransformed mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvhLeaf {
    pub leaf_index: u32,
    pub transform_index: u32,
    pub motion_index: u32,
    pub mesh_offset_index: u32,
}

/// One flattened node: six payload words plus the skip/leaf word
///
/// Inner nodes store their bbox as float bits; leaves reinterpret the same
/// words as indices. The accessors below are the only place the payload is
/// decoded.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BvhArrayNode {
    pub data: [u32; 6],
    pub node_data: u32,
}

impl Default for BvhArrayNode {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl BvhArrayNode {
    pub fn inner(bbox: &Bbox, skip: u32) -> Self {
        debug_assert!(!is_leaf(skip));
        Self {
            data: [
                bbox.min.x.to_bits(),
                bbox.min.y.to_bits(),
                bbox.min.z.to_bits(),
                bbox.max.x.to_bits(),
                bbox.max.y.to_bits(),
                bbox.max.z.to_bits(),
            ],
            node_data: skip,
        }
    }

    pub fn triangle_leaf(leaf: &TriangleLeaf, node_data: u32) -> Self {
        debug_assert!(is_leaf(node_data));
        Self {
            data: [
                leaf.v[0],
                leaf.v[1],
                leaf.v[2],
                leaf.mesh_index,
                leaf.triangle_index,
                0,
            ],
            node_data,
        }
    }

    pub fn bvh_leaf(leaf: &BvhLeaf, node_data: u32) -> Self {
        debug_assert!(is_leaf(node_data));
        Self {
            data: [
                leaf.leaf_index,
                leaf.transform_index,
                leaf.motion_index,
                leaf.mesh_offset_index,
                0,
                0,
            ],
            node_data,
        }
    }

    /// Entry-index leaf used by the point-set index BVH
    pub fn entry_leaf(entry_index: u32, node_data: u32) -> Self {
        debug_assert!(is_leaf(node_data));
        Self {
            data: [entry_index, 0, 0, 0, 0, 0],
            node_data,
        }
    }

    pub fn is_leaf(&self) -> bool {
        is_leaf(self.node_data)
    }

    pub fn skip_index(&self) -> u32 {
        skip_index(self.node_data)
    }

    pub fn bbox_min(&self) -> Vec3 {
        debug_assert!(!self.is_leaf());
        Vec3::new(
            f32::from_bits(self.data[0]),
            f32::from_bits(self.data[1]),
            f32::from_bits(self.data[2]),
        )
    }

    pub fn bbox_max(&self) -> Vec3 {
        debug_assert!(!self.is_leaf());
        Vec3::new(
            f32::from_bits(self.data[3]),
            f32::from_bits(self.data[4]),
            f32::from_bits(self.data[5]),
        )
    }

    pub fn bbox(&self) -> Bbox {
        Bbox::new(self.bbox_min(), self.bbox_max())
    }

    pub fn as_triangle_leaf(&self) -> TriangleLeaf {
        debug_assert!(self.is_leaf());
        TriangleLeaf {
            v: [self.data[0], self.data[1], self.data[2]],
            mesh_index: self.data[3],
            triangle_index: self.data[4],
        }
    }

    pub fn as_bvh_leaf(&self) -> BvhLeaf {
        debug_assert!(self.is_leaf());
        BvhLeaf {
            leaf_index: self.data[0],
            transform_index: self.data[1],
            motion_index: self.data[2],
            mesh_offset_index: self.data[3],
        }
    }

    pub fn as_entry_leaf(&self) -> u32 {
        debug_assert!(self.is_leaf());
        self.data[0]
    }

    /// Point-inside test against an inner node's box
    pub fn contains_point(&self, p: Vec3) -> bool {
        let min = self.bbox_min();
        let max = self.bbox_max();
        p.x >= min.x
            && p.x <= max.x
            && p.y >= min.y
            && p.y <= max.y
            && p.z >= min.z
            && p.z <= max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_flag() {
        assert!(is_leaf(5 | LEAF_FLAG));
        assert!(!is_leaf(5));
        assert_eq!(skip_index(5 | LEAF_FLAG), 5);
    }

    #[test]
    fn test_node_size() {
        assert_eq!(std::mem::size_of::<BvhArrayNode>(), 28);
    }

    #[test]
    fn test_payload_round_trip() {
        let bbox = Bbox::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        let inner = BvhArrayNode::inner(&bbox, 7);
        assert_eq!(inner.bbox(), bbox);
        assert_eq!(inner.skip_index(), 7);

        let tri = TriangleLeaf {
            v: [3, 4, 5],
            mesh_index: 2,
            triangle_index: 9,
        };
        let leaf = BvhArrayNode::triangle_leaf(&tri, 8 | LEAF_FLAG);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.as_triangle_leaf(), tri);
    }
}
