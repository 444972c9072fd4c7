//! Bounding volume hierarchies
//!
//! The build side produces a first-child/right-sibling tree which is then
//! flattened into a compact array traversed without a stack: inner nodes
//! carry a skip index to their next sibling subtree, leaves set bit 31 of
//! the same word. Two builders share the layout, the classical SAH build
//! and a morton-code build used when construction speed matters more than
//! traversal quality.

mod build;
mod morton;
mod node;
mod scene_bvh;

pub use build::{build_sah, count_nodes, flatten_tree, BuildItem, BuildNode, BvhParams};
pub use morton::{build_morton, morton_encode};
pub use node::{is_leaf, skip_index, BvhArrayNode, BvhLeaf, TriangleLeaf, LEAF_FLAG};
pub use scene_bvh::{BvhBuilderType, SceneBvh};
