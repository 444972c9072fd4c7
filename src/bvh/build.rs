//! Classical SAH build and the shared flattening pass
//!
//! The split search picks the axis with the largest centroid variance, then
//! samples `cost_samples` candidate positions across the node bounds and
//! keeps the cheapest by the surface-area heuristic. All centroid math works
//! on doubled centroids (`bbox.min + bbox.max`) to avoid the halving.

use glam::Vec3;

use crate::geometry::Bbox;

/// Build parameters shared by both builder backends
#[derive(Debug, Clone, Copy)]
pub struct BvhParams {
    /// Output arity: 2, 4 or 8
    pub tree_type: u32,
    /// SAH candidate positions per split; fewer than 2 splits at the mean
    pub cost_samples: u32,
    pub isect_cost: f32,
    pub traversal_cost: f32,
    pub empty_bonus: f32,
}

impl Default for BvhParams {
    fn default() -> Self {
        Self {
            tree_type: 4,
            cost_samples: 0,
            isect_cost: 80.0,
            traversal_cost: 10.0,
            empty_bonus: 0.5,
        }
    }
}

/// A primitive handed to a builder
#[derive(Debug, Clone, Copy)]
pub struct BuildItem<L> {
    pub bbox: Bbox,
    pub item: L,
}

/// Build-time tree node
#[derive(Debug)]
pub enum BuildNode<L> {
    Leaf { bbox: Bbox, item: L },
    Inner { bbox: Bbox, children: Vec<BuildNode<L>> },
}

impl<L> BuildNode<L> {
    pub fn bbox(&self) -> Bbox {
        match self {
            BuildNode::Leaf { bbox, .. } => *bbox,
            BuildNode::Inner { bbox, .. } => *bbox,
        }
    }
}

pub fn count_nodes<L>(node: &BuildNode<L>) -> usize {
    match node {
        BuildNode::Leaf { .. } => 1,
        BuildNode::Inner { children, .. } => {
            1 + children.iter().map(count_nodes).sum::<usize>()
        }
    }
}

fn doubled_centroid<L>(item: &BuildItem<L>) -> Vec3 {
    item.bbox.min + item.bbox.max
}

/// Pick a split axis and position for `items`
fn find_best_split<L>(params: &BvhParams, items: &[BuildItem<L>]) -> (usize, f32) {
    if items.len() == 2 {
        let v = (doubled_centroid(&items[0]).x + doubled_centroid(&items[1]).x) / 2.0;
        return (0, v);
    }

    // Axis with the largest doubled-centroid variance
    let n = items.len() as f32;
    let mut mean2 = Vec3::ZERO;
    for it in items {
        mean2 += doubled_centroid(it);
    }
    mean2 /= n;
    let mut var = Vec3::ZERO;
    for it in items {
        let d = doubled_centroid(it) - mean2;
        var += d * d;
    }
    let axis = if var.x > var.y && var.x > var.z {
        0
    } else if var.y > var.z {
        1
    } else {
        2
    };

    if params.cost_samples > 1 {
        let mut node_bounds = Bbox::EMPTY;
        for it in items {
            node_bounds = node_bounds.union(&it.bbox);
        }
        let d = node_bounds.diagonal();
        let inv_total_sa = 1.0 / node_bounds.surface_area();

        let increment = 2.0 * d[axis] / (params.cost_samples + 1) as f32;
        let mut best_cost = f32::INFINITY;
        let mut best_split = mean2[axis];
        let mut split_val = 2.0 * node_bounds.min[axis] + increment;
        while split_val < 2.0 * node_bounds.max[axis] {
            let mut n_below = 0u32;
            let mut n_above = 0u32;
            let mut bb_below = Bbox::EMPTY;
            let mut bb_above = Bbox::EMPTY;
            for it in items {
                if doubled_centroid(it)[axis] < split_val {
                    n_below += 1;
                    bb_below = bb_below.union(&it.bbox);
                } else {
                    n_above += 1;
                    bb_above = bb_above.union(&it.bbox);
                }
            }
            let p_below = bb_below.surface_area() * inv_total_sa;
            let p_above = bb_above.surface_area() * inv_total_sa;
            let eb = if n_above == 0 || n_below == 0 {
                params.empty_bonus
            } else {
                0.0
            };
            let cost = params.traversal_cost
                + params.isect_cost
                    * (1.0 - eb)
                    * (p_below * n_below as f32 + p_above * n_above as f32);
            if cost < best_cost {
                best_cost = cost;
                best_split = split_val;
            }
            split_val += increment;
        }
        (axis, best_split)
    } else {
        // Split in half around the mean center
        (axis, mean2[axis])
    }
}

/// Partition `items` by doubled centroid, returning the middle index
///
/// The middle is clamped away from the range ends so coincident boxes are
/// still split instead of recursing forever.
fn partition_items<L>(items: &mut [BuildItem<L>], axis: usize, split_value: f32) -> usize {
    let mut middle = 0;
    for i in 0..items.len() {
        if doubled_centroid(&items[i])[axis] < split_value {
            items.swap(i, middle);
            middle += 1;
        }
    }
    middle.clamp(1, items.len() - 1)
}

fn build_recursive<L: Copy>(params: &BvhParams, items: &mut [BuildItem<L>]) -> BuildNode<L> {
    if items.len() == 1 {
        return BuildNode::Leaf {
            bbox: items[0].bbox,
            item: items[0].item,
        };
    }

    // Compute up to tree_type sub-ranges by repeated binary splits
    let mut splits: Vec<usize> = vec![0, items.len()];
    let mut arity = 2;
    while arity <= params.tree_type {
        let mut j = 0;
        while j + 1 < splits.len() {
            let (begin, end) = (splits[j], splits[j + 1]);
            if end - begin < 2 {
                j += 1;
                continue;
            }
            let (axis, split_value) = find_best_split(params, &items[begin..end]);
            let middle = begin + partition_items(&mut items[begin..end], axis, split_value);
            splits.insert(j + 1, middle);
            j += 2;
        }
        arity *= 2;
    }

    let mut children = Vec::with_capacity(splits.len() - 1);
    let mut bbox = Bbox::EMPTY;
    for w in splits.windows(2) {
        let child = build_recursive(params, &mut items[w[0]..w[1]]);
        bbox = bbox.union(&child.bbox());
        children.push(child);
    }

    BuildNode::Inner { bbox, children }
}

/// Classical SAH build over a mutable primitive list
pub fn build_sah<L: Copy>(params: &BvhParams, items: &mut [BuildItem<L>]) -> BuildNode<L> {
    assert!(!items.is_empty());
    build_recursive(params, items)
}

/// Flatten a build tree into the stackless array layout
///
/// `make_leaf` receives the leaf payload and its node-data word (next index
/// with the leaf bit set); inner nodes get their bbox and skip index.
pub fn flatten_tree<L, N, FL, FI>(root: &BuildNode<L>, make_leaf: FL, make_inner: FI) -> Vec<N>
where
    N: Copy + Default,
    FL: Fn(&L, u32) -> N,
    FI: Fn(&Bbox, u32) -> N,
{
    let count = count_nodes(root);
    let mut nodes = vec![N::default(); count];
    let end = fill_array(root, 0, &mut nodes, &make_leaf, &make_inner);
    debug_assert_eq!(end as usize, count);
    nodes
}

fn fill_array<L, N, FL, FI>(
    node: &BuildNode<L>,
    offset: u32,
    out: &mut [N],
    make_leaf: &FL,
    make_inner: &FI,
) -> u32
where
    N: Copy,
    FL: Fn(&L, u32) -> N,
    FI: Fn(&Bbox, u32) -> N,
{
    match node {
        BuildNode::Leaf { item, .. } => {
            out[offset as usize] = make_leaf(item, (offset + 1) | super::LEAF_FLAG);
            offset + 1
        }
        BuildNode::Inner { bbox, children } => {
            let mut next = offset + 1;
            for child in children {
                next = fill_array(child, next, out, make_leaf, make_inner);
            }
            out[offset as usize] = make_inner(bbox, next);
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::node::{is_leaf, skip_index, BvhArrayNode};
    use glam::Vec3;

    fn items(n: usize) -> Vec<BuildItem<u32>> {
        (0..n)
            .map(|i| {
                let p = Vec3::new(i as f32 * 2.0, (i % 3) as f32, (i % 5) as f32);
                BuildItem {
                    bbox: Bbox::new(p, p + Vec3::ONE),
                    item: i as u32,
                }
            })
            .collect()
    }

    fn flatten(root: &BuildNode<u32>) -> Vec<BvhArrayNode> {
        flatten_tree(
            root,
            |&item, node_data| BvhArrayNode::entry_leaf(item, node_data),
            |bbox, skip| BvhArrayNode::inner(bbox, skip),
        )
    }

    /// Every leaf must be reachable and inner bboxes must contain their
    /// subtree (checked per flattened layout invariants).
    fn check_invariants(nodes: &[BvhArrayNode], expected_leaves: usize) {
        let mut seen = vec![false; expected_leaves];
        for (i, node) in nodes.iter().enumerate() {
            if is_leaf(node.node_data) {
                let entry = node.as_entry_leaf() as usize;
                assert!(!seen[entry]);
                seen[entry] = true;
                assert_eq!(skip_index(node.node_data), i as u32 + 1);
            } else {
                let skip = skip_index(node.node_data);
                assert!(skip > i as u32);
                assert!(skip <= nodes.len() as u32);
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    /// Bounding-box monotonicity: an inner node's box contains every node
    /// inside its subtree span.
    fn check_bbox_monotonic(nodes: &[BvhArrayNode], leaf_bbox: &dyn Fn(u32) -> Bbox) {
        for (i, node) in nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            let bbox = node.bbox();
            let skip = skip_index(node.node_data) as usize;
            for child in nodes.iter().take(skip).skip(i + 1) {
                let cb = if child.is_leaf() {
                    leaf_bbox(child.as_entry_leaf())
                } else {
                    child.bbox()
                };
                assert!(bbox.expand(1e-5).contains_bbox(&cb));
            }
        }
    }

    #[test]
    fn test_single_item_is_leaf_root() {
        let mut its = items(1);
        let root = build_sah(&BvhParams::default(), &mut its);
        let nodes = flatten(&root);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_leaf());
        assert_eq!(skip_index(nodes[0].node_data), 1);
    }

    #[test]
    fn test_flatten_invariants_mean_split() {
        let mut its = items(33);
        let boxes: Vec<Bbox> = its.iter().map(|i| i.bbox).collect();
        let root = build_sah(&BvhParams::default(), &mut its);
        let nodes = flatten(&root);
        check_invariants(&nodes, 33);
        check_bbox_monotonic(&nodes, &|i| boxes[i as usize]);
    }

    #[test]
    fn test_flatten_invariants_sampled_sah() {
        let params = BvhParams {
            cost_samples: 8,
            tree_type: 2,
            ..Default::default()
        };
        let mut its = items(57);
        let boxes: Vec<Bbox> = its.iter().map(|i| i.bbox).collect();
        let root = build_sah(&params, &mut its);
        let nodes = flatten(&root);
        check_invariants(&nodes, 57);
        check_bbox_monotonic(&nodes, &|i| boxes[i as usize]);
    }

    #[test]
    fn test_coincident_primitives_terminate() {
        // All primitives identical: the forced split must still terminate
        let p = Vec3::splat(3.0);
        let mut its: Vec<BuildItem<u32>> = (0..16)
            .map(|i| BuildItem {
                bbox: Bbox::new(p, p + Vec3::ONE),
                item: i,
            })
            .collect();
        let root = build_sah(&BvhParams::default(), &mut its);
        let nodes = flatten(&root);
        check_invariants(&nodes, 16);
    }

    #[test]
    fn test_wide_tree_types() {
        for tree_type in [2, 4, 8] {
            let params = BvhParams {
                tree_type,
                ..Default::default()
            };
            let mut its = items(40);
            let root = build_sah(&params, &mut its);
            let nodes = flatten(&root);
            check_invariants(&nodes, 40);
        }
    }
}
