//! Immutable BVH over point-set entries
//!
//! Entries are treated as point-spheres of the configured radius and built
//! with the morton backend. Queries run the same stackless skip-index loop
//! as the triangle BVH; the caller supplies the acceptance predicate.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bvh::{build_morton, flatten_tree, BuildItem, BvhArrayNode};
use crate::geometry::Bbox;

use super::SpatialEntry;

/// Array node of the point-set BVH (same layout as the triangle BVH, with
/// entry-index leaves)
pub type IndexBvhArrayNode = BvhArrayNode;

mod node_bytes {
    use super::IndexBvhArrayNode;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        nodes: &Vec<IndexBvhArrayNode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let bytes: &[u8] = bytemuck::cast_slice(nodes);
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<IndexBvhArrayNode>, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        if bytes.len() % std::mem::size_of::<IndexBvhArrayNode>() != 0 {
            return Err(D::Error::custom("malformed BVH node array"));
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

/// Immutable point-set BVH owning its entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBvh<T> {
    entries: Vec<T>,
    entry_radius: f32,
    entry_radius2: f32,
    #[serde(with = "node_bytes")]
    nodes: Vec<IndexBvhArrayNode>,
}

impl<T: SpatialEntry> IndexBvh<T> {
    /// Build over `entries` as point-spheres of `entry_radius`
    pub fn new(entries: Vec<T>, entry_radius: f32) -> Self {
        assert!(!entries.is_empty());
        let items: Vec<BuildItem<u32>> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let p = e.position();
                BuildItem {
                    bbox: Bbox::from_point(p).expand(entry_radius),
                    item: i as u32,
                }
            })
            .collect();
        let root = build_morton(&items);
        let nodes = flatten_tree(
            &root,
            |&entry, node_data| IndexBvhArrayNode::entry_leaf(entry, node_data),
            |bbox, skip| IndexBvhArrayNode::inner(bbox, skip),
        );
        Self {
            entries,
            entry_radius,
            entry_radius2: entry_radius * entry_radius,
            nodes,
        }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn entry_radius(&self) -> f32 {
        self.entry_radius
    }

    pub fn entry_radius2(&self) -> f32 {
        self.entry_radius2
    }

    pub fn memory_usage(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<IndexBvhArrayNode>()
    }

    pub fn nodes(&self) -> &[IndexBvhArrayNode] {
        &self.nodes
    }

    /// Closest accepted entry within the configured radius
    pub fn nearest_entry(&self, p: Vec3, accept: impl Fn(&T) -> bool) -> Option<&T> {
        let mut nearest = None;
        let mut nearest_d2 = self.entry_radius2;

        let mut current = 0u32;
        let stop = self.nodes[0].skip_index();
        while current < stop {
            let node = &self.nodes[current as usize];
            if node.is_leaf() {
                let entry = &self.entries[node.as_entry_leaf() as usize];
                let d2 = p.distance_squared(entry.position());
                if d2 < nearest_d2 && accept(entry) {
                    nearest = Some(entry);
                    nearest_d2 = d2;
                }
                current += 1;
            } else if node.contains_point(p) {
                current += 1;
            } else {
                current = node.skip_index();
            }
        }
        nearest
    }

    /// Visit every entry within the configured radius of `p`, in traversal
    /// order; the caller's accumulator must be commutative.
    pub fn for_each_near_entry(&self, p: Vec3, mut visit: impl FnMut(&T, f32)) {
        let mut current = 0u32;
        let stop = self.nodes[0].skip_index();
        while current < stop {
            let node = &self.nodes[current as usize];
            if node.is_leaf() {
                let entry = &self.entries[node.as_entry_leaf() as usize];
                let d2 = p.distance_squared(entry.position());
                if d2 < self.entry_radius2 {
                    visit(entry, d2);
                }
                current += 1;
            } else if node.contains_point(p) {
                current += 1;
            } else {
                current = node.skip_index();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    struct Point(Vec3);

    impl SpatialEntry for Point {
        fn position(&self) -> Vec3 {
            self.0
        }
    }

    fn grid_entries() -> Vec<Point> {
        let mut out = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    out.push(Point(Vec3::new(x as f32, y as f32, z as f32)));
                }
            }
        }
        out
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let entries = grid_entries();
        let bvh = IndexBvh::new(entries.clone(), 0.75);

        for i in 0..50 {
            let q = Vec3::new(
                (i % 7) as f32 * 0.66,
                (i % 11) as f32 * 0.4,
                (i % 5) as f32 * 0.9,
            );
            let found = bvh.nearest_entry(q, |_| true).map(|e| e.0);
            let brute = entries
                .iter()
                .map(|e| (e.0, q.distance_squared(e.0)))
                .filter(|&(_, d2)| d2 < 0.75 * 0.75)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|(p, _)| p);
            assert_eq!(found, brute, "query point {:?}", q);
        }
    }

    #[test]
    fn test_predicate_filters() {
        let entries = grid_entries();
        let bvh = IndexBvh::new(entries, 0.75);
        // Reject everything: no entry can be returned
        assert!(bvh.nearest_entry(Vec3::splat(2.0), |_| false).is_none());
    }

    #[test]
    fn test_for_each_near_finds_all() {
        let entries = grid_entries();
        let bvh = IndexBvh::new(entries.clone(), 1.1);
        let q = Vec3::new(2.0, 2.0, 2.0);
        let mut found = Vec::new();
        bvh.for_each_near_entry(q, |e, _| found.push(e.0));
        // The center point plus its 6 axis neighbors at distance 1 < 1.1
        assert_eq!(found.len(), 7);
    }

    #[test]
    fn test_single_entry() {
        let bvh = IndexBvh::new(vec![Point(Vec3::ZERO)], 1.0);
        assert!(bvh.nearest_entry(Vec3::splat(0.1), |_| true).is_some());
        assert!(bvh.nearest_entry(Vec3::splat(5.0), |_| true).is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let bvh = IndexBvh::new(grid_entries(), 0.6);
        let bytes = bincode::serialize(&bvh).unwrap();
        let back: IndexBvh<Point> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.entries().len(), bvh.entries().len());
        assert_eq!(back.nodes(), bvh.nodes());
        assert_eq!(back.entry_radius(), bvh.entry_radius());
    }
}
