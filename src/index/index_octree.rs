//! Insertion-friendly octree over point-set entries
//!
//! Used while a cache is still collecting entries: inserts push an entry
//! down to every child octant its radius-inflated box overlaps, stopping at
//! nodes smaller than the entry or at the depth cap. Queries prune by
//! point-in-bbox so an entry larger than a leaf cell is still found from
//! any point it covers.

use glam::Vec3;

use crate::geometry::Bbox;

use super::SpatialEntry;

/// Maximum allowed subdivision depth
const MAX_DEPTH_LIMIT: u32 = 24;

#[derive(Debug, Default)]
struct OctreeNode {
    children: [Option<Box<OctreeNode>>; 8],
    entry_indices: Vec<u32>,
}

/// Octree owning its entries
#[derive(Debug)]
pub struct IndexOctree<T> {
    entries: Vec<T>,
    world_bbox: Bbox,
    max_depth: u32,
    entry_radius: f32,
    entry_radius2: f32,
    normal_cos_angle: f32,
    root: OctreeNode,
}

impl<T: SpatialEntry> IndexOctree<T> {
    pub fn new(world_bbox: Bbox, entry_radius: f32, normal_angle_deg: f32) -> Self {
        Self::with_max_depth(world_bbox, entry_radius, normal_angle_deg, MAX_DEPTH_LIMIT)
    }

    pub fn with_max_depth(
        world_bbox: Bbox,
        entry_radius: f32,
        normal_angle_deg: f32,
        max_depth: u32,
    ) -> Self {
        Self {
            entries: Vec::new(),
            world_bbox: world_bbox.expand_by_epsilon(),
            max_depth: max_depth.clamp(1, MAX_DEPTH_LIMIT),
            entry_radius,
            entry_radius2: entry_radius * entry_radius,
            normal_cos_angle: normal_angle_deg.to_radians().cos(),
            root: OctreeNode::default(),
        }
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry_radius(&self) -> f32 {
        self.entry_radius
    }

    pub fn normal_cos_angle(&self) -> f32 {
        self.normal_cos_angle
    }

    pub fn entry_mut(&mut self, index: u32) -> &mut T {
        &mut self.entries[index as usize]
    }

    /// Consume the octree, handing back the entry vector
    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }

    pub fn entry(&self, index: u32) -> &T {
        &self.entries[index as usize]
    }

    /// Insert an entry, returning its index
    pub fn add(&mut self, entry: T) -> u32 {
        let index = self.entries.len() as u32;
        let p = entry.position();
        self.entries.push(entry);

        let r = Vec3::splat(self.entry_radius);
        let entry_bbox = Bbox::new(p - r, p + r);
        let diagonal2 = entry_bbox.diagonal().length_squared();
        let world = self.world_bbox;
        let max_depth = self.max_depth;
        Self::add_impl(&mut self.root, &world, index, &entry_bbox, diagonal2, 0, max_depth);
        index
    }

    fn add_impl(
        node: &mut OctreeNode,
        node_bbox: &Bbox,
        entry_index: u32,
        entry_bbox: &Bbox,
        entry_diagonal2: f32,
        depth: u32,
        max_depth: u32,
    ) {
        // Store here once the node is no larger than the entry
        if depth == max_depth || node_bbox.diagonal().length_squared() < entry_diagonal2 {
            node.entry_indices.push(entry_index);
            return;
        }

        let mid = node_bbox.center();
        let x = [entry_bbox.min.x <= mid.x, entry_bbox.max.x > mid.x];
        let y = [entry_bbox.min.y <= mid.y, entry_bbox.max.y > mid.y];
        let z = [entry_bbox.min.z <= mid.z, entry_bbox.max.z > mid.z];

        for child in 0..8u32 {
            let overlap = x[(child >> 2 & 1) as usize]
                && y[(child >> 1 & 1) as usize]
                && z[(child & 1) as usize];
            if !overlap {
                continue;
            }
            let child_node = node.children[child as usize]
                .get_or_insert_with(|| Box::new(OctreeNode::default()));
            let child_bbox = node_bbox.child_octant(child, mid);
            Self::add_impl(
                child_node,
                &child_bbox,
                entry_index,
                entry_bbox,
                entry_diagonal2,
                depth + 1,
                max_depth,
            );
        }
    }

    /// Closest accepted entry to `p` within the entry radius
    pub fn nearest_entry(&self, p: Vec3, accept: impl Fn(&T) -> bool) -> Option<u32> {
        let mut nearest = None;
        let mut nearest_d2 = self.entry_radius2;
        self.nearest_impl(&self.root, &self.world_bbox, p, &accept, &mut nearest, &mut nearest_d2);
        nearest
    }

    fn nearest_impl(
        &self,
        node: &OctreeNode,
        node_bbox: &Bbox,
        p: Vec3,
        accept: &impl Fn(&T) -> bool,
        nearest: &mut Option<u32>,
        nearest_d2: &mut f32,
    ) {
        if !node_bbox.contains_point(p) {
            return;
        }

        for &entry_index in &node.entry_indices {
            let entry = &self.entries[entry_index as usize];
            let d2 = p.distance_squared(entry.position());
            if d2 < *nearest_d2 && accept(entry) {
                *nearest = Some(entry_index);
                *nearest_d2 = d2;
            }
        }

        let mid = node_bbox.center();
        for child in 0..8u32 {
            if let Some(child_node) = &node.children[child as usize] {
                let child_bbox = node_bbox.child_octant(child, mid);
                self.nearest_impl(child_node, &child_bbox, p, accept, nearest, nearest_d2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Point(Vec3);

    impl SpatialEntry for Point {
        fn position(&self) -> Vec3 {
            self.0
        }
    }

    fn world() -> Bbox {
        Bbox::new(Vec3::splat(-10.0), Vec3::splat(10.0))
    }

    #[test]
    fn test_insert_and_find() {
        let mut octree = IndexOctree::new(world(), 0.5, 25.0);
        let a = octree.add(Point(Vec3::new(1.0, 1.0, 1.0)));
        let b = octree.add(Point(Vec3::new(-3.0, 0.0, 2.0)));

        assert_eq!(
            octree.nearest_entry(Vec3::new(1.1, 1.0, 1.0), |_| true),
            Some(a)
        );
        assert_eq!(
            octree.nearest_entry(Vec3::new(-3.0, 0.3, 2.0), |_| true),
            Some(b)
        );
        assert_eq!(octree.nearest_entry(Vec3::new(8.0, 8.0, 8.0), |_| true), None);
    }

    #[test]
    fn test_nearest_picks_closest() {
        let mut octree = IndexOctree::new(world(), 2.0, 25.0);
        let _far = octree.add(Point(Vec3::new(1.5, 0.0, 0.0)));
        let near = octree.add(Point(Vec3::new(0.4, 0.0, 0.0)));
        assert_eq!(octree.nearest_entry(Vec3::ZERO, |_| true), Some(near));
    }

    #[test]
    fn test_entry_straddling_split_found_from_both_sides() {
        // Entry sits exactly on the root split plane; it must be reachable
        // from query points in both halves
        let mut octree = IndexOctree::new(world(), 1.0, 25.0);
        let e = octree.add(Point(Vec3::new(0.0, 1.0, 1.0)));
        assert_eq!(octree.nearest_entry(Vec3::new(0.4, 1.0, 1.0), |_| true), Some(e));
        assert_eq!(octree.nearest_entry(Vec3::new(-0.4, 1.0, 1.0), |_| true), Some(e));
    }

    #[test]
    fn test_depth_cap() {
        // A tiny radius forces deep subdivision; the cap must keep inserts
        // terminating
        let mut octree = IndexOctree::with_max_depth(world(), 1e-6, 25.0, 8);
        for i in 0..32 {
            octree.add(Point(Vec3::splat(i as f32 * 1e-7)));
        }
        assert_eq!(octree.entry_count(), 32);
        assert!(octree
            .nearest_entry(Vec3::splat(0.0), |_| true)
            .is_some());
    }

    #[test]
    fn test_predicate_rejection() {
        let mut octree = IndexOctree::new(world(), 1.0, 25.0);
        octree.add(Point(Vec3::ZERO));
        assert_eq!(octree.nearest_entry(Vec3::ZERO, |_| false), None);
    }

    #[test]
    fn test_merge_through_entry_mut() {
        let mut octree = IndexOctree::new(world(), 1.0, 25.0);
        let idx = octree.add(Point(Vec3::ONE));
        octree.entry_mut(idx).0 = Vec3::new(1.0, 1.0, 1.5);
        assert_eq!(octree.entry(idx).0, Vec3::new(1.0, 1.0, 1.5));
    }
}
