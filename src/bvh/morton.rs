//! Morton-code (LBVH) builder
//!
//! The fast, lower-quality backend: primitive centroids are quantized to a
//! 21-bit grid over the scene bounds, sorted by their interleaved morton
//! code and split top-down at the highest differing bit. Leaves hold a
//! single primitive.

use glam::Vec3;

use crate::geometry::Bbox;

use super::build::{BuildItem, BuildNode};

/// Spreads the bits of a 21-bit integer to every 3rd bit
#[inline(always)]
fn spread_bits(v: u32) -> u64 {
    let mut result = 0u64;
    for i in 0..21 {
        if (v >> i) & 1 != 0 {
            result |= 1u64 << (i * 3);
        }
    }
    result
}

/// Encode 3D grid coordinates into a morton code (Z-order)
///
/// Supports up to 21 bits per coordinate.
#[inline(always)]
pub fn morton_encode(x: u32, y: u32, z: u32) -> u64 {
    debug_assert!(x < (1 << 21));
    debug_assert!(y < (1 << 21));
    debug_assert!(z < (1 << 21));
    spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
}

const GRID_RESOLUTION: f32 = (1u32 << 21) as f32;

fn quantize(p: Vec3, world: &Bbox) -> (u32, u32, u32) {
    let extent = world.diagonal().max(Vec3::splat(f32::MIN_POSITIVE));
    let t = ((p - world.min) / extent).clamp(Vec3::ZERO, Vec3::ONE);
    let q = (t * (GRID_RESOLUTION - 1.0)).floor();
    (q.x as u32, q.y as u32, q.z as u32)
}

struct MortonItem<L> {
    code: u64,
    bbox: Bbox,
    item: L,
}

fn build_range<L: Copy>(items: &[MortonItem<L>], bit: i32) -> BuildNode<L> {
    if items.len() == 1 {
        return BuildNode::Leaf {
            bbox: items[0].bbox,
            item: items[0].item,
        };
    }

    // Find the first position where the current bit flips; identical code
    // prefixes fall back to a middle split.
    let mut split = items.len() / 2;
    let mut split_bit = bit;
    'search: while split_bit >= 0 {
        let mask = 1u64 << split_bit;
        if items[0].code & mask != items[items.len() - 1].code & mask {
            split = items.partition_point(|it| it.code & mask == 0);
            if split > 0 && split < items.len() {
                break 'search;
            }
        }
        split_bit -= 1;
    }

    let left = build_range(&items[..split], split_bit - 1);
    let right = build_range(&items[split..], split_bit - 1);
    let bbox = left.bbox().union(&right.bbox());
    BuildNode::Inner {
        bbox,
        children: vec![left, right],
    }
}

/// Build a binary tree over the items in morton order
pub fn build_morton<L: Copy>(items: &[BuildItem<L>]) -> BuildNode<L> {
    assert!(!items.is_empty());

    let mut world = Bbox::EMPTY;
    for it in items {
        world = world.union_point(it.bbox.center());
    }

    let mut morton_items: Vec<MortonItem<L>> = items
        .iter()
        .map(|it| {
            let (x, y, z) = quantize(it.bbox.center(), &world);
            MortonItem {
                code: morton_encode(x, y, z),
                bbox: it.bbox,
                item: it.item,
            }
        })
        .collect();
    morton_items.sort_by_key(|it| it.code);

    build_range(&morton_items, 62)
}
