//! Tests for signal block bookkeeping and exclusive occupancy.
//!
//! These tests verify:
//! - Blocks always equal the connected components of their color
//! - Same-color blocks never touch after any add/remove sequence
//! - Occupancy never grants one segment to two vehicles in a horizon

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};

use railyard::{BlockColor, OccupancyHorizons, Position, SegmentKey, SignalBlocks};

// ============================================================================
// Helpers
// ============================================================================

const COLORS: [BlockColor; 3] = [BlockColor::Red, BlockColor::Yellow, BlockColor::Blue];

fn p(x: i64) -> Position {
    Position::new(x, 0, 0)
}

fn key(a: i64, b: i64) -> SegmentKey {
    SegmentKey::new(p(a), p(b))
}

fn random_key(rng: &mut StdRng, points: i64) -> SegmentKey {
    let a = rng.gen_range(0..points);
    let mut b = rng.gen_range(0..points);
    if a == b {
        b = (a + 1) % points;
    }
    key(a * 10, b * 10)
}

/// Groups segments into components connected through shared endpoints.
fn components(segments: &BTreeSet<SegmentKey>) -> BTreeSet<BTreeSet<SegmentKey>> {
    let segments: Vec<SegmentKey> = segments.iter().copied().collect();
    let mut parent: Vec<usize> = (0..segments.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..segments.len() {
        for j in i + 1..segments.len() {
            if segments[i].shares_endpoint(&segments[j]) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                parent[a] = b;
            }
        }
    }

    let mut groups: HashMap<usize, BTreeSet<SegmentKey>> = HashMap::new();
    for (i, segment) in segments.iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().insert(*segment);
    }
    groups.into_values().collect()
}

fn assert_matches_model(blocks: &SignalBlocks, model: &HashMap<BlockColor, BTreeSet<SegmentKey>>) {
    blocks.check_invariant().unwrap();

    for color in COLORS {
        let actual: BTreeSet<BTreeSet<SegmentKey>> = blocks
            .blocks()
            .iter()
            .filter(|block| block.color == color)
            .map(|block| block.segments().clone())
            .collect();
        let expected = model.get(&color).map(components).unwrap_or_default();
        assert_eq!(actual, expected, "blocks of {:?} differ from components", color);
    }
}

// ============================================================================
// Block Structure Tests
// ============================================================================

#[test]
fn test_random_add_remove_keeps_components() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut blocks = SignalBlocks::new();
    let mut model: HashMap<BlockColor, BTreeSet<SegmentKey>> = HashMap::new();

    for _ in 0..500 {
        let color = COLORS[rng.gen_range(0..COLORS.len())];
        let segment = random_key(&mut rng, 12);

        if rng.gen_bool(0.6) {
            let id = blocks.add(color, segment);
            model.entry(color).or_default().insert(segment);
            assert!(blocks.get(id).unwrap().segments().contains(&segment));
        } else {
            let removed = blocks.remove(color, segment);
            let expected = model.entry(color).or_default().remove(&segment);
            assert_eq!(removed, expected);
        }

        assert_matches_model(&blocks, &model);
    }
}

#[test]
fn test_bridge_removal_splits_block() {
    let mut blocks = SignalBlocks::new();
    blocks.add(BlockColor::Red, key(0, 10));
    blocks.add(BlockColor::Red, key(20, 30));
    assert_eq!(blocks.len(), 2);

    let bridge = blocks.add(BlockColor::Red, key(10, 20));
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks.get(bridge).unwrap().segments().len(), 3);

    assert!(blocks.remove(BlockColor::Red, key(10, 20)));
    assert_eq!(blocks.len(), 2);
    assert!(!blocks.covers(&key(10, 20)));
    assert!(blocks.check_invariant().is_ok());
}

#[test]
fn test_colors_overlap_without_merging() {
    let mut blocks = SignalBlocks::new();
    blocks.add(BlockColor::Red, key(0, 10));
    blocks.add(BlockColor::Blue, key(0, 10));
    blocks.add(BlockColor::Blue, key(10, 20));

    assert_eq!(blocks.len(), 2);
    let at = blocks.blocks_at(&key(0, 10));
    assert_eq!(at.len(), 2);
    assert_eq!(at[0].color, BlockColor::Blue);
    assert_eq!(at[1].color, BlockColor::Red);
    assert!(!blocks.remove(BlockColor::Yellow, key(0, 10)));
}

// ============================================================================
// Occupancy Tests
// ============================================================================

#[test]
fn test_block_is_exclusive_across_vehicles() {
    let mut blocks = SignalBlocks::new();
    blocks.add(BlockColor::Red, key(0, 10));
    blocks.add(BlockColor::Red, key(10, 20));
    let mut horizons = OccupancyHorizons::new(2);

    assert!(blocks.occupy(key(0, 10), horizons.maps_mut(), 1));
    assert_eq!(horizons.holder(&key(10, 20), 1), Some(1));
    assert!(!blocks.occupy(key(10, 20), horizons.maps_mut(), 2));

    // Still held from the previous tick after one rotation
    horizons.rotate();
    assert!(!blocks.occupy(key(10, 20), horizons.maps_mut(), 2));

    // Free once the claim ages out
    horizons.rotate();
    assert!(blocks.occupy(key(10, 20), horizons.maps_mut(), 2));
    assert_eq!(horizons.holder(&key(0, 10), 1), Some(2));
}

#[test]
fn test_random_occupancy_never_shares_a_segment() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut blocks = SignalBlocks::new();
    for _ in 0..20 {
        let color = COLORS[rng.gen_range(0..COLORS.len())];
        blocks.add(color, random_key(&mut rng, 10));
    }
    let mut horizons = OccupancyHorizons::new(3);

    for tick in 0..300 {
        if tick % 4 == 0 {
            horizons.rotate();
            blocks.reset_occupied();
        }
        if tick % 25 == 0 {
            let color = COLORS[rng.gen_range(0..COLORS.len())];
            let segment = random_key(&mut rng, 10);
            if rng.gen_bool(0.5) {
                blocks.add(color, segment);
            } else {
                blocks.remove(color, segment);
            }
        }

        let vehicle = rng.gen_range(1..5);
        let segment = random_key(&mut rng, 10);
        if blocks.occupy(segment, horizons.maps_mut(), vehicle) {
            assert_eq!(horizons.holder(&segment, 1), Some(vehicle));
            assert!(blocks.is_occupied(&segment) || !blocks.covers(&segment));
        }

        for map in horizons.maps() {
            for segment in map.segments() {
                let holders: BTreeSet<_> = map.spans(segment).iter().map(|span| span.vehicle).collect();
                assert_eq!(holders.len(), 1, "segment {} held by {:?}", segment, holders);
            }
        }
        blocks.check_invariant().unwrap();
    }
}

#[test]
fn test_occupy_needs_two_horizons() {
    let mut blocks = SignalBlocks::new();
    blocks.add(BlockColor::Red, key(0, 10));
    let mut maps = vec![railyard::OccupancyMap::new()];
    assert!(!blocks.occupy(key(0, 10), &mut maps, 1));
    assert!(maps[0].is_empty());
}
