//! Property-based tests for the spatial hash grid.
//!
//! Every grid answer is compared against a brute-force scan of all targets.
//!
//! Run with: cargo test -p zone-index -- proptest

use std::collections::HashSet;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zone_index::{Granularity, GridSizing, SpatialHashGrid};
use zone_types::{Aabb, Point3};

// =============================================================================
// Strategies
// =============================================================================

fn arb_aabb(range: f64, max_size: f64) -> impl Strategy<Value = Aabb> {
    (
        prop::array::uniform3(-range..range),
        prop::array::uniform3(0.0..max_size),
    )
        .prop_map(|([x, y, z], [dx, dy, dz])| {
            Aabb::new(Point3::new(x, y, z), Point3::new(x + dx, y + dy, z + dz))
        })
}

fn brute_force(targets: &[Aabb], query: &Aabb) -> Vec<usize> {
    targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.intersects(query))
        .map(|(i, _)| i)
        .collect()
}

fn world_of(targets: &[Aabb]) -> Aabb {
    targets
        .iter()
        .skip(1)
        .fold(targets[0], |acc, b| acc.union(b))
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_count_matches_brute_force(
        targets in prop::collection::vec(arb_aabb(500.0, 80.0), 1..200),
        queries in prop::collection::vec(arb_aabb(600.0, 300.0), 1..20),
        cell in 20.0..400.0f64,
    ) {
        let grid = SpatialHashGrid::build(world_of(&targets), cell, &targets).unwrap();
        let mut stamps = grid.new_stamps();
        for query in &queries {
            let expected = brute_force(&targets, query).len();
            prop_assert_eq!(grid.count_candidates(query, &mut stamps).unwrap(), expected);
        }
    }

    #[test]
    fn proptest_world_smaller_than_targets(
        targets in prop::collection::vec(arb_aabb(500.0, 80.0), 1..100),
        query in arb_aabb(600.0, 300.0),
    ) {
        // A world box covering only the middle forces clamping into edge cells.
        let world = Aabb::new(Point3::new(-50.0, -50.0, -50.0), Point3::new(50.0, 50.0, 50.0));
        let grid = SpatialHashGrid::build(world, 20.0, &targets).unwrap();
        let mut stamps = grid.new_stamps();
        let expected = brute_force(&targets, &query).len();
        prop_assert_eq!(grid.count_candidates(&query, &mut stamps).unwrap(), expected);
    }

    #[test]
    fn proptest_point_queries_match_brute_force(
        targets in prop::collection::vec(arb_aabb(200.0, 60.0), 1..150),
        points in prop::collection::vec(prop::array::uniform3(-260.0..260.0f64), 1..30),
        granularity in 1..=4i32,
    ) {
        let world = world_of(&targets);
        let cell = GridSizing::new(Granularity::from_level(granularity))
            .with_override(25.0 * f64::from(granularity))
            .cell_size(&world)
            .unwrap();
        let grid = SpatialHashGrid::build(world, cell, &targets).unwrap();
        for [x, y, z] in points {
            let p = Point3::new(x, y, z);
            let expected = targets.iter().filter(|t| t.contains(&p)).count();
            prop_assert_eq!(grid.count_point_candidates(&p), expected);
        }
    }
}

// =============================================================================
// Large randomized sets
// =============================================================================

fn random_targets(rng: &mut StdRng, count: usize) -> Vec<Aabb> {
    (0..count)
        .map(|_| {
            let x = rng.gen_range(0.0..200_000.0);
            let y = rng.gen_range(0.0..120_000.0);
            let z = rng.gen_range(0.0..30_000.0);
            let dx = rng.gen_range(50.0..4_000.0);
            let dy = rng.gen_range(50.0..4_000.0);
            let dz = rng.gen_range(50.0..2_000.0);
            Aabb::new(Point3::new(x, y, z), Point3::new(x + dx, y + dy, z + dz))
        })
        .collect()
}

#[test]
fn large_target_set_counts_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0001);
    let targets = random_targets(&mut rng, 12_000);
    let world = world_of(&targets);

    for granularity in 1..=4 {
        let cell = GridSizing::new(Granularity::from_level(granularity))
            .cell_size(&world)
            .unwrap();
        let grid = SpatialHashGrid::build(world, cell, &targets).unwrap();
        let mut stamps = grid.new_stamps();

        for _ in 0..60 {
            let x = rng.gen_range(-5_000.0..200_000.0);
            let y = rng.gen_range(-5_000.0..120_000.0);
            let z = rng.gen_range(-1_000.0..30_000.0);
            let w = rng.gen_range(100.0..25_000.0);
            let query = Aabb::new(Point3::new(x, y, z), Point3::new(x + w, y + w, z + w * 0.3));

            let expected = brute_force(&targets, &query).len();
            let counted = grid.count_candidates(&query, &mut stamps).unwrap();
            assert_eq!(counted, expected, "granularity {granularity}, query {query:?}");
        }
    }
}

#[test]
fn large_target_set_visits_each_candidate_once() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0002);
    let targets = random_targets(&mut rng, 10_000);
    let world = world_of(&targets);
    let grid = SpatialHashGrid::build(world, 1_000.0, &targets).unwrap();
    let mut stamps = grid.new_stamps();

    for _ in 0..40 {
        let x = rng.gen_range(0.0..180_000.0);
        let y = rng.gen_range(0.0..100_000.0);
        let query = Aabb::new(
            Point3::new(x, y, 0.0),
            Point3::new(x + 20_000.0, y + 20_000.0, 30_000.0),
        );

        let mut visited = Vec::new();
        let reported = grid
            .visit_candidates(&query, &mut stamps, |i| visited.push(i))
            .unwrap();
        assert_eq!(reported, visited.len());

        let unique: HashSet<usize> = visited.iter().copied().collect();
        assert_eq!(unique.len(), visited.len(), "a candidate was visited twice");

        let expected: HashSet<usize> = brute_force(&targets, &query).into_iter().collect();
        assert_eq!(unique, expected);
    }
}
