//! Preflight: build the candidate index and count candidate pairs without
//! testing any of them.
//!
//! The index built here is handed to the real pass, so the preflight pair
//! count is exactly the number of zone/target pairs that will be tested.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use tracing::info;
use zone_index::{GridSizing, SpatialHashGrid};
use zone_types::{Aabb, Point3};

use crate::error::EstimateResult;

/// Candidate density of a run, measured before classification.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreflightResult {
    /// Zones in the run, including empty ones.
    pub zone_count: usize,
    /// Targets in the run.
    pub target_count: usize,
    /// Sum over zones of targets whose box meets the zone box.
    pub candidate_pairs: u64,
    /// Most candidates any one zone has.
    pub max_candidates_per_zone: usize,
    /// Mean candidates per zone.
    pub avg_candidates_per_zone: f64,
    /// Most zones any one target is a candidate for.
    pub max_candidates_per_target: usize,
    /// Mean zones per target.
    pub avg_candidates_per_target: f64,
    /// Grid cell edge used.
    pub cell_size: f64,
    /// Time spent building the index.
    pub index_build_ms: f64,
    /// Time spent counting candidates.
    pub query_ms: f64,
    /// Hash of every zone and target box plus the cell size.
    pub signature: u64,
}

/// Index and measurement produced by [`measure`].
#[derive(Debug)]
pub struct Preflight {
    /// Grid over the target boxes, reused by the real pass.
    pub grid: SpatialHashGrid,
    /// The measurement.
    pub result: PreflightResult,
}

/// Smallest box enclosing every zone and target box.
#[must_use]
pub fn world_bounds(zone_bounds: &[Option<Aabb>], target_bounds: &[Aabb]) -> Option<Aabb> {
    zone_bounds
        .iter()
        .flatten()
        .chain(target_bounds)
        .copied()
        .reduce(|a, b| a.union(&b))
}

/// Build the index over `target_bounds` and count candidates for every zone.
///
/// `zone_bounds` holds `None` for zones without triangles; they have no
/// candidates.
///
/// # Errors
///
/// Returns [`EstimateError::Index`] if the cell size is invalid or there are
/// more targets than the index can address.
///
/// # Example
///
/// ```
/// use zone_estimate::measure;
/// use zone_index::GridSizing;
/// use zone_types::{Aabb, Point3};
///
/// let zones = [Some(Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(5000.0, 5000.0, 3000.0))), None];
/// let targets: Vec<Aabb> = (0..10)
///     .map(|i| {
///         let x = f64::from(i) * 1000.0;
///         Aabb::new(Point3::new(x, 100.0, 100.0), Point3::new(x + 200.0, 300.0, 300.0))
///     })
///     .collect();
///
/// let preflight = measure(&zones, &targets, &GridSizing::default()).unwrap();
/// assert_eq!(preflight.result.candidate_pairs, 6);
/// assert_eq!(preflight.result.max_candidates_per_target, 1);
/// ```
pub fn measure(
    zone_bounds: &[Option<Aabb>],
    target_bounds: &[Aabb],
    sizing: &GridSizing,
) -> EstimateResult<Preflight> {
    let world = world_bounds(zone_bounds, target_bounds)
        .unwrap_or_else(|| Aabb::from_point(Point3::origin()));
    let cell_size = sizing.cell_size(&world)?;

    let build_start = Instant::now();
    let grid = SpatialHashGrid::build(world, cell_size, target_bounds)?;
    let index_build_ms = build_start.elapsed().as_secs_f64() * 1000.0;

    let query_start = Instant::now();
    let mut stamps = grid.new_stamps();
    let mut per_target = vec![0usize; target_bounds.len()];
    let mut candidate_pairs = 0u64;
    let mut max_per_zone = 0usize;
    for zone in zone_bounds.iter().flatten() {
        let count = grid.visit_candidates(zone, &mut stamps, |t| per_target[t] += 1)?;
        candidate_pairs += count as u64;
        max_per_zone = max_per_zone.max(count);
    }
    let query_ms = query_start.elapsed().as_secs_f64() * 1000.0;

    let result = PreflightResult {
        zone_count: zone_bounds.len(),
        target_count: target_bounds.len(),
        candidate_pairs,
        max_candidates_per_zone: max_per_zone,
        avg_candidates_per_zone: mean(candidate_pairs, zone_bounds.len()),
        max_candidates_per_target: per_target.iter().copied().max().unwrap_or(0),
        avg_candidates_per_target: mean(candidate_pairs, target_bounds.len()),
        cell_size,
        index_build_ms,
        query_ms,
        signature: signature(zone_bounds, target_bounds, cell_size),
    };

    info!(
        zones = result.zone_count,
        targets = result.target_count,
        candidate_pairs,
        max_per_zone,
        max_per_target = result.max_candidates_per_target,
        cell_size,
        occupied_cells = grid.occupied_cells(),
        index_build_ms,
        query_ms,
        "Preflight measured"
    );
    Ok(Preflight { grid, result })
}

#[allow(clippy::cast_precision_loss)]
fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn hash_box(b: &Aabb, hasher: &mut DefaultHasher) {
    for v in [b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z] {
        v.to_bits().hash(hasher);
    }
}

fn signature(zone_bounds: &[Option<Aabb>], target_bounds: &[Aabb], cell_size: f64) -> u64 {
    let mut hasher = DefaultHasher::new();
    zone_bounds.len().hash(&mut hasher);
    for zone in zone_bounds {
        match zone {
            Some(b) => hash_box(b, &mut hasher),
            None => u8::MAX.hash(&mut hasher),
        }
    }
    target_bounds.len().hash(&mut hasher);
    for b in target_bounds {
        hash_box(b, &mut hasher);
    }
    cell_size.to_bits().hash(&mut hasher);
    hasher.finish()
}
