//! Per-target sample tallies and the rule that turns them into assignments.

use std::cmp::Ordering;

use zone_types::{ContainmentFlag, Target, ZoneMesh};

use crate::adapter::TargetAssignment;
use crate::config::AssignmentRule;

/// Outcome counts for one target tested against one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTally {
    /// Zone index.
    pub zone: usize,
    /// Samples inside.
    pub inside: u32,
    /// Samples uncertain.
    pub uncertain: u32,
    /// Samples tested.
    pub total: u32,
    /// Whether the anchor sample (slot 0) was inside.
    pub anchor_inside: bool,
}

impl ZoneTally {
    const fn new(zone: usize) -> Self {
        Self {
            zone,
            inside: 0,
            uncertain: 0,
            total: 0,
            anchor_inside: false,
        }
    }

    /// Whether the target counts as inside this zone under `rule`.
    ///
    /// Uncertain samples never count as inside.
    #[must_use]
    pub const fn qualifies(&self, rule: AssignmentRule) -> bool {
        match rule {
            AssignmentRule::Majority => self.inside * 2 > self.total,
            AssignmentRule::Anchor => self.anchor_inside,
        }
    }
}

/// Tallies for every target of a run.
#[derive(Debug, Clone, Default)]
pub struct Tallies {
    per_target: Vec<Vec<ZoneTally>>,
}

impl Tallies {
    /// Empty tallies for `target_count` targets.
    #[must_use]
    pub fn new(target_count: usize) -> Self {
        Self {
            per_target: vec![Vec::new(); target_count],
        }
    }

    /// Record the flag of sample `slot` of `target` against `zone`.
    ///
    /// Out-of-range targets are ignored.
    pub fn record(&mut self, target: usize, zone: usize, slot: u32, flag: ContainmentFlag) {
        let Some(tallies) = self.per_target.get_mut(target) else {
            return;
        };
        // Samples of one target/zone pair arrive together, so the last
        // tally is almost always the right one.
        let index = match tallies.iter().rposition(|t| t.zone == zone) {
            Some(i) => i,
            None => {
                tallies.push(ZoneTally::new(zone));
                tallies.len() - 1
            }
        };
        let tally = &mut tallies[index];
        tally.total += 1;
        match flag {
            ContainmentFlag::Inside => {
                tally.inside += 1;
                if slot == 0 {
                    tally.anchor_inside = true;
                }
            }
            ContainmentFlag::Uncertain => tally.uncertain += 1,
            ContainmentFlag::Outside => {}
        }
    }

    /// Tallies for one target, one per zone it was tested against.
    #[must_use]
    pub fn for_target(&self, target: usize) -> &[ZoneTally] {
        self.per_target.get(target).map_or(&[], Vec::as_slice)
    }

    /// Number of targets tracked.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.per_target.len()
    }
}

/// Pick a zone for one target.
///
/// Among qualifying zones the one with the most inside samples wins; ties go
/// to the zone with the smaller bounding-box volume, so a room nested in a
/// floor beats the floor, and then to the lower zone index. Returns the
/// winner and the other qualifying zones in index order.
#[must_use]
pub fn choose_zone<'a>(
    tallies: &'a [ZoneTally],
    rule: AssignmentRule,
    zone_volumes: &[f64],
) -> Option<(&'a ZoneTally, Vec<usize>)> {
    let volume = |zone: usize| zone_volumes.get(zone).copied().unwrap_or(f64::INFINITY);
    let winner = tallies
        .iter()
        .filter(|t| t.qualifies(rule))
        .min_by(|a, b| {
            b.inside
                .cmp(&a.inside)
                .then_with(|| {
                    volume(a.zone)
                        .partial_cmp(&volume(b.zone))
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.zone.cmp(&b.zone))
        })?;
    let mut others: Vec<usize> = tallies
        .iter()
        .filter(|t| t.zone != winner.zone && t.qualifies(rule))
        .map(|t| t.zone)
        .collect();
    others.sort_unstable();
    Some((winner, others))
}

/// Resolve every target and return the assignments of those placed in a
/// zone, in target order.
#[must_use]
pub fn resolve_assignments(
    tallies: &Tallies,
    rule: AssignmentRule,
    zones: &[ZoneMesh],
    targets: &[Target],
) -> Vec<TargetAssignment> {
    let volumes: Vec<f64> = zones
        .iter()
        .map(|z| z.bounds().map_or(f64::INFINITY, |b| b.volume()))
        .collect();

    targets
        .iter()
        .enumerate()
        .filter_map(|(index, target)| {
            let (winner, also_inside) = choose_zone(tallies.for_target(index), rule, &volumes)?;
            Some(TargetAssignment {
                target_index: index,
                target_id: target.id.clone(),
                zone: Some(winner.zone),
                zone_id: zones.get(winner.zone).map(|z| z.id.clone()),
                inside_samples: winner.inside,
                uncertain_samples: winner.uncertain,
                total_samples: winner.total,
                also_inside,
            })
        })
        .collect()
}
