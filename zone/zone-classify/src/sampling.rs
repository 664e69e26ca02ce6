//! Which sample points stand in for a target, per tier.

use hashbrown::HashSet;
use zone_estimate::PresetTier;
use zone_types::{Point3, SamplePoint, Target};

/// Fraction of the way from each box corner toward the center used for
/// corner samples, so they do not sit on zone faces shared with the box.
pub const CORNER_INSET: f64 = 0.05;

/// Jitter keys reserved per target. Samples past this many reuse keys of
/// the next target, which only correlates their ray directions.
pub const KEYS_PER_TARGET: u32 = 64;

/// Sampling density and ray count for a resolved tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    /// Tier the plan was made for.
    pub tier: PresetTier,
    /// Cast a second ray and mark disagreement uncertain.
    pub two_rays: bool,
    /// Include the host-supplied points.
    pub supplied_points: bool,
    /// Include the inset box corners.
    pub corners: bool,
}

impl SamplingPlan {
    /// Plan for a tier. `Auto` gets the `Normal` plan.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_classify::SamplingPlan;
    /// use zone_estimate::PresetTier;
    ///
    /// let fast = SamplingPlan::for_tier(PresetTier::Fast);
    /// assert!(!fast.two_rays);
    /// assert!(SamplingPlan::for_tier(PresetTier::Accurate).corners);
    /// ```
    #[must_use]
    pub const fn for_tier(tier: PresetTier) -> Self {
        match tier {
            PresetTier::Fast => Self {
                tier,
                two_rays: false,
                supplied_points: false,
                corners: false,
            },
            PresetTier::Auto | PresetTier::Normal => Self {
                tier: PresetTier::Normal,
                two_rays: true,
                supplied_points: true,
                corners: false,
            },
            PresetTier::Accurate => Self {
                tier,
                two_rays: true,
                supplied_points: true,
                corners: true,
            },
        }
    }

    /// Sample points for the target at `target_index`.
    ///
    /// The anchor always comes first. Exact duplicates are dropped.
    #[must_use]
    pub fn samples_for(&self, target_index: usize, target: &Target) -> Vec<SamplePoint> {
        let mut seen: HashSet<[u64; 3]> = HashSet::new();
        let mut samples = Vec::with_capacity(1 + target.points.len());
        let mut push = |p: Point3<f64>| {
            if seen.insert([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]) {
                #[allow(clippy::cast_possible_truncation)]
                let slot = samples.len() as u32;
                samples.push(SamplePoint::new(p, jitter_key(target_index, slot)));
            }
        };

        push(target.anchor());
        if self.supplied_points {
            for p in &target.points {
                push(*p);
            }
        }
        if self.corners {
            let center = target.bounds.center();
            for corner in target.bounds.corners() {
                push(corner + (center - corner) * CORNER_INSET);
            }
        }
        samples
    }
}

/// Jitter key for sample `slot` of target `target_index`.
///
/// Keys depend only on the target and slot, so a sample gets the same ray
/// directions whichever zone or batch it is tested in.
#[must_use]
pub const fn jitter_key(target_index: usize, slot: u32) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let base = (target_index as u32).wrapping_mul(KEYS_PER_TARGET);
    base.wrapping_add(slot)
}
