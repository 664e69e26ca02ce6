//! End-to-end classification runs on the host backend.
//!
//! ```bash
//! cargo test -p zone-classify --test end_to_end
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zone_classify::{
    AssignmentRule, AssignmentSink, BackendPreference, ClassificationSession, ClassifyConfig,
    ClassifyError, GeometrySource, MemorySink, MemorySource, RunOutcome, RunProgress, RunStage,
    TargetAssignment,
};
use zone_estimate::{CalibrationStore, PresetTier};
use zone_kernel::{
    BackendProbe, CancellationToken, ComputeBackend, CpuBackend, CpuProbe, KernelResult,
    ZoneGeometry,
};
use zone_types::{Aabb, ContainmentFlag, Point3, SamplePoint, Target, ZoneMesh};

fn aabb(min: [f64; 3], max: [f64; 3]) -> Aabb {
    Aabb::new(
        Point3::new(min[0], min[1], min[2]),
        Point3::new(max[0], max[1], max[2]),
    )
}

fn cpu_config() -> ClassifyConfig {
    ClassifyConfig::default().with_backend(BackendPreference::CpuOnly)
}

fn run(
    config: ClassifyConfig,
    calibration: &mut CalibrationStore,
    source: &dyn GeometrySource,
    sink: &mut dyn AssignmentSink,
) -> Result<RunOutcome, ClassifyError> {
    ClassificationSession::new(config, calibration).run(source, sink)
}

fn unit_cube_source() -> MemorySource {
    MemorySource::new(
        vec![ZoneMesh::from_box("cube", &aabb([0.0; 3], [1.0; 3]))],
        vec![
            Target::from_point("inside", Point3::new(0.37, 0.52, 0.61)),
            Target::from_point("outside", Point3::new(3.0, 3.0, 3.0)),
            Target::from_point("surface", Point3::new(0.3, 0.6, 1.0)),
        ],
    )
}

// =============================================================================
// Unit cube
// =============================================================================

#[test]
fn unit_cube_inside_outside_surface() {
    for tier in [PresetTier::Normal, PresetTier::Accurate, PresetTier::Auto] {
        let mut calibration = CalibrationStore::new();
        let mut sink = MemorySink::new();
        let outcome = run(
            cpu_config().with_preset(tier),
            &mut calibration,
            &unit_cube_source(),
            &mut sink,
        )
        .unwrap();

        let report = outcome.report().unwrap();
        assert!(report.preset.tier.is_concrete());
        assert_eq!(sink.find("inside").unwrap().zone, Some(0));
        assert!(sink.find("outside").is_none(), "{tier}");
        assert!(sink.find("surface").is_none(), "surface point assigned under {tier}");
        assert!(report.uncertain_samples >= 1);
        assert_eq!(report.assigned_targets, 1);
        assert_eq!(report.unassigned_targets, 2);
    }
}

#[test]
fn surface_point_is_never_inside_in_dual_ray_mode() {
    let cube = ZoneMesh::from_box("cube", &aabb([0.0; 3], [1.0; 3]));
    let mut backend = CpuBackend::new();
    let cancel = CancellationToken::new();
    for key in 0..200 {
        let point = SamplePoint::from_coords(0.3, 0.6, 1.0, key);
        let flags = backend.test_points(&cube.triangles, &[point], true, &cancel).unwrap();
        assert_ne!(flags[0], ContainmentFlag::Inside, "key {key}");
    }
}

// =============================================================================
// Presets
// =============================================================================

#[test]
fn fast_tier_tests_only_the_anchor() {
    let zone = ZoneMesh::from_box("room", &aabb([0.0; 3], [10.0; 3]));
    let target = Target::from_bounds("pipe", aabb([1.0; 3], [2.0; 3])).with_points(vec![
        Point3::new(1.1, 1.2, 1.3),
        Point3::new(1.7, 1.4, 1.9),
        Point3::new(1.5, 1.6, 1.2),
    ]);
    let source = MemorySource::new(vec![zone], vec![target]);

    let mut calibration = CalibrationStore::new();
    let mut sink = MemorySink::new();
    let fast = run(
        cpu_config().with_preset(PresetTier::Fast),
        &mut calibration,
        &source,
        &mut sink,
    )
    .unwrap();
    let fast = fast.report().unwrap();
    assert_eq!(fast.preset.tier, PresetTier::Fast);
    assert!(fast.preset.reason.contains("user"));
    assert_eq!(fast.samples_tested, 1);

    let normal = run(
        cpu_config().with_preset(PresetTier::Normal),
        &mut calibration,
        &source,
        &mut MemorySink::new(),
    )
    .unwrap();
    assert_eq!(normal.report().unwrap().samples_tested, 3);

    let accurate = run(
        cpu_config().with_preset(PresetTier::Accurate),
        &mut calibration,
        &source,
        &mut MemorySink::new(),
    )
    .unwrap();
    let accurate = accurate.report().unwrap();
    assert_eq!(accurate.samples_tested, 11);
    assert_eq!(sink.find("pipe").unwrap().zone_id.as_deref(), Some("room"));

    // Each tier calibrates under its own key.
    assert_eq!(calibration.len(), 3);
}

#[test]
fn auto_picks_accurate_for_small_runs() {
    let mut calibration = CalibrationStore::new();
    let outcome = run(
        cpu_config(),
        &mut calibration,
        &unit_cube_source(),
        &mut MemorySink::new(),
    )
    .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.preset.tier, PresetTier::Accurate);
    assert!(report.preset.reason.contains(&report.preflight.candidate_pairs.to_string()));
}

// =============================================================================
// Nesting and assignment rules
// =============================================================================

#[test]
fn nested_zone_wins_over_enclosing_zone() {
    let source = MemorySource::new(
        vec![
            ZoneMesh::from_box("floor", &aabb([0.0; 3], [20.0, 20.0, 4.0])),
            ZoneMesh::from_box("room", &aabb([2.0, 2.0, 0.0], [8.0, 8.0, 3.0])),
        ],
        vec![
            Target::from_point("in-room", Point3::new(4.1, 5.3, 1.7)),
            Target::from_point("on-floor", Point3::new(15.2, 13.7, 2.1)),
        ],
    );
    let mut sink = MemorySink::new();
    run(cpu_config(), &mut CalibrationStore::new(), &source, &mut sink).unwrap();

    let in_room = sink.find("in-room").unwrap();
    assert_eq!(in_room.zone_id.as_deref(), Some("room"));
    assert_eq!(in_room.also_inside, vec![0]);

    let on_floor = sink.find("on-floor").unwrap();
    assert_eq!(on_floor.zone_id.as_deref(), Some("floor"));
    assert!(on_floor.also_inside.is_empty());
}

#[test]
fn anchor_rule_follows_the_first_point() {
    let zone = ZoneMesh::from_box("bay", &aabb([0.0; 3], [10.0; 3]));
    // Anchor inside, two of three samples outside.
    let target = Target::from_bounds("beam", aabb([8.0; 3], [14.0; 3])).with_points(vec![
        Point3::new(9.1, 9.2, 9.3),
        Point3::new(12.1, 12.7, 11.3),
        Point3::new(13.4, 11.9, 12.6),
    ]);
    let source = MemorySource::new(vec![zone], vec![target]);

    let mut majority = MemorySink::new();
    run(
        cpu_config().with_preset(PresetTier::Normal),
        &mut CalibrationStore::new(),
        &source,
        &mut majority,
    )
    .unwrap();
    assert!(majority.find("beam").is_none());

    let mut anchor = MemorySink::new();
    run(
        cpu_config()
            .with_preset(PresetTier::Normal)
            .with_assignment_rule(AssignmentRule::Anchor),
        &mut CalibrationStore::new(),
        &source,
        &mut anchor,
    )
    .unwrap();
    let beam = anchor.find("beam").unwrap();
    assert_eq!(beam.zone_id.as_deref(), Some("bay"));
    assert_eq!((beam.inside_samples, beam.total_samples), (1, 3));
}

#[test]
fn random_points_in_a_block_of_rooms() {
    // 5 x 4 rooms of 10 x 10 x 3 with 1-unit walls between them.
    let mut zones = Vec::new();
    for i in 0..5 {
        for j in 0..4 {
            let x = f64::from(i) * 11.0;
            let y = f64::from(j) * 11.0;
            zones.push(ZoneMesh::from_box(
                format!("room-{i}-{j}"),
                &aabb([x, y, 0.0], [x + 10.0, y + 10.0, 3.0]),
            ));
        }
    }

    let mut rng = StdRng::seed_from_u64(7);
    let mut targets = Vec::new();
    let mut expected = Vec::new();
    while targets.len() < 2000 {
        let p = Point3::new(
            rng.gen_range(-5.0..60.0),
            rng.gen_range(-5.0..50.0),
            rng.gen_range(-1.0..4.0),
        );
        let owner = zones.iter().position(|z| z.bounds().unwrap().contains(&p));
        let near_face = zones.iter().any(|z| {
            let b = z.bounds().unwrap();
            b.inflate(1e-3).contains(&p) && !b.inflate(-1e-3).contains(&p)
        });
        if near_face {
            continue;
        }
        expected.push(owner);
        targets.push(Target::from_point(format!("t{}", targets.len()), p));
    }

    let mut sink = MemorySink::new();
    let outcome = run(
        cpu_config()
            .with_preset(PresetTier::Normal)
            .with_max_points_per_dispatch(97),
        &mut CalibrationStore::new(),
        &MemorySource::new(zones, targets),
        &mut sink,
    )
    .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.samples_tested, report.preflight.candidate_pairs);

    let mut got = vec![None; expected.len()];
    for a in sink.assignments() {
        got[a.target_index] = a.zone;
    }
    assert_eq!(got, expected);
}

// =============================================================================
// Backends
// =============================================================================

struct Declines;

impl BackendProbe for Declines {
    fn name(&self) -> &str {
        "broken-gpu"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        Err("driver crashed".to_string())
    }
}

#[test]
fn failing_probe_falls_back_to_cpu() {
    let mut calibration = CalibrationStore::new();
    let mut sink = MemorySink::new();
    let outcome = ClassificationSession::new(ClassifyConfig::default(), &mut calibration)
        .with_probes(vec![Box::new(Declines), Box::new(CpuProbe::default())])
        .run(&unit_cube_source(), &mut sink)
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.backend, "cpu");
    assert_eq!(report.probe_failures.len(), 1);
    assert_eq!(report.probe_failures[0].name, "broken-gpu");
    assert_eq!(report.probe_failures[0].reason, "driver crashed");
    assert!(sink.find("inside").is_some());
}

#[test]
fn no_backend_fails_the_run() {
    let mut calibration = CalibrationStore::new();
    let mut session = ClassificationSession::new(ClassifyConfig::default(), &mut calibration)
        .with_probes(vec![Box::new(Declines)]);
    let progress = session.progress();
    let err = session.run(&unit_cube_source(), &mut MemorySink::new()).unwrap_err();

    assert!(matches!(err, ClassifyError::NoBackend(_)));
    let snap = progress.snapshot();
    assert_eq!(snap.stage, RunStage::Failed);
    assert!(snap.failure.unwrap().contains("driver crashed"));
}

/// Reports every sample uncertain, the way a GPU does for samples within
/// float noise of a face.
struct Fuzzy;

impl ComputeBackend for Fuzzy {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn device(&self) -> &str {
        "test"
    }

    fn jitter_seed(&self) -> u32 {
        0
    }

    fn set_jitter_seed(&mut self, _seed: u32) {}

    fn test_points_batched(
        &mut self,
        _geometry: &ZoneGeometry,
        points: &[SamplePoint],
        _point_zone_ids: &[u32],
        _two_rays: bool,
        _cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>> {
        Ok(vec![ContainmentFlag::Uncertain; points.len()])
    }
}

struct FuzzyProbe;

impl BackendProbe for FuzzyProbe {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        Ok(Box::new(Fuzzy))
    }
}

#[test]
fn cpu_recheck_resolves_uncertain_samples() {
    let mut calibration = CalibrationStore::new();

    let mut without = MemorySink::new();
    let report = ClassificationSession::new(cpu_config(), &mut calibration)
        .with_probes(vec![Box::new(FuzzyProbe)])
        .run(&unit_cube_source(), &mut without)
        .unwrap();
    let report = report.report().unwrap();
    assert_eq!(report.backend, "fuzzy");
    assert_eq!(report.rechecked_samples, 0);
    assert!(without.assignments().is_empty());

    let mut with = MemorySink::new();
    let report = ClassificationSession::new(cpu_config().with_cpu_recheck(true), &mut calibration)
        .with_probes(vec![Box::new(FuzzyProbe)])
        .run(&unit_cube_source(), &mut with)
        .unwrap();
    let report = report.report().unwrap();
    assert_eq!(report.rechecked_samples, report.samples_tested);
    assert!(with.find("inside").is_some());
    assert!(with.find("surface").is_none());
}

// =============================================================================
// Cancellation and failures
// =============================================================================

/// Requests cancellation while the run is reading targets.
struct CancelWhileExtracting {
    inner: MemorySource,
    progress: Arc<RunProgress>,
}

impl GeometrySource for CancelWhileExtracting {
    fn zones(&self) -> Result<Vec<ZoneMesh>, String> {
        self.inner.zones()
    }

    fn targets(&self) -> Result<Vec<Target>, String> {
        self.progress.request_cancel();
        self.inner.targets()
    }
}

#[test]
fn cancellation_skips_write_back() {
    let mut calibration = CalibrationStore::new();
    let mut sink = MemorySink::new();
    let mut session = ClassificationSession::new(cpu_config(), &mut calibration);
    let progress = session.progress();
    let source = CancelWhileExtracting {
        inner: unit_cube_source(),
        progress: Arc::clone(&progress),
    };

    let outcome = session.run(&source, &mut sink).unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Cancelled {
            stage: RunStage::ExtractingGeometry
        }
    ));
    assert!(sink.assignments().is_empty());
    assert_eq!(progress.stage(), RunStage::Cancelled);
    assert!(progress.is_finished());
    assert!(calibration.is_empty());
}

/// Host backend that cancels the run after its first dispatch.
struct CancelAfterFirst(CpuBackend);

impl ComputeBackend for CancelAfterFirst {
    fn name(&self) -> &str {
        "cpu"
    }

    fn device(&self) -> &str {
        self.0.device()
    }

    fn jitter_seed(&self) -> u32 {
        self.0.jitter_seed()
    }

    fn set_jitter_seed(&mut self, seed: u32) {
        self.0.set_jitter_seed(seed);
    }

    fn test_points_batched(
        &mut self,
        geometry: &ZoneGeometry,
        points: &[SamplePoint],
        point_zone_ids: &[u32],
        two_rays: bool,
        cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>> {
        let flags = self
            .0
            .test_points_batched(geometry, points, point_zone_ids, two_rays, cancel)?;
        cancel.cancel();
        Ok(flags)
    }
}

struct CancelAfterFirstProbe;

impl BackendProbe for CancelAfterFirstProbe {
    fn name(&self) -> &str {
        "cpu"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        Ok(Box::new(CancelAfterFirst(CpuBackend::new())))
    }
}

#[test]
fn cancellation_between_dispatches() {
    let mut calibration = CalibrationStore::new();
    let mut sink = MemorySink::new();
    let mut session = ClassificationSession::new(
        cpu_config()
            .with_preset(PresetTier::Fast)
            .with_max_points_per_dispatch(1),
        &mut calibration,
    )
    .with_probes(vec![Box::new(CancelAfterFirstProbe)]);
    let progress = session.progress();

    let outcome = session.run(&unit_cube_source(), &mut sink).unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Cancelled {
            stage: RunStage::ComputingIntersections
        }
    ));
    assert!(sink.assignments().is_empty());
    assert_eq!(progress.snapshot().zones_total, 1);
}

#[test]
fn unsupported_api_version_fails() {
    let source = unit_cube_source().with_api_version(2);
    let mut calibration = CalibrationStore::new();
    let mut session = ClassificationSession::new(cpu_config(), &mut calibration);
    let progress = session.progress();

    let err = session.run(&source, &mut MemorySink::new()).unwrap_err();
    assert!(matches!(
        err,
        ClassifyError::UnsupportedApiVersion { found: 2, .. }
    ));
    assert_eq!(progress.stage(), RunStage::Failed);
}

struct ReadOnly;

impl AssignmentSink for ReadOnly {
    fn write(&mut self, _assignment: &TargetAssignment, _columns: usize) -> Result<usize, String> {
        Err("document is read-only".to_string())
    }
}

#[test]
fn sink_failure_fails_the_run() {
    let mut calibration = CalibrationStore::new();
    let err = run(cpu_config(), &mut calibration, &unit_cube_source(), &mut ReadOnly).unwrap_err();
    match err {
        ClassifyError::Sink { target, message } => {
            assert_eq!(target, "inside");
            assert!(message.contains("read-only"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(calibration.is_empty());
}

#[test]
fn invalid_config_fails_before_extraction() {
    let err = run(
        cpu_config().with_mapping_columns(0),
        &mut CalibrationStore::new(),
        &unit_cube_source(),
        &mut MemorySink::new(),
    )
    .unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidConfig(_)));
}

// =============================================================================
// Progress and calibration
// =============================================================================

#[test]
fn completed_run_walks_every_stage() {
    let mut calibration = CalibrationStore::new();
    let mut session = ClassificationSession::new(cpu_config().with_mapping_columns(3), &mut calibration);
    let progress = session.progress();
    let outcome = session.run(&unit_cube_source(), &mut MemorySink::new()).unwrap();

    let snap = progress.snapshot();
    let stages: Vec<RunStage> = snap.timeline.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            RunStage::Starting,
            RunStage::ResolvingInputs,
            RunStage::ExtractingGeometry,
            RunStage::BuildingIndex,
            RunStage::ComputingIntersections,
            RunStage::ResolvingAssignments,
            RunStage::WritingProperties,
            RunStage::Finalizing,
            RunStage::Completed,
        ]
    );
    assert_eq!(snap.zones_processed, 1);
    assert_eq!(snap.targets_processed, 3);
    assert_eq!(snap.writes_processed, 1);
    assert_eq!(outcome.report().unwrap().writes, 3);
}

#[test]
fn calibration_learns_across_runs() {
    let mut calibration = CalibrationStore::new();
    let source = unit_cube_source();

    let first = run(cpu_config(), &mut calibration, &source, &mut MemorySink::new()).unwrap();
    let first = first.report().unwrap().clone();
    assert!(first.calibration_updated);
    assert!(first.calibration_key.starts_with("cpu|"));
    assert!(first.calibration_key.ends_with("|Accurate"));
    assert_eq!(first.estimate.label, zone_estimate::Confidence::Low);

    let second = run(cpu_config(), &mut calibration, &source, &mut MemorySink::new()).unwrap();
    let second = second.report().unwrap();
    assert_eq!(second.calibration_key, first.calibration_key);
    assert_eq!(calibration.get(&first.calibration_key).unwrap().samples, 2);
    // A run shorter than the fixed overhead pulls the per-pair cost down.
    assert!(second.estimate.total_seconds <= first.estimate.total_seconds);
}
