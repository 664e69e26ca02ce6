//! One classification run from source to sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use zone_estimate::{
    CalibrationKey, CalibrationStore, PreflightResult, PresetResolution, RuntimeEstimate,
    estimate, measure, resolve_preset,
};
use zone_kernel::{
    BackendProbe, CancellationToken, ComputeBackend, CpuBackend, KernelError, PointBatch,
    ZoneGeometry,
};
use zone_types::{Aabb, ContainmentFlag, SamplePoint};

use crate::adapter::{AssignmentSink, GEOMETRY_API_VERSION, GeometrySource, MIN_GEOMETRY_API_VERSION};
use crate::assign::{Tallies, resolve_assignments};
use crate::config::ClassifyConfig;
use crate::error::{ClassifyError, ClassifyResult};
use crate::progress::{RunProgress, RunStage};
use crate::sampling::SamplingPlan;
use crate::selection::{ProbeFailure, default_probes, select_backend};

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Backend that ran the pass.
    pub backend: String,
    /// Device the backend ran on.
    pub device: String,
    /// Probes that declined before the backend was chosen.
    pub probe_failures: Vec<ProbeFailure>,
    /// Preflight measurement.
    pub preflight: PreflightResult,
    /// Tier the run used and why.
    pub preset: PresetResolution,
    /// Forecast made before the pass.
    pub estimate: RuntimeEstimate,
    /// Calibration key the run was recorded under.
    pub calibration_key: String,
    /// Whether the calibration entry accepted this run.
    pub calibration_updated: bool,
    /// Sample points tested, summed over zones.
    pub samples_tested: u64,
    /// Samples still uncertain after any recheck.
    pub uncertain_samples: u64,
    /// Samples retested on the host.
    pub rechecked_samples: u64,
    /// Targets placed in a zone.
    pub assigned_targets: usize,
    /// Targets left without a zone.
    pub unassigned_targets: usize,
    /// Property writes reported by the sink.
    pub writes: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// How a run ended without an error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every stage ran.
    Completed(RunReport),
    /// Cancellation was observed; nothing was written.
    Cancelled {
        /// Last stage entered before cancellation was observed.
        stage: RunStage,
    },
}

impl RunOutcome {
    /// The report of a completed run.
    #[must_use]
    pub const fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Early exit from a run.
enum Stop {
    Cancelled,
    Failed(ClassifyError),
}

impl From<ClassifyError> for Stop {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Kernel(KernelError::Cancelled) => Self::Cancelled,
            other => Self::Failed(other),
        }
    }
}

impl From<KernelError> for Stop {
    fn from(err: KernelError) -> Self {
        ClassifyError::from(err).into()
    }
}

impl From<zone_index::IndexError> for Stop {
    fn from(err: zone_index::IndexError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<zone_estimate::EstimateError> for Stop {
    fn from(err: zone_estimate::EstimateError) -> Self {
        Self::Failed(err.into())
    }
}

/// Owns everything one run needs.
///
/// # Example
///
/// ```
/// use zone_classify::{BackendPreference, ClassificationSession, ClassifyConfig, MemorySink, MemorySource};
/// use zone_estimate::CalibrationStore;
/// use zone_types::{Aabb, Point3, Target, ZoneMesh};
///
/// let room = ZoneMesh::from_box("room", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 3.0)));
/// let source = MemorySource::new(
///     vec![room],
///     vec![
///         Target::from_point("lamp", Point3::new(1.3, 2.1, 2.4)),
///         Target::from_point("car", Point3::new(40.0, 2.0, 1.0)),
///     ],
/// );
/// let mut sink = MemorySink::new();
/// let mut calibration = CalibrationStore::new();
///
/// let config = ClassifyConfig::default().with_backend(BackendPreference::CpuOnly);
/// let mut session = ClassificationSession::new(config, &mut calibration);
/// let outcome = session.run(&source, &mut sink).unwrap();
///
/// let report = outcome.report().unwrap();
/// assert_eq!(report.assigned_targets, 1);
/// assert_eq!(sink.find("lamp").unwrap().zone_id.as_deref(), Some("room"));
/// assert!(sink.find("car").is_none());
/// ```
pub struct ClassificationSession<'a> {
    config: ClassifyConfig,
    calibration: &'a mut CalibrationStore,
    progress: Arc<RunProgress>,
    probes: Option<Vec<Box<dyn BackendProbe>>>,
}

impl<'a> ClassificationSession<'a> {
    /// Session using the probes implied by `config.backend`.
    #[must_use]
    pub fn new(config: ClassifyConfig, calibration: &'a mut CalibrationStore) -> Self {
        Self {
            config,
            calibration,
            progress: Arc::new(RunProgress::new()),
            probes: None,
        }
    }

    /// Replace the probe list.
    #[must_use]
    pub fn with_probes(mut self, probes: Vec<Box<dyn BackendProbe>>) -> Self {
        self.probes = Some(probes);
        self
    }

    /// Report progress into a tracker shared with a poller.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Handle for polling and cancelling.
    #[must_use]
    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifyConfig {
        &self.config
    }

    /// Classify every target of `source` and write the results to `sink`.
    ///
    /// Resets the progress tracker first, so a cancellation requested
    /// before the call is discarded.
    ///
    /// # Errors
    ///
    /// Any failure marks the progress [`RunStage::Failed`] and is returned.
    /// Cancellation is not an error; it returns [`RunOutcome::Cancelled`].
    pub fn run(
        &mut self,
        source: &dyn GeometrySource,
        sink: &mut dyn AssignmentSink,
    ) -> ClassifyResult<RunOutcome> {
        let started = Instant::now();
        self.progress.start();
        match self.execute(source, sink, started) {
            Ok(report) => {
                self.progress.mark_completed();
                info!(
                    assigned = report.assigned_targets,
                    unassigned = report.unassigned_targets,
                    writes = report.writes,
                    elapsed_s = report.elapsed.as_secs_f64(),
                    estimated_s = report.estimate.total_seconds,
                    "Classification completed"
                );
                Ok(RunOutcome::Completed(report))
            }
            Err(Stop::Cancelled) => {
                let stage = self.progress.stage();
                self.progress.mark_cancelled();
                info!(stage = %stage, "Classification cancelled");
                Ok(RunOutcome::Cancelled { stage })
            }
            Err(Stop::Failed(err)) => {
                self.progress.mark_failed(err.to_string());
                Err(err)
            }
        }
    }

    fn enter(&self, stage: RunStage) -> Result<(), Stop> {
        if self.progress.is_cancel_requested() {
            return Err(Stop::Cancelled);
        }
        self.progress.set_stage(stage);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        source: &dyn GeometrySource,
        sink: &mut dyn AssignmentSink,
        started: Instant,
    ) -> Result<RunReport, Stop> {
        self.enter(RunStage::ResolvingInputs)?;
        self.config.validate()?;
        let version = source.api_version();
        if !(MIN_GEOMETRY_API_VERSION..=GEOMETRY_API_VERSION).contains(&version) {
            return Err(Stop::Failed(ClassifyError::UnsupportedApiVersion {
                found: version,
                min: MIN_GEOMETRY_API_VERSION,
                max: GEOMETRY_API_VERSION,
            }));
        }

        self.enter(RunStage::ExtractingGeometry)?;
        let zones = source.zones().map_err(ClassifyError::Source)?;
        let targets = source.targets().map_err(ClassifyError::Source)?;
        self.progress
            .set_totals(zones.len() as u64, targets.len() as u64);
        info!(zones = zones.len(), targets = targets.len(), "Geometry extracted");

        self.enter(RunStage::BuildingIndex)?;
        let zone_bounds: Vec<Option<Aabb>> = zones.iter().map(|z| z.bounds()).collect();
        let target_bounds: Vec<Aabb> = targets.iter().map(|t| t.bounds).collect();
        let preflight = measure(&zone_bounds, &target_bounds, &self.config.grid_sizing())?;
        let preset = resolve_preset(self.config.preset, &preflight.result);
        let plan = SamplingPlan::for_tier(preset.tier);

        let selection = match &self.probes {
            Some(probes) => select_backend(probes)?,
            None => select_backend(&default_probes(&self.config))?,
        };
        let mut backend = selection.backend;
        backend.set_jitter_seed(self.config.jitter_seed);

        let calibration_key =
            CalibrationKey::new(backend.name(), backend.device(), preset.tier).to_string();
        let forecast = estimate(
            &preflight.result,
            &self.calibration.entry_or_default(&calibration_key),
            self.config.mapping_columns,
            self.config.expected_assignment_rate,
        );
        info!(
            key = %calibration_key,
            total_s = forecast.total_seconds,
            confidence = %forecast.label,
            "Run forecast"
        );

        let geometry = ZoneGeometry::from_zones(zones.iter().map(|z| z.triangles.as_slice()))?;
        let samples: Vec<Vec<SamplePoint>> = targets
            .iter()
            .enumerate()
            .map(|(i, t)| plan.samples_for(i, t))
            .collect();

        self.enter(RunStage::ComputingIntersections)?;
        let recheck = (self.config.recheck_uncertain_on_cpu && backend.name() != "cpu")
            .then(|| CpuBackend::with_seed(self.config.jitter_seed));
        let mut pass = Pass {
            backend: backend.as_mut(),
            recheck,
            geometry: &geometry,
            two_rays: plan.two_rays,
            cancel: self.progress.cancel_token(),
            batch: PointBatch::with_capacity(self.config.max_points_per_dispatch),
            origins: Vec::with_capacity(self.config.max_points_per_dispatch),
            max_points: self.config.max_points_per_dispatch,
            tallies: Tallies::new(targets.len()),
            samples_tested: 0,
            uncertain_samples: 0,
            rechecked_samples: 0,
        };

        let mut stamps = preflight.grid.new_stamps();
        let mut candidates = Vec::new();
        for (zone, bounds) in zone_bounds.iter().enumerate() {
            if let Some(bounds) = bounds {
                candidates.clear();
                preflight
                    .grid
                    .visit_candidates(bounds, &mut stamps, |t| candidates.push(t))?;
                let zone_id = u32::try_from(zone).map_err(|_| KernelError::TooLarge {
                    what: "zones",
                    count: zones.len(),
                    max: u32::MAX as usize,
                })?;
                for &target in &candidates {
                    for (slot, sample) in (0u32..).zip(&samples[target]) {
                        pass.push(*sample, zone_id, target, zone, slot)?;
                    }
                }
            }
            self.progress.add_zones_processed(1);
        }
        pass.flush()?;
        let Pass {
            tallies,
            samples_tested,
            uncertain_samples,
            rechecked_samples,
            ..
        } = pass;
        info!(
            samples_tested,
            uncertain_samples,
            rechecked_samples,
            "Intersections computed"
        );

        self.enter(RunStage::ResolvingAssignments)?;
        let assignments =
            resolve_assignments(&tallies, self.config.assignment_rule, &zones, &targets);
        self.progress.add_targets_processed(targets.len() as u64);
        self.progress.set_write_total(assignments.len() as u64);

        self.enter(RunStage::WritingProperties)?;
        let mut writes = 0u64;
        for assignment in &assignments {
            let written = sink
                .write(assignment, self.config.mapping_columns)
                .map_err(|message| ClassifyError::Sink {
                    target: assignment.target_id.clone(),
                    message,
                })?;
            writes += written as u64;
            self.progress.add_writes(1);
        }

        self.progress.set_stage(RunStage::Finalizing);
        backend.reset();
        let elapsed = started.elapsed();
        let calibration_updated = self.calibration.update(
            &calibration_key,
            elapsed.as_secs_f64(),
            preflight.result.candidate_pairs,
            writes,
        );

        Ok(RunReport {
            backend: backend.name().to_string(),
            device: backend.device().to_string(),
            probe_failures: selection.failures,
            preflight: preflight.result,
            preset,
            estimate: forecast,
            calibration_key,
            calibration_updated,
            samples_tested,
            uncertain_samples,
            rechecked_samples,
            assigned_targets: assignments.len(),
            unassigned_targets: targets.len() - assignments.len(),
            writes,
            elapsed,
        })
    }
}

/// State of the intersection pass: the pending batch, where each pending
/// sample came from, and the tallies so far.
struct Pass<'r> {
    backend: &'r mut dyn ComputeBackend,
    recheck: Option<CpuBackend>,
    geometry: &'r ZoneGeometry,
    two_rays: bool,
    cancel: &'r CancellationToken,
    batch: PointBatch,
    /// `(target, zone, slot)` per pending sample.
    origins: Vec<(usize, usize, u32)>,
    max_points: usize,
    tallies: Tallies,
    samples_tested: u64,
    uncertain_samples: u64,
    rechecked_samples: u64,
}

impl Pass<'_> {
    fn push(
        &mut self,
        sample: SamplePoint,
        zone_id: u32,
        target: usize,
        zone: usize,
        slot: u32,
    ) -> Result<(), Stop> {
        self.batch.push(sample, zone_id);
        self.origins.push((target, zone, slot));
        if self.batch.len() >= self.max_points {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Stop> {
        if self.batch.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        let mut flags = self.backend.test_points_batched(
            self.geometry,
            self.batch.points(),
            self.batch.zone_ids(),
            self.two_rays,
            self.cancel,
        )?;

        if let Some(cpu) = self.recheck.as_mut() {
            let uncertain: Vec<usize> = flags
                .iter()
                .enumerate()
                .filter(|(_, f)| **f == ContainmentFlag::Uncertain)
                .map(|(i, _)| i)
                .collect();
            if !uncertain.is_empty() {
                let points: Vec<SamplePoint> =
                    uncertain.iter().map(|&i| self.batch.points()[i]).collect();
                let zone_ids: Vec<u32> =
                    uncertain.iter().map(|&i| self.batch.zone_ids()[i]).collect();
                let rechecked = cpu.test_points_batched(
                    self.geometry,
                    &points,
                    &zone_ids,
                    self.two_rays,
                    self.cancel,
                )?;
                for (&i, flag) in uncertain.iter().zip(rechecked) {
                    flags[i] = flag;
                }
                self.rechecked_samples += uncertain.len() as u64;
            }
        }

        for (&(target, zone, slot), &flag) in self.origins.iter().zip(&flags) {
            if flag == ContainmentFlag::Uncertain {
                self.uncertain_samples += 1;
            }
            self.tallies.record(target, zone, slot, flag);
        }
        self.samples_tested += flags.len() as u64;
        debug!(
            points = flags.len(),
            backend = self.backend.name(),
            "Batch dispatched"
        );
        self.batch.clear();
        self.origins.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_cancellation_is_not_a_failure() {
        assert!(matches!(Stop::from(KernelError::Cancelled), Stop::Cancelled));
        assert!(matches!(
            Stop::from(KernelError::backend("wgpu", "lost")),
            Stop::Failed(ClassifyError::Kernel(_))
        ));
        assert!(matches!(
            Stop::from(ClassifyError::Source("gone".to_string())),
            Stop::Failed(ClassifyError::Source(_))
        ));
    }

    #[test]
    fn outcome_accessors() {
        let cancelled = RunOutcome::Cancelled {
            stage: RunStage::BuildingIndex,
        };
        assert!(cancelled.is_cancelled());
        assert!(cancelled.report().is_none());
    }
}
