//! Run progress and cancellation, shared between the worker and a poller.
//!
//! The worker owns the run and calls the mutating methods; any number of
//! pollers hold an `Arc<RunProgress>` and read [`RunProgress::snapshot`].
//! Scalars are atomics so polling never blocks the worker. The stage
//! timeline and the failure message share one lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zone_kernel::CancellationToken;

/// Stage of a classification run.
///
/// Stages are ordered; a run only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RunStage {
    /// Run created, nothing done yet.
    Starting = 0,
    /// Checking the geometry source.
    ResolvingInputs = 1,
    /// Reading zones and targets from the source.
    ExtractingGeometry = 2,
    /// Building the candidate index and preflight.
    BuildingIndex = 3,
    /// Testing sample points against zones.
    ComputingIntersections = 4,
    /// Turning sample tallies into per-target assignments.
    ResolvingAssignments = 5,
    /// Handing assignments to the sink.
    WritingProperties = 6,
    /// Updating calibration.
    Finalizing = 7,
    /// Finished normally.
    Completed = 8,
    /// Stopped on request.
    Cancelled = 9,
    /// Stopped by an error.
    Failed = 10,
}

impl RunStage {
    /// Whether the run has ended in this stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Name as shown to users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::ResolvingInputs => "Resolving inputs",
            Self::ExtractingGeometry => "Extracting geometry",
            Self::BuildingIndex => "Building index",
            Self::ComputingIntersections => "Computing intersections",
            Self::ResolvingAssignments => "Resolving assignments",
            Self::WritingProperties => "Writing properties",
            Self::Finalizing => "Finalizing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::ResolvingInputs,
            2 => Self::ExtractingGeometry,
            3 => Self::BuildingIndex,
            4 => Self::ComputingIntersections,
            5 => Self::ResolvingAssignments,
            6 => Self::WritingProperties,
            7 => Self::Finalizing,
            8 => Self::Completed,
            9 => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// The stage.
    pub stage: RunStage,
    /// Time from entering the stage to leaving it, or to the snapshot if
    /// the stage is still open.
    pub duration: Duration,
    /// Whether the stage is still open.
    pub open: bool,
}

/// Point-in-time copy of a run's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Current stage.
    pub stage: RunStage,
    /// Whether a terminal stage was reached.
    pub finished: bool,
    /// Whether cancellation was requested.
    pub cancel_requested: bool,
    /// Zones whose candidates have been queued for testing.
    pub zones_processed: u64,
    /// Zones in the run.
    pub zones_total: u64,
    /// Targets with a resolved assignment.
    pub targets_processed: u64,
    /// Targets in the run.
    pub targets_total: u64,
    /// Writes reported by the sink.
    pub writes_processed: u64,
    /// Assignments queued for writing.
    pub writes_total: u64,
    /// Failure message, set only in [`RunStage::Failed`].
    pub failure: Option<String>,
    /// Stages in the order they were entered.
    pub timeline: Vec<StageTiming>,
    /// Time since [`RunProgress::start`].
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Fraction of the current phase's work done, in `[0, 1]`.
    ///
    /// Counts targets while resolving assignments and writes while writing
    /// or finalizing. Every other stage, intersection included, counts
    /// zones. A phase with no work reports 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn phase_fraction(&self) -> f64 {
        let (done, total) = match self.stage {
            RunStage::ResolvingAssignments => (self.targets_processed, self.targets_total),
            RunStage::WritingProperties | RunStage::Finalizing => {
                (self.writes_processed, self.writes_total)
            }
            _ => (self.zones_processed, self.zones_total),
        };
        if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).min(1.0)
        }
    }
}

#[derive(Debug)]
struct TimelineEntry {
    stage: RunStage,
    entered: Instant,
    left: Option<Instant>,
}

#[derive(Debug)]
struct Timeline {
    started: Instant,
    entries: Vec<TimelineEntry>,
    failure: Option<String>,
}

impl Timeline {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            entries: vec![TimelineEntry {
                stage: RunStage::Starting,
                entered: now,
                left: None,
            }],
            failure: None,
        }
    }

    fn enter(&mut self, stage: RunStage) {
        let now = Instant::now();
        if let Some(last) = self.entries.last_mut() {
            last.left.get_or_insert(now);
        }
        let left = stage.is_terminal().then_some(now);
        self.entries.push(TimelineEntry {
            stage,
            entered: now,
            left,
        });
    }
}

/// Thread-safe progress tracker for one run at a time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use zone_classify::{RunProgress, RunStage};
///
/// let progress = Arc::new(RunProgress::new());
/// let poller = Arc::clone(&progress);
///
/// progress.start();
/// assert!(progress.set_stage(RunStage::ResolvingInputs));
/// assert!(!progress.set_stage(RunStage::Starting));
///
/// poller.request_cancel();
/// assert!(progress.is_cancel_requested());
///
/// progress.mark_cancelled();
/// assert!(poller.snapshot().finished);
/// ```
#[derive(Debug)]
pub struct RunProgress {
    stage: AtomicU8,
    finished: AtomicBool,
    cancel: CancellationToken,
    zones_processed: AtomicU64,
    zones_total: AtomicU64,
    targets_processed: AtomicU64,
    targets_total: AtomicU64,
    writes_processed: AtomicU64,
    writes_total: AtomicU64,
    timeline: Mutex<Timeline>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunProgress {
    /// A tracker in [`RunStage::Starting`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: AtomicU8::new(RunStage::Starting as u8),
            finished: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            zones_processed: AtomicU64::new(0),
            zones_total: AtomicU64::new(0),
            targets_processed: AtomicU64::new(0),
            targets_total: AtomicU64::new(0),
            writes_processed: AtomicU64::new(0),
            writes_total: AtomicU64::new(0),
            timeline: Mutex::new(Timeline::fresh()),
        }
    }

    /// Reset for a new run: counters to zero, cancellation cleared, and a
    /// fresh timeline opened at [`RunStage::Starting`].
    pub fn start(&self) {
        let mut timeline = self.timeline.lock();
        *timeline = Timeline::fresh();
        self.cancel.reset();
        for counter in [
            &self.zones_processed,
            &self.zones_total,
            &self.targets_processed,
            &self.targets_total,
            &self.writes_processed,
            &self.writes_total,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.stage.store(RunStage::Starting as u8, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        debug!("Run progress reset");
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> RunStage {
        RunStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    /// Whether a terminal stage was reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Move to a later non-terminal stage.
    ///
    /// Returns `false`, changing nothing, if `stage` is terminal, not after
    /// the current stage, or the run has finished.
    pub fn set_stage(&self, stage: RunStage) -> bool {
        if stage.is_terminal() {
            return false;
        }
        let mut timeline = self.timeline.lock();
        let current = self.stage();
        if self.is_finished() || stage <= current {
            debug!(from = %current, to = %stage, "Stage transition refused");
            return false;
        }
        timeline.enter(stage);
        self.stage.store(stage as u8, Ordering::Release);
        info!(stage = %stage, "Run stage");
        true
    }

    /// Ask the worker to stop. Has no effect once the run has finished.
    pub fn request_cancel(&self) {
        if !self.is_finished() {
            self.cancel.cancel();
            info!(stage = %self.stage(), "Cancellation requested");
        }
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token backends check between dispatches.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// End the run successfully. Returns `false` if it had already ended.
    pub fn mark_completed(&self) -> bool {
        self.finish(RunStage::Completed, None)
    }

    /// End the run as cancelled. Returns `false` if it had already ended.
    pub fn mark_cancelled(&self) -> bool {
        self.finish(RunStage::Cancelled, None)
    }

    /// End the run as failed. Returns `false` if it had already ended.
    pub fn mark_failed(&self, message: impl Into<String>) -> bool {
        self.finish(RunStage::Failed, Some(message.into()))
    }

    fn finish(&self, stage: RunStage, failure: Option<String>) -> bool {
        let mut timeline = self.timeline.lock();
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        timeline.enter(stage);
        if let Some(message) = &failure {
            warn!(message = %message, "Run failed");
        } else {
            info!(stage = %stage, "Run finished");
        }
        timeline.failure = failure;
        self.stage.store(stage as u8, Ordering::Release);
        true
    }

    /// Raise the zone and target totals.
    pub fn set_totals(&self, zones: u64, targets: u64) {
        self.zones_total.fetch_max(zones, Ordering::Relaxed);
        self.targets_total.fetch_max(targets, Ordering::Relaxed);
    }

    /// Raise the number of assignments queued for writing.
    pub fn set_write_total(&self, writes: u64) {
        self.writes_total.fetch_max(writes, Ordering::Relaxed);
    }

    /// Count zones processed.
    pub fn add_zones_processed(&self, count: u64) {
        self.zones_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Count targets processed.
    pub fn add_targets_processed(&self, count: u64) {
        self.targets_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Count writes performed.
    pub fn add_writes(&self, count: u64) {
        self.writes_processed.fetch_add(count, Ordering::Relaxed);
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let timeline = self.timeline.lock();
        let now = Instant::now();
        let entries = timeline
            .entries
            .iter()
            .map(|e| StageTiming {
                stage: e.stage,
                duration: e.left.unwrap_or(now).saturating_duration_since(e.entered),
                open: e.left.is_none(),
            })
            .collect();
        ProgressSnapshot {
            stage: self.stage(),
            finished: self.is_finished(),
            cancel_requested: self.is_cancel_requested(),
            zones_processed: self.zones_processed.load(Ordering::Relaxed),
            zones_total: self.zones_total.load(Ordering::Relaxed),
            targets_processed: self.targets_processed.load(Ordering::Relaxed),
            targets_total: self.targets_total.load(Ordering::Relaxed),
            writes_processed: self.writes_processed.load(Ordering::Relaxed),
            writes_total: self.writes_total.load(Ordering::Relaxed),
            failure: timeline.failure.clone(),
            timeline: entries,
            elapsed: now.saturating_duration_since(timeline.started),
        }
    }
}
