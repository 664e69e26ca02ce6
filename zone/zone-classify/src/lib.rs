//! Zone containment classification runs.
//!
//! A [`ClassificationSession`] takes zones and targets from a
//! [`GeometrySource`], decides for every target which zone it sits in, and
//! hands the answers to an [`AssignmentSink`]:
//!
//! 1. Preflight builds the candidate index and counts zone/target pairs
//! 2. The requested tier is resolved and a [`SamplingPlan`] chosen
//! 3. The first backend a probe can create runs the pass (see
//!    [`select_backend`])
//! 4. Sample tallies become [`TargetAssignment`]s under an
//!    [`AssignmentRule`]
//! 5. The run's wall time is fed back into the calibration store
//!
//! A [`RunProgress`] shared through an `Arc` reports the current stage and
//! counters to a poller and carries cancellation into the run.
//!
//! # Example
//!
//! ```
//! use zone_classify::{BackendPreference, ClassificationSession, ClassifyConfig, MemorySink, MemorySource, RunStage};
//! use zone_estimate::CalibrationStore;
//! use zone_types::{Aabb, Point3, Target, ZoneMesh};
//!
//! let zones = vec![
//!     ZoneMesh::from_box("hall", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 4.0))),
//!     ZoneMesh::from_box("annex", &Aabb::new(Point3::new(12.0, 0.0, 0.0), Point3::new(20.0, 10.0, 4.0))),
//! ];
//! let targets = vec![
//!     Target::from_point("valve-1", Point3::new(3.1, 4.7, 1.3)),
//!     Target::from_point("valve-2", Point3::new(15.3, 2.9, 2.2)),
//! ];
//!
//! let mut calibration = CalibrationStore::new();
//! let mut sink = MemorySink::new();
//! let config = ClassifyConfig::default().with_backend(BackendPreference::CpuOnly);
//! let mut session = ClassificationSession::new(config, &mut calibration);
//! let progress = session.progress();
//!
//! let outcome = session.run(&MemorySource::new(zones, targets), &mut sink).unwrap();
//! assert!(!outcome.is_cancelled());
//! assert_eq!(progress.stage(), RunStage::Completed);
//! assert_eq!(sink.find("valve-2").unwrap().zone_id.as_deref(), Some("annex"));
//! assert_eq!(calibration.len(), 1);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod adapter;
mod assign;
mod config;
mod error;
mod progress;
mod sampling;
mod selection;
mod session;

pub use adapter::{
    AssignmentSink, GEOMETRY_API_VERSION, GeometrySource, MIN_GEOMETRY_API_VERSION, MemorySink,
    MemorySource, TargetAssignment,
};
pub use assign::{Tallies, ZoneTally, choose_zone, resolve_assignments};
pub use config::{AssignmentRule, BackendPreference, ClassifyConfig};
pub use error::{ClassifyError, ClassifyResult};
pub use progress::{ProgressSnapshot, RunProgress, RunStage, StageTiming};
pub use sampling::{CORNER_INSET, KEYS_PER_TARGET, SamplingPlan, jitter_key};
pub use selection::{BackendSelection, ProbeFailure, default_probes, select_backend};
pub use session::{ClassificationSession, RunOutcome, RunReport};
