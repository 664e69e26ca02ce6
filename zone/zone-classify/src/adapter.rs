//! Boundaries to the host application.
//!
//! A run reads zones and targets through a [`GeometrySource`] once, and
//! hands each resolved target to an [`AssignmentSink`]. Hosts resolve their
//! own coordinate transforms before geometry crosses this boundary; the
//! engine only sees world-space meshes and boxes.

use zone_types::{Target, ZoneMesh};

/// Geometry source API version this engine reads.
pub const GEOMETRY_API_VERSION: u32 = 1;

/// Oldest geometry source API version still accepted.
pub const MIN_GEOMETRY_API_VERSION: u32 = 1;

/// Supplies the zones and targets of a run.
pub trait GeometrySource {
    /// Version of the contract the source implements.
    fn api_version(&self) -> u32 {
        GEOMETRY_API_VERSION
    }

    /// All zones, in a stable order. A zone's position in this list is its
    /// zone index in every result.
    ///
    /// # Errors
    ///
    /// A message describing why the host could not produce the zones.
    fn zones(&self) -> Result<Vec<ZoneMesh>, String>;

    /// All targets, in a stable order.
    ///
    /// # Errors
    ///
    /// A message describing why the host could not produce the targets.
    fn targets(&self) -> Result<Vec<Target>, String>;
}

/// The resolved classification of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetAssignment {
    /// Index of the target in the source's list.
    pub target_index: usize,
    /// Host id of the target.
    pub target_id: String,
    /// Index of the chosen zone, `None` when no zone qualified.
    pub zone: Option<usize>,
    /// Host id of the chosen zone.
    pub zone_id: Option<String>,
    /// Samples found inside the chosen zone.
    pub inside_samples: u32,
    /// Samples left uncertain against the chosen zone.
    pub uncertain_samples: u32,
    /// Samples tested against the chosen zone.
    pub total_samples: u32,
    /// Other zones that also qualified, by index.
    pub also_inside: Vec<usize>,
}

impl TargetAssignment {
    /// Whether the target was placed in a zone.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.zone.is_some()
    }
}

/// Receives resolved assignments.
pub trait AssignmentSink {
    /// Write one assignment across `mapping_columns` properties.
    ///
    /// Returns the number of property writes performed.
    ///
    /// # Errors
    ///
    /// A message describing why the host rejected the write. The run fails.
    fn write(
        &mut self,
        assignment: &TargetAssignment,
        mapping_columns: usize,
    ) -> Result<usize, String>;
}

/// In-memory [`GeometrySource`].
///
/// # Example
///
/// ```
/// use zone_classify::{GeometrySource, MemorySource};
/// use zone_types::{Aabb, Point3, Target, ZoneMesh};
///
/// let room = ZoneMesh::from_box("room", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 3.0)));
/// let source = MemorySource::new(vec![room], vec![Target::from_point("lamp", Point3::new(2.0, 2.0, 2.5))]);
///
/// assert_eq!(source.zones().unwrap().len(), 1);
/// assert_eq!(source.targets().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    zones: Vec<ZoneMesh>,
    targets: Vec<Target>,
    api_version: u32,
}

impl MemorySource {
    /// Source serving the given geometry.
    #[must_use]
    pub const fn new(zones: Vec<ZoneMesh>, targets: Vec<Target>) -> Self {
        Self {
            zones,
            targets,
            api_version: GEOMETRY_API_VERSION,
        }
    }

    /// Report a different API version.
    #[must_use]
    pub const fn with_api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }
}

impl GeometrySource for MemorySource {
    fn api_version(&self) -> u32 {
        self.api_version
    }

    fn zones(&self) -> Result<Vec<ZoneMesh>, String> {
        Ok(self.zones.clone())
    }

    fn targets(&self) -> Result<Vec<Target>, String> {
        Ok(self.targets.clone())
    }
}

/// [`AssignmentSink`] that keeps every assignment in memory.
///
/// Each assignment counts as one write per mapping column.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    assignments: Vec<TargetAssignment>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }

    /// Assignments in the order they were written.
    #[must_use]
    pub fn assignments(&self) -> &[TargetAssignment] {
        &self.assignments
    }

    /// Assignment for the target with `target_id`.
    #[must_use]
    pub fn find(&self, target_id: &str) -> Option<&TargetAssignment> {
        self.assignments.iter().find(|a| a.target_id == target_id)
    }

    /// Take the collected assignments, leaving the sink empty.
    pub fn take(&mut self) -> Vec<TargetAssignment> {
        std::mem::take(&mut self.assignments)
    }
}

impl AssignmentSink for MemorySink {
    fn write(
        &mut self,
        assignment: &TargetAssignment,
        mapping_columns: usize,
    ) -> Result<usize, String> {
        self.assignments.push(assignment.clone());
        Ok(mapping_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_types::{Aabb, Point3};

    fn assignment(id: &str, zone: Option<usize>) -> TargetAssignment {
        TargetAssignment {
            target_index: 0,
            target_id: id.to_string(),
            zone,
            zone_id: zone.map(|z| format!("zone-{z}")),
            inside_samples: 1,
            uncertain_samples: 0,
            total_samples: 1,
            also_inside: Vec::new(),
        }
    }

    #[test]
    fn memory_source_reports_version() {
        let source = MemorySource::default();
        assert_eq!(source.api_version(), 0);
        let source = MemorySource::new(Vec::new(), Vec::new());
        assert_eq!(source.api_version(), GEOMETRY_API_VERSION);
        assert_eq!(source.with_api_version(7).api_version(), 7);
    }

    #[test]
    fn memory_source_clones_geometry() {
        let zone = ZoneMesh::from_box("z", &Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)));
        let source = MemorySource::new(vec![zone], vec![Target::from_point("t", Point3::origin())]);
        let zones = source.zones().unwrap();
        assert_eq!(zones[0].id, "z");
        assert_eq!(zones[0].triangles.len(), 12);
        assert_eq!(source.targets().unwrap()[0].id, "t");
    }

    #[test]
    fn memory_sink_counts_columns() {
        let mut sink = MemorySink::new();
        assert_eq!(sink.write(&assignment("a", Some(0)), 3), Ok(3));
        assert_eq!(sink.write(&assignment("b", None), 3), Ok(3));

        assert_eq!(sink.assignments().len(), 2);
        assert!(sink.find("a").unwrap().is_assigned());
        assert!(!sink.find("b").unwrap().is_assigned());
        assert_eq!(sink.take().len(), 2);
        assert!(sink.assignments().is_empty());
    }
}
