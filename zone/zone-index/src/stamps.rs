//! Per-query deduplication marks.

/// Visited marks reused across grid queries.
///
/// A target overlapping several cells is reachable from each of them. Instead
/// of clearing a visited set before every query, each query takes a fresh
/// stamp and a target counts as visited when its slot holds the current
/// stamp. Starting a query is O(1); only the rare `u32` wrap clears the
/// array.
///
/// # Example
///
/// ```
/// use zone_index::CandidateStamps;
///
/// let mut stamps = CandidateStamps::new(3);
/// stamps.begin_query();
/// assert!(stamps.mark(1));
/// assert!(!stamps.mark(1));
///
/// stamps.begin_query();
/// assert!(stamps.mark(1));
/// ```
#[derive(Debug, Clone)]
pub struct CandidateStamps {
    marks: Vec<u32>,
    current: u32,
}

impl CandidateStamps {
    /// Create stamps for `target_count` targets.
    #[must_use]
    pub fn new(target_count: usize) -> Self {
        Self {
            marks: vec![0; target_count],
            current: 0,
        }
    }

    /// Number of target slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether there are no target slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Stamp of the query in progress. Zero before the first query.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Start a new query.
    ///
    /// On wrap-around every slot is cleared and stamping restarts at 1, so
    /// a stale slot can never alias the new stamp.
    pub fn begin_query(&mut self) {
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.marks.fill(0);
            self.current = 1;
        }
    }

    /// Mark `index` as visited by the current query.
    ///
    /// Returns `true` the first time `index` is marked within the query.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn mark(&mut self, index: usize) -> bool {
        let slot = &mut self.marks[index];
        if *slot == self.current {
            false
        } else {
            *slot = self.current;
            true
        }
    }

    #[cfg(test)]
    pub(crate) fn force_current(&mut self, stamp: u32) {
        self.current = stamp;
    }
}
