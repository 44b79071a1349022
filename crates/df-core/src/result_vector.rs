//! Ordered collections of fit results with per-point timing.

use crate::result::FitResult;
use std::time::{Duration, Instant};

/// Append-only sequence of [`FitResult`] plus per-point wall time.
///
/// Used both for parameter scans (one entry per grid point) and toy studies
/// (one entry per pseudo-experiment). Existing entries are never mutated.
#[derive(Debug, Clone)]
pub struct FitResultVector {
    names: Vec<String>,
    results: Vec<FitResult>,
    durations: Vec<Duration>,
    stopwatch: Option<Instant>,
}

impl FitResultVector {
    /// Create an empty collection for results over the given parameter schema.
    pub fn new(names: Vec<String>) -> Self {
        Self { names, results: Vec::new(), durations: Vec::new(), stopwatch: None }
    }

    /// Parameter names this collection was declared with.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Begin timing the next fit point.
    pub fn start_stopwatch(&mut self) {
        self.stopwatch = Some(Instant::now());
    }

    /// Append a result, closing the stopwatch opened by [`Self::start_stopwatch`].
    pub fn add_result(&mut self, result: FitResult) {
        let elapsed = self.stopwatch.take().map(|t| t.elapsed()).unwrap_or_default();
        self.durations.push(elapsed);
        self.results.push(result);
    }

    /// Append a result whose wall time was measured externally.
    ///
    /// Used when fits run on worker threads and timing cannot go through the
    /// shared stopwatch.
    pub fn add_timed_result(&mut self, result: FitResult, duration: Duration) {
        self.stopwatch = None;
        self.durations.push(duration);
        self.results.push(result);
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no results are stored.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The i-th result.
    pub fn result(&self, i: usize) -> Option<&FitResult> {
        self.results.get(i)
    }

    /// The i-th result, mutable (post-hoc parameter injection only).
    pub fn result_mut(&mut self, i: usize) -> Option<&mut FitResult> {
        self.results.get_mut(i)
    }

    /// Iterate over results in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FitResult> {
        self.results.iter()
    }

    /// Wall time spent on the i-th point.
    pub fn duration(&self, i: usize) -> Option<Duration> {
        self.durations.get(i).copied()
    }

    /// Total wall time over all points.
    pub fn total_time(&self) -> Duration {
        self.durations.iter().sum()
    }
}
