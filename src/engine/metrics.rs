//! Read metrics.
//!
//! Opt-in observability for a single `read`: how long the whole pass took,
//! how much of it went to rule dispatch, and the line/record tallies. The
//! plain `read` path computes these too (they are cheap counters and two
//! `Instant` reads) but only `read_with_metrics` hands them back.

use std::time::Duration;

/// Timing and tallies for one read.
#[derive(Debug, Default, Clone)]
pub struct ReadMetrics {
    /// Total elapsed time for the read.
    pub total: Duration,
    /// Time spent inside rule dispatch (test + run across all lines).
    pub dispatch: Duration,
    /// Physical lines pulled from the source.
    pub physical_lines: usize,
    /// Logical lines emitted by the unwrap machine.
    pub logical_lines: usize,
    /// Records accumulated by the end of the read.
    pub records: usize,
}
