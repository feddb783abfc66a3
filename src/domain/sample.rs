// Sample domain model
use serde::{Deserialize, Serialize};

/// A single (timestamp, value) reading. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time_ms: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Smallest and largest timestamp of a non-empty sample set.
pub fn time_bounds(samples: &[Sample]) -> Option<(i64, i64)> {
    samples.iter().fold(None, |bounds, s| match bounds {
        None => Some((s.time_ms, s.time_ms)),
        Some((lo, hi)) => Some((lo.min(s.time_ms), hi.max(s.time_ms))),
    })
}
