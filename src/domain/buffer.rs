// Per-series point buffer
use super::sample::Sample;
use std::collections::VecDeque;

/// Values closer than this are considered unchanged on a same-timestamp insert.
pub const VALUE_EPSILON: f64 = 1e-10;

/// What a single [`PointBuffer::insert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new timestamp was added. `was_empty` reports the empty → non-empty
    /// transition the chart uses to re-enable auto-ranging.
    Inserted { was_empty: bool },
    /// Existing timestamp, value replaced in place.
    Replaced,
    /// Existing timestamp with an equal value.
    Unchanged,
}

/// Samples of one series, sorted by timestamp with no duplicate timestamps.
/// Eviction removes the oldest samples first.
#[derive(Debug, Clone, Default)]
pub struct PointBuffer {
    samples: VecDeque<Sample>,
}

impl PointBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    fn position(&self, time_ms: i64) -> Result<usize, usize> {
        self.samples.binary_search_by_key(&time_ms, |s| s.time_ms)
    }

    pub fn contains_time(&self, time_ms: i64) -> bool {
        self.position(time_ms).is_ok()
    }

    pub fn insert(&mut self, sample: Sample) -> InsertOutcome {
        match self.position(sample.time_ms) {
            Ok(idx) => {
                let existing = &mut self.samples[idx];
                if (existing.value - sample.value).abs() > VALUE_EPSILON {
                    existing.value = sample.value;
                    InsertOutcome::Replaced
                } else {
                    InsertOutcome::Unchanged
                }
            }
            Err(idx) => {
                let was_empty = self.samples.is_empty();
                self.samples.insert(idx, sample);
                InsertOutcome::Inserted { was_empty }
            }
        }
    }

    /// Evicts the earliest samples until at most `cap` remain. Returns the number evicted.
    pub fn trim(&mut self, cap: usize) -> usize {
        let excess = self.samples.len().saturating_sub(cap);
        self.samples.drain(..excess);
        excess
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// `(min, max)` timestamp held, or `None` when empty.
    pub fn range(&self) -> Option<(i64, i64)> {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => Some((first.time_ms, last.time_ms)),
            _ => None,
        }
    }

    /// Replaces the contents with an already sorted, duplicate-free sequence.
    pub(crate) fn replace_sorted(&mut self, samples: Vec<Sample>) {
        debug_assert!(samples.windows(2).all(|w| w[0].time_ms < w[1].time_ms));
        self.samples = samples.into();
    }

    pub(crate) fn take(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(buffer: &PointBuffer) -> Vec<i64> {
        buffer.iter().map(|s| s.time_ms).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut buffer = PointBuffer::new();
        for t in [5, 1, 3, 4, 2] {
            buffer.insert(Sample::new(t, t as f64));
        }
        assert_eq!(times(&buffer), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.range(), Some((1, 5)));
    }

    #[test]
    fn test_insert_reports_empty_transition() {
        let mut buffer = PointBuffer::new();
        assert_eq!(
            buffer.insert(Sample::new(1, 1.0)),
            InsertOutcome::Inserted { was_empty: true }
        );
        assert_eq!(
            buffer.insert(Sample::new(2, 1.0)),
            InsertOutcome::Inserted { was_empty: false }
        );
    }

    #[test]
    fn test_same_timestamp_replaces_only_on_change() {
        let mut buffer = PointBuffer::new();
        buffer.insert(Sample::new(10, 1.0));
        assert_eq!(buffer.insert(Sample::new(10, 1.0 + 1e-12)), InsertOutcome::Unchanged);
        assert_eq!(buffer.to_vec(), vec![Sample::new(10, 1.0)]);
        assert_eq!(buffer.insert(Sample::new(10, 2.0)), InsertOutcome::Replaced);
        assert_eq!(buffer.to_vec(), vec![Sample::new(10, 2.0)]);
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let mut buffer = PointBuffer::new();
        for (t, v) in [1, 2, 3, 4, 5, 6, 7].into_iter().zip([10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]) {
            buffer.insert(Sample::new(t, v));
            buffer.trim(5);
        }
        assert_eq!(
            buffer.to_vec(),
            vec![
                Sample::new(3, 30.0),
                Sample::new(4, 40.0),
                Sample::new(5, 50.0),
                Sample::new(6, 60.0),
                Sample::new(7, 70.0),
            ]
        );
    }

    #[test]
    fn test_trim_after_unordered_inserts() {
        let mut buffer = PointBuffer::new();
        for t in [9, 3, 7, 1, 5, 8, 2] {
            buffer.insert(Sample::new(t, 0.0));
        }
        assert_eq!(buffer.trim(3), 4);
        assert_eq!(times(&buffer), vec![7, 8, 9]);
        assert_eq!(buffer.trim(10), 0);
    }

    #[test]
    fn test_clear_and_empty_range() {
        let mut buffer = PointBuffer::new();
        buffer.insert(Sample::new(1, 1.0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.range(), None);
    }
}
