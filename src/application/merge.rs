// Merge/dedup engine - folds fetched samples into a series buffer
use crate::domain::buffer::PointBuffer;
use crate::domain::sample::Sample;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub added: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub kept: usize,
    /// Original sample count when stride decimation was applied.
    pub decimated_from: Option<usize>,
}

/// Sorts a fetched batch and drops repeated timestamps, keeping the first seen.
fn sorted_unique(mut samples: Vec<Sample>) -> Vec<Sample> {
    samples.sort_by_key(|s| s.time_ms);
    samples.dedup_by_key(|s| s.time_ms);
    samples
}

/// Incremental merge: fetched samples whose timestamp is already buffered are
/// ignored, the rest are merged in timestamp order and the buffer is trimmed to `cap`.
pub fn merge(buffer: &mut PointBuffer, fetched: &[Sample], cap: usize) -> MergeOutcome {
    let fresh: Vec<Sample> = fetched
        .iter()
        .filter(|s| !buffer.contains_time(s.time_ms))
        .copied()
        .collect();
    let fresh = sorted_unique(fresh);

    if fresh.is_empty() {
        return MergeOutcome {
            added: 0,
            evicted: buffer.trim(cap),
        };
    }

    let existing = buffer.take();
    let mut merged = Vec::with_capacity(existing.len() + fresh.len());
    let mut left = existing.into_iter().peekable();
    let mut right = fresh.iter().copied().peekable();

    // both sides are sorted and share no timestamps
    loop {
        let next = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => match a.time_ms.cmp(&b.time_ms) {
                Ordering::Less => left.next(),
                _ => right.next(),
            },
            (Some(_), None) => left.next(),
            (None, Some(_)) => right.next(),
            (None, None) => break,
        };
        merged.extend(next);
    }

    buffer.replace_sorted(merged);
    MergeOutcome {
        added: fresh.len(),
        evicted: buffer.trim(cap),
    }
}

/// Full-window refresh: the buffer is replaced wholesale by `fetched`,
/// stride-decimated first when it holds more than `ceiling` samples.
pub fn replace(buffer: &mut PointBuffer, fetched: Vec<Sample>, cap: usize, ceiling: usize) -> ReplaceOutcome {
    let fetched = sorted_unique(fetched);
    let original = fetched.len();
    let (samples, decimated_from) = if original > ceiling {
        (decimate(fetched, ceiling), Some(original))
    } else {
        (fetched, None)
    };

    buffer.replace_sorted(samples);
    buffer.trim(cap.min(ceiling));

    ReplaceOutcome {
        kept: buffer.len(),
        decimated_from,
    }
}

/// Fixed-stride subsampling: with `stride = floor(n / ceiling)`, keeps the
/// first sample of every complete stride group. This is not min/max
/// preserving, so short spikes between kept samples disappear.
pub fn decimate(samples: Vec<Sample>, ceiling: usize) -> Vec<Sample> {
    if ceiling == 0 || samples.len() <= ceiling {
        return samples;
    }
    let stride = samples.len() / ceiling;
    samples.chunks_exact(stride).map(|group| group[0]).collect()
}
