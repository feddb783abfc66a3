// Viewport domain model
use serde::{Deserialize, Serialize};

/// Windows narrower than this are treated as degenerate axis states.
const MIN_WIDTH_SECS: f64 = 1e-6;

/// Visible time window of the chart, in epoch seconds. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    start: f64,
    end: f64,
}

impl Viewport {
    /// Builds a viewport from two axis bounds in any order. Returns `None` for
    /// non-finite or zero-width windows.
    pub fn new(a: f64, b: f64) -> Option<Self> {
        if !a.is_finite() || !b.is_finite() || (b - a).abs() < MIN_WIDTH_SECS {
            return None;
        }
        Some(Self {
            start: a.min(b),
            end: a.max(b),
        })
    }

    /// One-hour style lookback window ending at `end_ms`.
    pub fn ending_at(end_ms: i64, lookback_secs: f64) -> Option<Self> {
        let end = end_ms as f64 / 1000.0;
        Self::new(end - lookback_secs, end)
    }

    /// Smallest viewport bracketing `[min_ms, max_ms]` with a fractional margin
    /// on each side. A single-instant range gets one second of margin.
    pub fn bracketing(min_ms: i64, max_ms: i64, margin_fraction: f64) -> Option<Self> {
        let start = min_ms as f64 / 1000.0;
        let end = max_ms as f64 / 1000.0;
        let margin = ((end - start) * margin_fraction).max(if end > start { 0.0 } else { 1.0 });
        Self::new(start - margin, end + margin)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn start_ms(&self) -> i64 {
        (self.start * 1000.0).floor() as i64
    }

    pub fn end_ms(&self) -> i64 {
        (self.end * 1000.0).ceil() as i64
    }

    /// Fraction of this window spanned by a buffered `[first_ms, last_ms]` range, in `0..=1`.
    pub fn coverage(&self, first_ms: i64, last_ms: i64) -> f64 {
        let first = first_ms as f64 / 1000.0;
        let last = last_ms as f64 / 1000.0;
        let overlap = last.min(self.end) - first.max(self.start);
        (overlap / self.duration()).clamp(0.0, 1.0)
    }

    /// Both endpoints lie within `duration / divisor` of `previous`.
    pub fn is_similar_to(&self, previous: &Viewport, divisor: f64) -> bool {
        let threshold = self.duration() / divisor;
        (previous.start - self.start).abs() < threshold && (previous.end - self.end).abs() < threshold
    }
}
