// Render sink notifications emitted by the controller
use crate::domain::statistics::SeriesStatistics;
use crate::domain::viewport::Viewport;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartEvent {
    /// Buffer contents of `key` changed.
    Redraw { key: String },
    /// A buffer went from empty to non-empty; axes should auto-range again.
    EnableAutoRange { key: String },
    /// The controller moved the viewport onto fallback data.
    ViewportAdjusted { viewport: Viewport },
    /// Neither the window nor the fallback had data for `key`.
    NoData { key: String },
    /// Fetching `key` failed; its buffer was left unchanged.
    FetchFailed { key: String, message: String },
    Statistics { entries: Vec<SeriesStatistics> },
}

/// Fire-and-forget receiver of [`ChartEvent`]s.
pub trait RenderSink: Send + Sync {
    fn notify(&self, event: ChartEvent);
}

impl RenderSink for broadcast::Sender<ChartEvent> {
    fn notify(&self, event: ChartEvent) {
        // no subscribers is fine
        let _ = self.send(event);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records everything it is told.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ChartEvent>>,
    }

    impl RecordingSink {
        pub fn take(&self) -> Vec<ChartEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl RenderSink for RecordingSink {
        fn notify(&self, event: ChartEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
