// Archive backend trait - the historical data collaborator
use crate::domain::sample::Sample;
use crate::domain::series::{MalformedPath, PointMode, SeriesKey, SeriesPath};
use crate::domain::statistics::Statistics;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("archive did not answer within {0:?}")]
    Timeout(Duration),
    #[error("archive returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("archive query error: {0}")]
    Query(String),
    #[error("could not decode archive response: {0}")]
    Decode(String),
    #[error(transparent)]
    MalformedPath(#[from] MalformedPath),
}

/// Intent to retrieve samples of one series over `[start_ms, end_ms]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub key: SeriesKey,
    pub path: SeriesPath,
    pub start_ms: i64,
    pub end_ms: i64,
    pub target_points: usize,
    pub mode: PointMode,
}

impl FetchRequest {
    /// Same series and density over a different window.
    pub fn with_window(&self, start_ms: i64, end_ms: i64) -> Self {
        Self {
            start_ms,
            end_ms,
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Samples in the request window, ordered by timestamp.
    async fn fetch_range(&self, request: &FetchRequest) -> Result<Vec<Sample>, ArchiveError>;

    /// Most recent stored sample of a series, at any time.
    async fn fetch_last_point(&self, path: &SeriesPath) -> Result<Option<Sample>, ArchiveError>;

    /// Aggregate statistics over a window; `None` when the backend has nothing numeric.
    async fn fetch_statistics(
        &self,
        path: &SeriesPath,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<Statistics>, ArchiveError>;
}
