// Fetch worker pool - runs backend calls off the controller task
use crate::application::archive_backend::{ArchiveBackend, ArchiveError, FetchRequest};
use crate::application::events::{ChartEvent, RenderSink};
use crate::application::fallback::{LoadOutcome, load_with_fallback};
use crate::application::statistics::{StatisticsTarget, gather};
use crate::domain::sample::Sample;
use crate::domain::series::SeriesKey;
use crate::domain::statistics::SeriesStatistics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Full-window load that replaces the buffer, with fallback.
    Refresh,
    /// Viewport refetch merged into the buffer.
    Merge,
}

/// A fetch issued by the controller. `series_id` and `seq` let the controller
/// drop results for series that are gone and apply the rest in issue order.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub series_id: u64,
    pub seq: u64,
    pub pass: Option<u64>,
    pub kind: JobKind,
    pub request: FetchRequest,
}

#[derive(Debug)]
pub enum JobOutput {
    Loaded(LoadOutcome),
    Fetched(Vec<Sample>),
}

#[derive(Debug)]
pub struct FetchCompletion {
    pub series_id: u64,
    pub seq: u64,
    pub pass: Option<u64>,
    pub key: SeriesKey,
    pub result: Result<JobOutput, ArchiveError>,
}

/// Bounded pool: every submitted job gets its own task, at most `workers`
/// of them talk to the backend at once. A job that outlives `timeout` ends
/// in [`ArchiveError::Timeout`].
#[derive(Clone)]
pub struct FetchPool {
    backend: Arc<dyn ArchiveBackend>,
    permits: Arc<Semaphore>,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    lookback_secs: f64,
    timeout: Duration,
}

impl FetchPool {
    pub fn new(
        backend: Arc<dyn ArchiveBackend>,
        workers: usize,
        lookback_secs: f64,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FetchCompletion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let pool = Self {
            backend,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            completions,
            lookback_secs,
            timeout,
        };
        (pool, rx)
    }

    pub fn submit(&self, job: FetchJob) {
        let backend = self.backend.clone();
        let permits = self.permits.clone();
        let completions = self.completions.clone();
        let lookback_secs = self.lookback_secs;
        let timeout = self.timeout;

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            tracing::info!(
                "Fetching archive data for {} ({}) from {} to {}, {} points",
                job.request.key,
                job.request.path,
                job.request.start_ms,
                job.request.end_ms,
                job.request.target_points
            );

            let work = async {
                match job.kind {
                    JobKind::Refresh => load_with_fallback(backend.as_ref(), &job.request, lookback_secs)
                        .await
                        .map(JobOutput::Loaded),
                    JobKind::Merge => backend.fetch_range(&job.request).await.map(JobOutput::Fetched),
                }
            };
            let result = tokio::time::timeout(timeout, work)
                .await
                .unwrap_or(Err(ArchiveError::Timeout(timeout)));

            let completion = FetchCompletion {
                series_id: job.series_id,
                seq: job.seq,
                pass: job.pass,
                key: job.request.key,
                result,
            };
            // receiver gone means the controller shut down
            let _ = completions.send(completion);
        });
    }

    /// Gathers archive statistics in the background, merges them with the
    /// already computed live entries, and publishes the result.
    pub fn spawn_statistics(
        &self,
        live: Vec<SeriesStatistics>,
        targets: Vec<StatisticsTarget>,
        window: (i64, i64),
        sink: Arc<dyn RenderSink>,
        reply: Option<oneshot::Sender<Vec<SeriesStatistics>>>,
    ) {
        let backend = self.backend.clone();
        let permits = self.permits.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let archived = match permits.acquire_owned().await {
                Ok(_permit) => tokio::time::timeout(timeout, gather(backend.as_ref(), targets, window.0, window.1))
                    .await
                    .unwrap_or_else(|_| {
                        tracing::warn!("Archive statistics did not answer within {:?}", timeout);
                        Vec::new()
                    }),
                Err(_) => Vec::new(),
            };

            let mut entries = live;
            entries.extend(archived);

            sink.notify(ChartEvent::Statistics {
                entries: entries.clone(),
            });
            if let Some(reply) = reply {
                let _ = reply.send(entries);
            }
        });
    }
}
