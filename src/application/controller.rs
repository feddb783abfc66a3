// Chart controller - single-threaded owner of every series buffer and the viewport
use crate::application::archive_backend::{ArchiveError, FetchRequest};
use crate::application::debouncer::{DebounceState, Debouncer};
use crate::application::events::{ChartEvent, RenderSink};
use crate::application::fallback::LoadOutcome;
use crate::application::merge::{merge, replace};
use crate::application::planner::{FetchPlanner, PlanTarget, PlannerSettings};
use crate::application::statistics::StatisticsTarget;
use crate::application::worker::{FetchCompletion, FetchJob, JobKind, JobOutput};
use crate::domain::buffer::{InsertOutcome, PointBuffer};
use crate::domain::sample::Sample;
use crate::domain::series::{SeriesConfig, SeriesKey, SeriesPath};
use crate::domain::statistics::{SeriesStatistics, Statistics};
use crate::domain::viewport::Viewport;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("series {0:?} is not tracked")]
    UnknownSeries(String),
    #[error("series {0:?} is already tracked")]
    DuplicateSeries(String),
    #[error("{0:?} is not a valid series name")]
    InvalidName(String),
    #[error("viewport must have finite, distinct bounds")]
    InvalidViewport,
    #[error("chart controller has stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub planner: PlannerSettings,
    pub debounce: Duration,
    pub inter_series_delay: Duration,
    pub busy_retry: Duration,
    /// Upper bound on a single backend call.
    pub request_timeout: Duration,
    pub statistics_interval: Option<Duration>,
    pub workers: usize,
    pub fallback_lookback_secs: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            planner: PlannerSettings::default(),
            debounce: Duration::from_millis(500),
            inter_series_delay: Duration::from_millis(50),
            busy_retry: Duration::from_millis(200),
            request_timeout: Duration::from_secs(30),
            statistics_interval: Some(Duration::from_millis(5000)),
            workers: 4,
            fallback_lookback_secs: 3600.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesOptions {
    pub archived: bool,
    pub config: SeriesConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    pub key: SeriesKey,
    pub archived: bool,
    pub archive_enabled: bool,
    pub config: SeriesConfig,
    pub len: usize,
    pub range: Option<(i64, i64)>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub viewport: Viewport,
    pub state: DebounceState,
    pub series: Vec<SeriesSnapshot>,
}

struct SeriesState {
    /// Registration generation; results carrying another id are stale.
    id: u64,
    config: SeriesConfig,
    path: Option<SeriesPath>,
    buffer: PointBuffer,
    archive_enabled: bool,
    last_fetched: Option<Viewport>,
    next_issue: u64,
    next_apply: u64,
    parked: BTreeMap<u64, Result<JobOutput, ArchiveError>>,
}

impl SeriesState {
    fn new(id: u64, config: SeriesConfig, path: Option<SeriesPath>) -> Self {
        Self {
            id,
            config,
            path,
            buffer: PointBuffer::new(),
            archive_enabled: false,
            last_fetched: None,
            next_issue: 0,
            next_apply: 0,
            parked: BTreeMap::new(),
        }
    }

    fn issue(&mut self) -> u64 {
        let seq = self.next_issue;
        self.next_issue += 1;
        seq
    }
}

struct FetchPass {
    id: u64,
    viewport: Viewport,
    remaining: VecDeque<SeriesKey>,
    next_step: Option<Instant>,
    outstanding: usize,
}

/// Owns all series state. Every method runs on the controller task; backend
/// work leaves through [`ChartController::drain_jobs`] and comes back through
/// [`ChartController::on_fetch_completed`].
pub struct ChartController {
    settings: ControllerSettings,
    planner: FetchPlanner,
    debouncer: Debouncer,
    series: BTreeMap<SeriesKey, SeriesState>,
    viewport: Viewport,
    sink: Arc<dyn RenderSink>,
    outbox: Vec<FetchJob>,
    pass: Option<FetchPass>,
    next_series_id: u64,
    next_pass_id: u64,
}

impl ChartController {
    pub fn new(settings: ControllerSettings, viewport: Viewport, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            planner: FetchPlanner::new(settings.planner.clone()),
            debouncer: Debouncer::new(settings.debounce, settings.busy_retry),
            settings,
            series: BTreeMap::new(),
            viewport,
            sink,
            outbox: Vec::new(),
            pass: None,
            next_series_id: 0,
            next_pass_id: 0,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn debounce_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    pub fn sink(&self) -> Arc<dyn RenderSink> {
        self.sink.clone()
    }

    fn emit(&self, event: ChartEvent) {
        self.sink.notify(event);
    }

    fn next_id(&mut self) -> u64 {
        self.next_series_id += 1;
        self.next_series_id
    }

    fn archived_count(&self) -> usize {
        self.series.keys().filter(|k| k.is_archived()).count()
    }

    fn ceiling(&self) -> usize {
        self.settings.planner.max_points_per_dataset
    }

    pub fn add_series(&mut self, name: &str, options: SeriesOptions) -> Result<(), ControllerError> {
        let key = SeriesKey::live(name);
        if key.as_str().trim().is_empty() || key.is_archived() {
            return Err(ControllerError::InvalidName(name.to_string()));
        }
        if self.series.contains_key(&key) {
            return Err(ControllerError::DuplicateSeries(name.to_string()));
        }

        let id = self.next_id();
        let path = SeriesPath::parse(name).ok();
        self.series.insert(key, SeriesState::new(id, options.config, path));
        tracing::info!("Tracking series {}", name);

        if options.archived {
            self.set_archived(name, true)?;
        }
        Ok(())
    }

    /// Stops tracking a signal and its archived view. Results still in flight
    /// for either are dropped when they arrive.
    pub fn remove_series(&mut self, name: &str) -> Result<(), ControllerError> {
        let live = self.series.remove(&SeriesKey::live(name));
        let archived = self.series.remove(&SeriesKey::archived(name));
        if live.is_none() && archived.is_none() {
            return Err(ControllerError::UnknownSeries(name.to_string()));
        }
        tracing::info!("Stopped tracking series {}", name);
        Ok(())
    }

    pub fn set_archived(&mut self, name: &str, enabled: bool) -> Result<(), ControllerError> {
        let live_key = SeriesKey::live(name);
        let archived_key = SeriesKey::archived(name);

        let Some(live) = self.series.get_mut(&live_key) else {
            return Err(ControllerError::UnknownSeries(name.to_string()));
        };
        live.archive_enabled = enabled;
        let config = live.config.clone();

        // any earlier generation and its in-flight results are dropped here
        self.series.remove(&archived_key);

        if !enabled {
            tracing::info!("Archive mode off for {}", name);
            return Ok(());
        }

        let path = match SeriesPath::parse(name) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Could not parse series path {}: {}", name, e);
                None
            }
        };

        let id = self.next_id();
        let mut state = SeriesState::new(id, config, path);
        tracing::info!("Archive mode on for {}", name);

        if let Some(path) = &state.path {
            let request = FetchRequest {
                key: archived_key.clone(),
                path: path.clone(),
                start_ms: self.viewport.start_ms(),
                end_ms: self.viewport.end_ms(),
                target_points: state.config.buffer_size,
                mode: state.config.mode.clone(),
            };
            state.last_fetched = Some(self.viewport);
            let seq = state.issue();
            self.outbox.push(FetchJob {
                series_id: id,
                seq,
                pass: None,
                kind: JobKind::Refresh,
                request,
            });
        }

        self.series.insert(archived_key, state);
        Ok(())
    }

    /// Applies a live reading of a tracked signal to its buffer.
    pub fn push_live_sample(&mut self, name: &str, sample: Sample) -> Result<(), ControllerError> {
        let key = SeriesKey::live(name);
        let Some(state) = self.series.get_mut(&key) else {
            return Err(ControllerError::UnknownSeries(name.to_string()));
        };
        if !sample.value.is_finite() {
            tracing::debug!("Dropping non-finite reading for {} at {}", key, sample.time_ms);
            return Ok(());
        }

        let outcome = state.buffer.insert(sample);
        state.buffer.trim(state.config.buffer_size);

        match outcome {
            InsertOutcome::Inserted { was_empty } => {
                if was_empty {
                    self.emit(ChartEvent::EnableAutoRange { key: key.to_string() });
                }
                self.emit(ChartEvent::Redraw { key: key.to_string() });
            }
            InsertOutcome::Replaced => self.emit(ChartEvent::Redraw { key: key.to_string() }),
            InsertOutcome::Unchanged => {}
        }
        Ok(())
    }

    /// User zoom/pan: records the window and (re)starts the debounce timer.
    pub fn viewport_changed(&mut self, viewport: Viewport, now: Instant) {
        self.viewport = viewport;
        self.debouncer.viewport_changed(now);
    }

    /// Programmatic time range; refetches only when archived series exist.
    pub fn set_time_range(&mut self, viewport: Viewport, now: Instant) {
        self.viewport = viewport;
        if self.archived_count() > 0 {
            self.debouncer.viewport_changed(now);
        }
    }

    /// Earliest instant at which [`ChartController::on_tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let step = self.pass.as_ref().and_then(|p| p.next_step);
        match (self.debouncer.deadline(), step) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        if self.debouncer.poll(now) {
            self.start_pass(now);
        }
        self.advance_pass(now);
    }

    fn start_pass(&mut self, now: Instant) {
        let remaining: VecDeque<SeriesKey> = self.series.keys().filter(|k| k.is_archived()).cloned().collect();
        if remaining.is_empty() {
            self.debouncer.pass_finished();
            return;
        }

        self.next_pass_id += 1;
        tracing::debug!(
            "Starting fetch pass {} over {} archived series",
            self.next_pass_id,
            remaining.len()
        );
        self.pass = Some(FetchPass {
            id: self.next_pass_id,
            viewport: self.viewport,
            remaining,
            next_step: Some(now),
            outstanding: 0,
        });
    }

    fn advance_pass(&mut self, now: Instant) {
        let Some(mut pass) = self.pass.take() else {
            return;
        };

        while pass.next_step.is_some_and(|step| step <= now) {
            let Some(key) = pass.remaining.pop_front() else {
                pass.next_step = None;
                break;
            };
            if self.plan_step(&key, &pass.viewport, pass.id) {
                pass.outstanding += 1;
            }
            pass.next_step = if pass.remaining.is_empty() {
                None
            } else {
                Some(now + self.settings.inter_series_delay)
            };
        }

        self.pass = Some(pass);
        self.finish_pass_if_done();
    }

    /// Plans one series of a pass; returns whether a fetch was issued.
    fn plan_step(&mut self, key: &SeriesKey, viewport: &Viewport, pass_id: u64) -> bool {
        let active = self.archived_count();
        let Some(state) = self.series.get_mut(key) else {
            return false;
        };
        let Some(path) = &state.path else {
            tracing::warn!("Could not parse series path for {}, skipping fetch", key);
            return false;
        };

        let target = PlanTarget {
            key,
            path,
            config: &state.config,
            buffer: &state.buffer,
            last_fetched: state.last_fetched.as_ref(),
        };
        let Some(request) = self.planner.plan(target, viewport, active) else {
            return false;
        };

        state.last_fetched = Some(*viewport);
        let seq = state.issue();
        self.outbox.push(FetchJob {
            series_id: state.id,
            seq,
            pass: Some(pass_id),
            kind: JobKind::Merge,
            request,
        });
        true
    }

    fn finish_pass_if_done(&mut self) {
        let done = self
            .pass
            .as_ref()
            .is_some_and(|p| p.remaining.is_empty() && p.outstanding == 0);
        if done {
            if let Some(pass) = self.pass.take() {
                tracing::debug!("Fetch pass {} complete", pass.id);
            }
            self.debouncer.pass_finished();
        }
    }

    /// Jobs planned since the last call, in issue order.
    pub fn drain_jobs(&mut self) -> Vec<FetchJob> {
        std::mem::take(&mut self.outbox)
    }

    pub fn on_fetch_completed(&mut self, completion: FetchCompletion) {
        if let Some(pass_id) = completion.pass {
            if let Some(pass) = self.pass.as_mut().filter(|p| p.id == pass_id) {
                pass.outstanding = pass.outstanding.saturating_sub(1);
            }
            self.finish_pass_if_done();
        }

        let ceiling = self.ceiling();
        let Some(state) = self
            .series
            .get_mut(&completion.key)
            .filter(|s| s.id == completion.series_id)
        else {
            tracing::debug!("Discarding result for untracked series {}", completion.key);
            return;
        };

        state.parked.insert(completion.seq, completion.result);

        let mut events = Vec::new();
        let mut adjusted = None;
        while let Some(result) = state.parked.remove(&state.next_apply) {
            state.next_apply += 1;
            apply_result(&completion.key, state, result, ceiling, &mut events, &mut adjusted);
        }

        if let Some(viewport) = adjusted {
            self.viewport = viewport;
        }
        for event in events {
            self.emit(event);
        }
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        let series = self
            .series
            .iter()
            .map(|(key, state)| SeriesSnapshot {
                key: key.clone(),
                archived: key.is_archived(),
                archive_enabled: state.archive_enabled,
                config: state.config.clone(),
                len: state.buffer.len(),
                range: state.buffer.range(),
                samples: state.buffer.to_vec(),
            })
            .collect();

        ChartSnapshot {
            viewport: self.viewport,
            state: self.debouncer.state(),
            series,
        }
    }

    /// Buffer statistics of every live series holding data.
    pub fn live_statistics(&self) -> Vec<SeriesStatistics> {
        self.series
            .iter()
            .filter(|(key, _)| !key.is_archived())
            .filter_map(|(key, state)| {
                Statistics::from_values(&state.buffer.values()).map(|stats| SeriesStatistics {
                    key: key.to_string(),
                    stats,
                })
            })
            .collect()
    }

    pub fn statistics_targets(&self) -> Vec<StatisticsTarget> {
        self.series
            .iter()
            .filter(|(key, _)| key.is_archived())
            .map(|(key, state)| StatisticsTarget {
                key: key.clone(),
                path: state.path.clone(),
                buffered: Statistics::from_values(&state.buffer.values()),
            })
            .collect()
    }

    pub fn shutdown(&mut self) {
        self.debouncer.cancel();
        self.pass = None;
        self.outbox.clear();
        self.series.clear();
        tracing::info!("Chart controller shut down");
    }
}

fn apply_result(
    key: &SeriesKey,
    state: &mut SeriesState,
    result: Result<JobOutput, ArchiveError>,
    ceiling: usize,
    events: &mut Vec<ChartEvent>,
    adjusted: &mut Option<Viewport>,
) {
    let cap = state.config.buffer_size.min(ceiling);
    let was_empty = state.buffer.is_empty();

    match result {
        Err(e) => {
            tracing::error!("Error fetching archive data for {}: {}", key, e);
            events.push(ChartEvent::FetchFailed {
                key: key.to_string(),
                message: e.to_string(),
            });
        }
        Ok(JobOutput::Fetched(samples)) => {
            tracing::debug!("Retrieved {} archive points for {}", samples.len(), key);
            let outcome = merge(&mut state.buffer, &samples, cap);
            if outcome.added > 0 {
                if was_empty {
                    events.push(ChartEvent::EnableAutoRange { key: key.to_string() });
                }
                events.push(ChartEvent::Redraw { key: key.to_string() });
            }
        }
        Ok(JobOutput::Loaded(LoadOutcome::Data(samples))) => {
            tracing::info!("Retrieved {} archive points for {}", samples.len(), key);
            let outcome = replace(&mut state.buffer, samples, cap, ceiling);
            if let Some(original) = outcome.decimated_from {
                tracing::debug!("Decimated {} points to {} for {}", original, outcome.kept, key);
            }
            if was_empty && !state.buffer.is_empty() {
                events.push(ChartEvent::EnableAutoRange { key: key.to_string() });
            }
            events.push(ChartEvent::Redraw { key: key.to_string() });
        }
        Ok(JobOutput::Loaded(LoadOutcome::Fallback { samples, viewport })) => {
            replace(&mut state.buffer, samples, cap, ceiling);
            state.last_fetched = Some(viewport);
            *adjusted = Some(viewport);
            events.push(ChartEvent::Redraw { key: key.to_string() });
            events.push(ChartEvent::ViewportAdjusted { viewport });
        }
        Ok(JobOutput::Loaded(LoadOutcome::NoData)) => {
            tracing::info!("No archive data for {}", key);
            events.push(ChartEvent::NoData { key: key.to_string() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::testing::RecordingSink;
    use crate::domain::series::PointMode;

    const NAME: &str = "influx://plant/temp";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn controller() -> (ChartController, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let viewport = Viewport::new(1000.0, 2000.0).unwrap();
        let controller = ChartController::new(ControllerSettings::default(), viewport, sink.clone());
        (controller, sink)
    }

    fn archived_options() -> SeriesOptions {
        SeriesOptions {
            archived: true,
            config: SeriesConfig::default(),
        }
    }

    fn complete(job: &FetchJob, result: Result<JobOutput, ArchiveError>) -> FetchCompletion {
        FetchCompletion {
            series_id: job.series_id,
            seq: job.seq,
            pass: job.pass,
            key: job.request.key.clone(),
            result,
        }
    }

    fn fetched(points: &[(i64, f64)]) -> Result<JobOutput, ArchiveError> {
        Ok(JobOutput::Fetched(points.iter().map(|&(t, v)| Sample::new(t, v)).collect()))
    }

    fn archived_samples(controller: &ChartController) -> Vec<Sample> {
        controller
            .snapshot()
            .series
            .into_iter()
            .find(|s| s.archived)
            .map(|s| s.samples)
            .unwrap_or_default()
    }

    #[test]
    fn test_live_samples_respect_cap() {
        let (mut controller, sink) = controller();
        controller
            .add_series(
                "pv:temp",
                SeriesOptions {
                    archived: false,
                    config: SeriesConfig {
                        buffer_size: 5,
                        mode: PointMode::Optimized,
                    },
                },
            )
            .unwrap();

        for (t, v) in [1, 2, 3, 4, 5, 6, 7].into_iter().zip([10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]) {
            controller.push_live_sample("pv:temp", Sample::new(t, v)).unwrap();
        }

        let snapshot = controller.snapshot();
        let expected: Vec<Sample> = [(3, 30.0), (4, 40.0), (5, 50.0), (6, 60.0), (7, 70.0)]
            .into_iter()
            .map(|(t, v)| Sample::new(t, v))
            .collect();
        assert_eq!(snapshot.series[0].samples, expected);

        let events = sink.take();
        assert_eq!(
            events[0],
            ChartEvent::EnableAutoRange {
                key: "pv:temp".to_string()
            }
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ChartEvent::EnableAutoRange { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_non_finite_live_values_are_dropped() {
        let (mut controller, sink) = controller();
        controller.add_series("pv", SeriesOptions::default()).unwrap();
        controller.push_live_sample("pv", Sample::new(1, 1.0)).unwrap();
        sink.take();

        assert_eq!(controller.push_live_sample("pv", Sample::new(2, f64::NAN)), Ok(()));
        assert_eq!(controller.push_live_sample("pv", Sample::new(3, f64::INFINITY)), Ok(()));
        assert_eq!(controller.push_live_sample("pv", Sample::new(1, f64::NEG_INFINITY)), Ok(()));

        assert_eq!(controller.snapshot().series[0].samples, vec![Sample::new(1, 1.0)]);
        assert_eq!(controller.live_statistics()[0].stats.mean, 1.0);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let (mut controller, _) = controller();
        for name in ["", "  ", "/", "archived/influx://plant/temp"] {
            assert_eq!(
                controller.add_series(name, SeriesOptions::default()),
                Err(ControllerError::InvalidName(name.to_string()))
            );
        }
        assert!(controller.snapshot().series.is_empty());
    }

    #[test]
    fn test_trailing_slash_does_not_split_a_signal() {
        let (mut controller, _) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        assert_eq!(
            controller.add_series(&format!("{}/", NAME), SeriesOptions::default()),
            Err(ControllerError::DuplicateSeries(format!("{}/", NAME)))
        );

        controller.remove_series(&format!("{}/", NAME)).unwrap();
        assert!(controller.snapshot().series.is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_series() {
        let (mut controller, _) = controller();
        controller.add_series("a", SeriesOptions::default()).unwrap();
        assert_eq!(
            controller.add_series("a", SeriesOptions::default()),
            Err(ControllerError::DuplicateSeries("a".to_string()))
        );
        assert_eq!(
            controller.remove_series("b"),
            Err(ControllerError::UnknownSeries("b".to_string()))
        );
        assert_eq!(
            controller.push_live_sample("b", Sample::new(1, 1.0)),
            Err(ControllerError::UnknownSeries("b".to_string()))
        );
    }

    #[test]
    fn test_archive_toggle_issues_initial_load() {
        let (mut controller, sink) = controller();
        controller.add_series(NAME, archived_options()).unwrap();

        let jobs = controller.drain_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Refresh);
        assert_eq!(jobs[0].request.key, SeriesKey::archived(NAME));
        assert_eq!((jobs[0].request.start_ms, jobs[0].request.end_ms), (1_000_000, 2_000_000));
        assert_eq!(jobs[0].request.target_points, 5000);

        let samples = vec![Sample::new(1_100_000, 1.0), Sample::new(1_200_000, 2.0)];
        controller.on_fetch_completed(complete(&jobs[0], Ok(JobOutput::Loaded(LoadOutcome::Data(samples.clone())))));

        assert_eq!(archived_samples(&controller), samples);
        let key = SeriesKey::archived(NAME).to_string();
        assert_eq!(
            sink.take(),
            vec![ChartEvent::EnableAutoRange { key: key.clone() }, ChartEvent::Redraw { key }]
        );
    }

    #[test]
    fn test_fallback_moves_viewport() {
        let (mut controller, sink) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let jobs = controller.drain_jobs();

        let viewport = Viewport::bracketing(-2_650_000, 950_000, 0.05).unwrap();
        let outcome = LoadOutcome::Fallback {
            samples: vec![Sample::new(-2_650_000, 4.0), Sample::new(950_000, 5.0)],
            viewport,
        };
        controller.on_fetch_completed(complete(&jobs[0], Ok(JobOutput::Loaded(outcome))));

        assert_eq!(controller.viewport(), viewport);
        assert!(sink.take().contains(&ChartEvent::ViewportAdjusted { viewport }));
    }

    #[test]
    fn test_no_data_is_reported() {
        let (mut controller, sink) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let jobs = controller.drain_jobs();
        controller.on_fetch_completed(complete(&jobs[0], Ok(JobOutput::Loaded(LoadOutcome::NoData))));

        assert_eq!(
            sink.take(),
            vec![ChartEvent::NoData {
                key: SeriesKey::archived(NAME).to_string()
            }]
        );
    }

    #[test]
    fn test_removed_series_result_is_discarded() {
        let (mut controller, sink) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let jobs = controller.drain_jobs();

        controller.remove_series(NAME).unwrap();
        controller.on_fetch_completed(complete(&jobs[0], fetched(&[(1_500_000, 1.0)])));

        assert!(controller.snapshot().series.is_empty());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_retoggle_discards_previous_generation() {
        let (mut controller, _) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let stale = controller.drain_jobs();

        controller.set_archived(NAME, false).unwrap();
        controller.set_archived(NAME, true).unwrap();
        let fresh = controller.drain_jobs();

        controller.on_fetch_completed(complete(
            &stale[0],
            Ok(JobOutput::Loaded(LoadOutcome::Data(vec![Sample::new(1, 1.0)]))),
        ));
        assert!(archived_samples(&controller).is_empty());

        controller.on_fetch_completed(complete(
            &fresh[0],
            Ok(JobOutput::Loaded(LoadOutcome::Data(vec![Sample::new(2, 2.0)]))),
        ));
        assert_eq!(archived_samples(&controller), vec![Sample::new(2, 2.0)]);
    }

    #[test]
    fn test_debounced_pass_plans_each_archived_series_in_turn() {
        let (mut controller, _) = controller();
        controller.add_series("influx://plant/a", archived_options()).unwrap();
        controller.add_series("influx://plant/b", archived_options()).unwrap();
        controller.drain_jobs();

        let t0 = Instant::now();
        let far = Viewport::new(5000.0, 9000.0).unwrap();
        for at in [0, 100, 200, 300] {
            controller.viewport_changed(far, t0 + ms(at));
        }

        controller.on_tick(t0 + ms(700));
        assert!(controller.drain_jobs().is_empty());
        assert_eq!(controller.next_deadline(), Some(t0 + ms(800)));

        controller.on_tick(t0 + ms(800));
        let first = controller.drain_jobs();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, JobKind::Merge);
        assert_eq!(first[0].request.key, SeriesKey::archived("influx://plant/a"));
        assert_eq!(controller.debounce_state(), DebounceState::Fetching);
        assert_eq!(controller.next_deadline(), Some(t0 + ms(850)));

        controller.on_tick(t0 + ms(850));
        let second = controller.drain_jobs();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].request.key, SeriesKey::archived("influx://plant/b"));

        controller.on_fetch_completed(complete(&first[0], fetched(&[(5_500_000, 1.0)])));
        assert_eq!(controller.debounce_state(), DebounceState::Fetching);
        controller.on_fetch_completed(complete(
            &second[0],
            Err(ArchiveError::Query("unreachable".to_string())),
        ));
        assert_eq!(controller.debounce_state(), DebounceState::Idle);
    }

    #[test]
    fn test_failure_leaves_buffer_and_reports() {
        let (mut controller, sink) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let jobs = controller.drain_jobs();
        controller.on_fetch_completed(complete(&jobs[0], fetched(&[(1_500_000, 1.0)])));
        sink.take();

        let t0 = Instant::now();
        controller.viewport_changed(Viewport::new(8000.0, 9000.0).unwrap(), t0);
        controller.on_tick(t0 + ms(500));
        let jobs = controller.drain_jobs();
        controller.on_fetch_completed(complete(&jobs[0], Err(ArchiveError::Query("down".to_string()))));

        assert_eq!(archived_samples(&controller), vec![Sample::new(1_500_000, 1.0)]);
        assert!(matches!(&sink.take()[..], [ChartEvent::FetchFailed { .. }]));
    }

    #[test]
    fn test_results_apply_in_issue_order() {
        let (mut controller, _) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        let load = controller.drain_jobs();

        let t0 = Instant::now();
        controller.viewport_changed(Viewport::new(8000.0, 9000.0).unwrap(), t0);
        controller.on_tick(t0 + ms(500));
        let zoom = controller.drain_jobs();

        // zoom result lands before the initial load it was issued after
        controller.on_fetch_completed(complete(&zoom[0], fetched(&[(8_500_000, 9.0)])));
        assert!(archived_samples(&controller).is_empty());

        controller.on_fetch_completed(complete(
            &load[0],
            Ok(JobOutput::Loaded(LoadOutcome::Data(vec![Sample::new(1_500_000, 1.0)]))),
        ));
        assert_eq!(
            archived_samples(&controller),
            vec![Sample::new(1_500_000, 1.0), Sample::new(8_500_000, 9.0)]
        );
    }

    #[test]
    fn test_malformed_path_is_skipped() {
        let (mut controller, _) = controller();
        controller.add_series("not-a-path", archived_options()).unwrap();
        assert!(controller.drain_jobs().is_empty());

        let t0 = Instant::now();
        controller.viewport_changed(Viewport::new(8000.0, 9000.0).unwrap(), t0);
        controller.on_tick(t0 + ms(500));
        assert!(controller.drain_jobs().is_empty());
        assert_eq!(controller.debounce_state(), DebounceState::Idle);
    }

    #[test]
    fn test_busy_pass_defers_next_one() {
        let (mut controller, _) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        controller.drain_jobs();

        let t0 = Instant::now();
        controller.viewport_changed(Viewport::new(8000.0, 9000.0).unwrap(), t0);
        controller.on_tick(t0 + ms(500));
        let running = controller.drain_jobs();
        assert_eq!(running.len(), 1);

        controller.viewport_changed(Viewport::new(20_000.0, 30_000.0).unwrap(), t0 + ms(600));
        controller.on_tick(t0 + ms(1100));
        assert!(controller.drain_jobs().is_empty());
        assert_eq!(controller.next_deadline(), Some(t0 + ms(1300)));

        controller.on_fetch_completed(complete(&running[0], fetched(&[])));
        controller.on_tick(t0 + ms(1300));
        assert_eq!(controller.drain_jobs().len(), 1);
    }

    #[test]
    fn test_statistics_split_live_and_archived() {
        let (mut controller, _) = controller();
        controller.add_series(NAME, archived_options()).unwrap();
        controller.push_live_sample(NAME, Sample::new(1, 2.0)).unwrap();
        controller.push_live_sample(NAME, Sample::new(2, 4.0)).unwrap();

        let live = controller.live_statistics();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, NAME);
        assert_eq!(live[0].stats.mean, 3.0);

        let targets = controller.statistics_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].key, SeriesKey::archived(NAME));
        assert!(targets[0].buffered.is_none());
    }

    #[test]
    fn test_set_time_range_without_archived_series_does_not_schedule() {
        let (mut controller, _) = controller();
        controller.add_series("pv:live", SeriesOptions::default()).unwrap();
        let t0 = Instant::now();
        controller.set_time_range(Viewport::new(10.0, 20.0).unwrap(), t0);

        assert_eq!(controller.viewport(), Viewport::new(10.0, 20.0).unwrap());
        assert_eq!(controller.next_deadline(), None);
    }
}
