// Fetch planner - how many points to request, and whether to request at all
use crate::application::archive_backend::FetchRequest;
use crate::domain::buffer::PointBuffer;
use crate::domain::series::{SeriesConfig, SeriesKey, SeriesPath};
use crate::domain::viewport::Viewport;

const MINUTE_SECS: i64 = 60;
const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 604_800;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    /// Hard per-series ceiling, also the raw-mode request ceiling.
    pub max_points_per_dataset: usize,
    /// Budget shared by all archived series.
    pub max_total_points: usize,
    pub min_points_per_series: usize,
    /// Skip when the buffer already spans more than this fraction of the window.
    pub coverage_threshold: f64,
    /// Windows within `duration / similarity_divisor` of the last fetch are skipped.
    pub similarity_divisor: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_points_per_dataset: 100_000,
            max_total_points: 500_000,
            min_points_per_series: 200,
            coverage_threshold: 0.9,
            similarity_divisor: 20.0,
        }
    }
}

/// Everything the planner needs to know about one archived series.
#[derive(Debug, Clone, Copy)]
pub struct PlanTarget<'a> {
    pub key: &'a SeriesKey,
    pub path: &'a SeriesPath,
    pub config: &'a SeriesConfig,
    pub buffer: &'a PointBuffer,
    pub last_fetched: Option<&'a Viewport>,
}

#[derive(Debug, Clone)]
pub struct FetchPlanner {
    settings: PlannerSettings,
}

impl FetchPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Point density for a window of the given length, before the shared budget.
    fn density_for(duration_secs: i64) -> usize {
        let secs = duration_secs.max(0) as usize;
        match duration_secs {
            d if d < MINUTE_SECS => (secs * 10).min(10_000),
            d if d < HOUR_SECS => secs.min(5_000),
            d if d < DAY_SECS => 3_000,
            d if d < WEEK_SECS => 1_500,
            _ => 1_000,
        }
    }

    /// Number of points to request for `config` over `viewport`, given how many
    /// archived series currently share the global budget.
    pub fn target_points(&self, config: &SeriesConfig, viewport: &Viewport, active_archived: usize) -> usize {
        let base = if config.mode.is_raw() {
            config
                .buffer_size
                .saturating_mul(3)
                .min(self.settings.max_points_per_dataset)
        } else {
            Self::density_for(viewport.duration() as i64)
        };

        let share = self.settings.max_total_points / active_archived.max(1);
        base.min(share).max(self.settings.min_points_per_series)
    }

    /// Returns the request to issue for `target`, or `None` when the buffer
    /// already covers the window or the window barely moved since the last fetch.
    pub fn plan(&self, target: PlanTarget<'_>, viewport: &Viewport, active_archived: usize) -> Option<FetchRequest> {
        if let Some((first, last)) = target.buffer.range() {
            let coverage = viewport.coverage(first, last);
            if coverage > self.settings.coverage_threshold {
                tracing::debug!(
                    "Skipping fetch for {}: buffer covers {:.0}% of the window",
                    target.key,
                    coverage * 100.0
                );
                return None;
            }
        }

        if let Some(previous) = target.last_fetched {
            if viewport.is_similar_to(previous, self.settings.similarity_divisor) {
                tracing::debug!("Skipping fetch for {}: window similar to last fetch", target.key);
                return None;
            }
        }

        Some(FetchRequest {
            key: target.key.clone(),
            path: target.path.clone(),
            start_ms: viewport.start_ms(),
            end_ms: viewport.end_ms(),
            target_points: self.target_points(target.config, viewport, active_archived),
            mode: target.config.mode.clone(),
        })
    }
}

impl Default for FetchPlanner {
    fn default() -> Self {
        Self::new(PlannerSettings::default())
    }
}
