use crate::application::controller::ControllerSettings;
use crate::application::planner::PlannerSettings;
use crate::domain::series::DEFAULT_BUFFER_SIZE;
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config/archive-viewport";
const ENV_PREFIX: &str = "ARCHIVE_VIEWPORT";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub influx: InfluxSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub retention_policy: String,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost:8086".to_string(),
            token: String::new(),
            retention_policy: "autogen".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferSettings {
    pub default_size: usize,
    pub max_points_per_dataset: usize,
    pub max_total_points: usize,
    pub min_points_per_series: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_BUFFER_SIZE,
            max_points_per_dataset: 100_000,
            max_total_points: 500_000,
            min_points_per_series: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingSettings {
    pub debounce_ms: u64,
    pub inter_series_delay_ms: u64,
    pub busy_retry_ms: u64,
    /// 0 turns periodic statistics off.
    pub statistics_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            inter_series_delay_ms: 50,
            busy_retry_ms: 200,
            statistics_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchSettings {
    pub workers: usize,
    pub fallback_lookback_secs: f64,
    pub coverage_threshold: f64,
    pub similarity_divisor: f64,
    pub request_timeout_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            fallback_lookback_secs: 3_600.0,
            coverage_threshold: 0.9,
            similarity_divisor: 20.0,
            request_timeout_ms: 30_000,
        }
    }
}

impl From<&Settings> for ControllerSettings {
    fn from(settings: &Settings) -> Self {
        let timing = &settings.timing;
        Self {
            planner: PlannerSettings {
                max_points_per_dataset: settings.buffer.max_points_per_dataset,
                max_total_points: settings.buffer.max_total_points,
                min_points_per_series: settings.buffer.min_points_per_series,
                coverage_threshold: settings.fetch.coverage_threshold,
                similarity_divisor: settings.fetch.similarity_divisor,
            },
            debounce: Duration::from_millis(timing.debounce_ms),
            inter_series_delay: Duration::from_millis(timing.inter_series_delay_ms),
            busy_retry: Duration::from_millis(timing.busy_retry_ms),
            request_timeout: Duration::from_millis(settings.fetch.request_timeout_ms),
            statistics_interval: (timing.statistics_interval_ms > 0)
                .then(|| Duration::from_millis(timing.statistics_interval_ms)),
            workers: settings.fetch.workers,
            fallback_lookback_secs: settings.fetch.fallback_lookback_secs,
        }
    }
}

/// Defaults, then `config/archive-viewport.*` if present, then
/// `ARCHIVE_VIEWPORT__SECTION__KEY` environment variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_toml(text: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let settings = from_toml("");
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
        assert_eq!(settings.buffer.default_size, 5_000);
        assert_eq!(ControllerSettings::from(&settings), ControllerSettings::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let settings = from_toml(
            r#"
            [influx]
            host = "http://archive:8086"
            token = "secret"

            [timing]
            debounce_ms = 250
            statistics_interval_ms = 0
            "#,
        );
        assert_eq!(settings.influx.host, "http://archive:8086");
        assert_eq!(settings.influx.retention_policy, "autogen");

        let controller = ControllerSettings::from(&settings);
        assert_eq!(controller.debounce, Duration::from_millis(250));
        assert_eq!(controller.inter_series_delay, Duration::from_millis(50));
        assert_eq!(controller.statistics_interval, None);
        assert_eq!(controller.request_timeout, Duration::from_secs(30));
    }
}
