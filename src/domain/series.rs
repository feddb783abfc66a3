// Series identity and configuration
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const ARCHIVED_PREFIX: &str = "archived/";
pub const DEFAULT_BUFFER_SIZE: usize = 5000;

/// Registry key of a tracked series: either the live signal name or the
/// synthetic `archived/<name>` key of its historical view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Trailing `/` is dropped so `a` and `a/` name the same signal.
    pub fn live(name: &str) -> Self {
        Self(name.trim_end_matches('/').to_string())
    }

    pub fn archived(name: &str) -> Self {
        Self(format!("{}{}", ARCHIVED_PREFIX, name.trim_end_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_archived(&self) -> bool {
        self.0.starts_with(ARCHIVED_PREFIX)
    }

    /// Name of the signal this key belongs to, without the archived prefix.
    pub fn signal_name(&self) -> &str {
        self.0.strip_prefix(ARCHIVED_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How archived points are requested from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PointMode {
    /// Server-side decimated to the planner's target density.
    #[default]
    Optimized,
    /// Every stored sample, optionally averaged over a fixed window such as `10s`.
    Raw { mean_window: Option<String> },
}

impl PointMode {
    pub fn is_raw(&self) -> bool {
        matches!(self, PointMode::Raw { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub buffer_size: usize,
    #[serde(flatten)]
    pub mode: PointMode,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            mode: PointMode::Optimized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedPath {
    #[error("empty series path")]
    Empty,
    #[error("series path {0:?} is missing a bucket")]
    MissingBucket(String),
    #[error("series path {0:?} has too many segments")]
    TooManySegments(String),
    #[error("series path {0:?} has an empty segment")]
    EmptySegment(String),
}

/// Archive location of a signal: `influx://bucket/measurement[/field]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesPath {
    pub bucket: String,
    pub measurement: String,
    pub field: Option<String>,
}

impl SeriesPath {
    pub fn parse(name: &str) -> Result<Self, MalformedPath> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(MalformedPath::Empty);
        }

        let clean = trimmed
            .strip_prefix("influx://")
            .or_else(|| trimmed.strip_prefix("influx2://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let parts: Vec<&str> = clean.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) && parts.len() > 1 {
            return Err(MalformedPath::EmptySegment(name.to_string()));
        }

        match parts.as_slice() {
            [bucket, measurement] => Ok(Self {
                bucket: bucket.to_string(),
                measurement: measurement.to_string(),
                field: None,
            }),
            [bucket, measurement, field] => Ok(Self {
                bucket: bucket.to_string(),
                measurement: measurement.to_string(),
                // "null" is what the chart layout files write for "no field"
                field: (*field != "null").then(|| field.to_string()),
            }),
            [_] => Err(MalformedPath::MissingBucket(name.to_string())),
            _ => Err(MalformedPath::TooManySegments(name.to_string())),
        }
    }
}

impl fmt::Display for SeriesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}/{}/{}", self.bucket, self.measurement, field),
            None => write!(f, "{}/{}", self.bucket, self.measurement),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archived_key() {
        let key = SeriesKey::archived("influx://plant/temp/");
        assert_eq!(key.as_str(), "archived/influx://plant/temp");
        assert!(key.is_archived());
        assert_eq!(key.signal_name(), "influx://plant/temp");
        assert!(!SeriesKey::live("influx://plant/temp").is_archived());
    }

    #[test]
    fn test_trailing_slash_names_same_signal() {
        assert_eq!(SeriesKey::live("a/"), SeriesKey::live("a"));
        assert_eq!(SeriesKey::archived("a/"), SeriesKey::archived("a"));
        assert_eq!(SeriesKey::live("a/").as_str(), "a");
    }

    #[test]
    fn test_parse_bucket_and_measurement() {
        let path = SeriesPath::parse("influx://plant/temperature").unwrap();
        assert_eq!(path.bucket, "plant");
        assert_eq!(path.measurement, "temperature");
        assert_eq!(path.field, None);

        let path = SeriesPath::parse("influx2://plant/temperature/value/").unwrap();
        assert_eq!(path.field.as_deref(), Some("value"));
        assert_eq!(path.to_string(), "plant/temperature/value");
    }

    #[test]
    fn test_parse_null_field() {
        let path = SeriesPath::parse("influx://plant/temperature/null").unwrap();
        assert_eq!(path.field, None);
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(SeriesPath::parse("  "), Err(MalformedPath::Empty));
        assert!(matches!(
            SeriesPath::parse("influx://temperature"),
            Err(MalformedPath::MissingBucket(_))
        ));
        assert!(matches!(
            SeriesPath::parse("influx://a/b/c/d"),
            Err(MalformedPath::TooManySegments(_))
        ));
        assert!(matches!(
            SeriesPath::parse("influx://a//c"),
            Err(MalformedPath::EmptySegment(_))
        ));
    }

    #[test]
    fn test_config_mode_serde() {
        let config: SeriesConfig =
            serde_json::from_str(r#"{"buffer_size": 10, "mode": "raw", "mean_window": "10s"}"#)
                .unwrap();
        assert_eq!(
            config.mode,
            PointMode::Raw {
                mean_window: Some("10s".to_string())
            }
        );
    }
}
