// InfluxDB archive backend over the InfluxQL /query endpoint
use crate::application::archive_backend::{ArchiveBackend, ArchiveError, FetchRequest};
use crate::domain::sample::Sample;
use crate::domain::series::{PointMode, SeriesPath};
use crate::domain::statistics::Statistics;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Field queried when a series path does not name one.
const DEFAULT_FIELD: &str = "value";

#[derive(Debug, Clone)]
pub struct InfluxArchive {
    client: reqwest::Client,
    host: String,
    token: String,
    retention_policy: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    #[serde(default)]
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxQLSeries {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl InfluxArchive {
    pub fn new(host: String, token: String, retention_policy: String, timeout: Duration) -> Result<Self, ArchiveError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            token,
            retention_policy,
        })
    }

    fn build_query_url(&self, bucket: &str, query: &str) -> String {
        format!(
            "{}/query?db={}&rp={}&epoch=ms&q={}",
            self.host,
            urlencoding::encode(bucket),
            urlencoding::encode(&self.retention_policy),
            urlencoding::encode(query)
        )
    }

    async fn execute_query(&self, bucket: &str, query: &str) -> Result<InfluxQLResponse, ArchiveError> {
        tracing::debug!("Executing archive query on {}: {}", bucket, query);
        let url = self.build_query_url(bucket, query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ArchiveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

#[async_trait]
impl ArchiveBackend for InfluxArchive {
    async fn fetch_range(&self, request: &FetchRequest) -> Result<Vec<Sample>, ArchiveError> {
        let query = range_query(request)?;
        let response = self.execute_query(&request.path.bucket, &query).await?;
        let samples = samples_from(&response)?;
        tracing::debug!("Archive returned {} points for {}", samples.len(), request.path);
        Ok(samples)
    }

    async fn fetch_last_point(&self, path: &SeriesPath) -> Result<Option<Sample>, ArchiveError> {
        let response = self.execute_query(&path.bucket, &last_point_query(path)).await?;
        Ok(samples_from(&response)?.pop())
    }

    async fn fetch_statistics(
        &self,
        path: &SeriesPath,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<Statistics>, ArchiveError> {
        let query = statistics_query(path, start_ms, end_ms)?;
        let response = self.execute_query(&path.bucket, &query).await?;
        statistics_from(&response)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

fn field_of(path: &SeriesPath) -> String {
    quote_ident(path.field.as_deref().unwrap_or(DEFAULT_FIELD))
}

fn rfc3339(time_ms: i64) -> Result<String, ArchiveError> {
    DateTime::<Utc>::from_timestamp_millis(time_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| ArchiveError::Query(format!("timestamp {} out of range", time_ms)))
}

fn time_clause(start_ms: i64, end_ms: i64) -> Result<String, ArchiveError> {
    Ok(format!(
        "time >= '{}' AND time <= '{}'",
        rfc3339(start_ms)?,
        rfc3339(end_ms)?
    ))
}

/// Accepts InfluxQL durations such as `10s`, `500ms` or `1h`.
fn is_duration_literal(window: &str) -> bool {
    let split = window.find(|c: char| !c.is_ascii_digit()).unwrap_or(window.len());
    let (digits, unit) = window.split_at(split);
    !digits.is_empty() && matches!(unit, "ns" | "u" | "µ" | "ms" | "s" | "m" | "h" | "d" | "w")
}

fn range_query(request: &FetchRequest) -> Result<String, ArchiveError> {
    let path = &request.path;
    let field = field_of(path);
    let measurement = quote_ident(&path.measurement);
    let window = time_clause(request.start_ms, request.end_ms)?;

    let query = match &request.mode {
        PointMode::Optimized => {
            let span = (request.end_ms - request.start_ms).max(1);
            let interval_ms = (span / request.target_points.max(1) as i64).max(1);
            format!(
                "SELECT mean({field}) AS \"value\" FROM {measurement} WHERE {window} GROUP BY time({interval_ms}ms) fill(none)"
            )
        }
        PointMode::Raw { mean_window: Some(mean) } => {
            if !is_duration_literal(mean) {
                return Err(ArchiveError::Query(format!("invalid mean window {:?}", mean)));
            }
            format!(
                "SELECT mean({field}) AS \"value\" FROM {measurement} WHERE {window} GROUP BY time({mean}) fill(none) LIMIT {}",
                request.target_points
            )
        }
        PointMode::Raw { mean_window: None } => format!(
            "SELECT {field} AS \"value\" FROM {measurement} WHERE {window} ORDER BY time ASC LIMIT {}",
            request.target_points
        ),
    };
    Ok(query)
}

fn last_point_query(path: &SeriesPath) -> String {
    format!(
        "SELECT last({}) AS \"value\" FROM {}",
        field_of(path),
        quote_ident(&path.measurement)
    )
}

fn statistics_query(path: &SeriesPath, start_ms: i64, end_ms: i64) -> Result<String, ArchiveError> {
    let field = field_of(path);
    let measurement = quote_ident(&path.measurement);
    let window = time_clause(start_ms, end_ms)?;
    Ok(format!(
        "SELECT count({field}) AS \"count\", mean({field}) AS \"mean\", median({field}) AS \"median\", \
         stddev({field}) AS \"stddev\", min({field}) AS \"min\", max({field}) AS \"max\", \
         sum({field}) AS \"sum\" FROM {measurement} WHERE {window}"
    ))
}

fn parse_response(body: &str) -> Result<InfluxQLResponse, ArchiveError> {
    let data: InfluxQLResponse = serde_json::from_str(body).map_err(|e| ArchiveError::Decode(e.to_string()))?;

    if let Some(error) = data.results.iter().find_map(|r| r.error.as_ref()) {
        return Err(ArchiveError::Query(error.clone()));
    }
    Ok(data)
}

fn parse_time(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.timestamp_millis()),
        _ => None,
    }
}

fn series_of(response: &InfluxQLResponse) -> impl Iterator<Item = &InfluxQLSeries> {
    response
        .results
        .iter()
        .filter_map(|r| r.series.as_ref())
        .flatten()
}

fn samples_from(response: &InfluxQLResponse) -> Result<Vec<Sample>, ArchiveError> {
    let mut samples = Vec::new();

    for series in series_of(response) {
        let time_idx = series
            .column("time")
            .ok_or_else(|| ArchiveError::Decode("missing time column".to_string()))?;
        let value_idx = series.column("value").unwrap_or(1);

        for row in &series.values {
            let time = row.get(time_idx).and_then(parse_time);
            let value = row.get(value_idx).and_then(|v| v.as_f64());
            // fill(none) still leaves nulls for non-numeric fields
            if let (Some(time), Some(value)) = (time, value) {
                samples.push(Sample::new(time, value));
            }
        }
    }

    Ok(samples)
}

fn statistics_from(response: &InfluxQLResponse) -> Result<Option<Statistics>, ArchiveError> {
    let Some(series) = series_of(response).next() else {
        return Ok(None);
    };
    let Some(row) = series.values.first() else {
        return Ok(None);
    };

    let named: HashMap<&str, f64> = series
        .columns
        .iter()
        .zip(row)
        .filter_map(|(column, value)| value.as_f64().map(|v| (column.as_str(), v)))
        .collect();
    let get = |name: &str| named.get(name).copied().unwrap_or(0.0);

    let count = get("count") as u64;
    if count == 0 {
        return Ok(None);
    }

    Ok(Some(Statistics {
        count,
        mean: get("mean"),
        median: get("median"),
        stddev: get("stddev"),
        min: get("min"),
        max: get("max"),
        sum: get("sum"),
    }))
}
