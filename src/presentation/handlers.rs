// HTTP request handlers
use crate::application::controller::{ControllerError, SeriesOptions};
use crate::domain::sample::Sample;
use crate::domain::series::{PointMode, SeriesConfig};
use crate::domain::viewport::Viewport;
use crate::infrastructure::chunked_json::stream_from_broadcast;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct AddSeriesRequest {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub raw: bool,
    pub buffer_size: Option<usize>,
    pub mean_window: Option<String>,
}

impl AddSeriesRequest {
    fn into_options(self, default_buffer_size: usize) -> (String, SeriesOptions) {
        let mode = if self.raw {
            PointMode::Raw {
                mean_window: self.mean_window.filter(|w| !w.trim().is_empty()),
            }
        } else {
            PointMode::Optimized
        };
        let config = SeriesConfig {
            buffer_size: self.buffer_size.unwrap_or(default_buffer_size),
            mode,
        };
        (
            self.name,
            SeriesOptions {
                archived: self.archived,
                config,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchivedRequest {
    pub enabled: bool,
}

/// Window bounds in epoch seconds.
#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    pub start: f64,
    pub end: f64,
}

impl ViewportRequest {
    fn viewport(&self) -> Result<Viewport, ApiError> {
        Viewport::new(self.start, self.end).ok_or(ApiError(ControllerError::InvalidViewport))
    }
}

/// Controller errors mapped onto HTTP statuses.
pub struct ApiError(ControllerError);

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ControllerError::UnknownSeries(_) => StatusCode::NOT_FOUND,
            ControllerError::DuplicateSeries(_) => StatusCode::CONFLICT,
            ControllerError::InvalidName(_) | ControllerError::InvalidViewport => StatusCode::BAD_REQUEST,
            ControllerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/series", get(list_series).post(add_series))
        .route("/series/:name", delete(remove_series))
        .route("/series/:name/archived", put(set_archived))
        .route("/series/:name/samples", post(push_sample))
        .route("/viewport", post(change_viewport))
        .route("/time-range", put(set_time_range))
        .route("/statistics", get(statistics))
        .route("/events", get(stream_events))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_series(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let snapshot = state.controller.snapshot().await?;
    Ok(match json_response(&snapshot, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    })
}

pub async fn add_series(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddSeriesRequest>,
) -> Result<StatusCode, ApiError> {
    let (name, options) = request.into_options(state.default_buffer_size);
    state.controller.add_series(&name, options).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_series(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.controller.remove_series(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_archived(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ArchivedRequest>,
) -> Result<StatusCode, ApiError> {
    state.controller.set_archived(&name, request.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn push_sample(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(sample): Json<Sample>,
) -> Result<StatusCode, ApiError> {
    state.controller.push_live_sample(&name, sample).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_viewport(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewportRequest>,
) -> Result<StatusCode, ApiError> {
    state.controller.viewport_changed(request.viewport()?).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn set_time_range(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewportRequest>,
) -> Result<StatusCode, ApiError> {
    state.controller.set_time_range(request.viewport()?).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn statistics(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let entries = state.controller.statistics().await?;
    Ok(match json_response(&entries, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    })
}

/// Stream render events as length-prefixed chunks
pub async fn stream_events(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    stream_from_broadcast(state.events.subscribe(), accepts_brotli(&headers))
}
