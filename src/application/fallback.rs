// Fallback policy - what an initial load does when the window is empty
use crate::application::archive_backend::{ArchiveBackend, ArchiveError, FetchRequest};
use crate::domain::sample::{Sample, time_bounds};
use crate::domain::viewport::Viewport;

/// Margin added on each side of fallback data when the viewport is moved onto it.
pub const FALLBACK_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The requested window had data.
    Data(Vec<Sample>),
    /// The window was empty; these samples come from the lookback window
    /// before the series' last point, and `viewport` brackets them.
    Fallback { samples: Vec<Sample>, viewport: Viewport },
    /// Neither the window nor the fallback produced anything.
    NoData,
}

/// Fetches `request`; on an empty result looks up the series' last point and
/// fetches the `lookback_secs` window ending there. Only a failure of the
/// primary fetch is an error; fallback failures end in [`LoadOutcome::NoData`].
pub async fn load_with_fallback(
    backend: &dyn ArchiveBackend,
    request: &FetchRequest,
    lookback_secs: f64,
) -> Result<LoadOutcome, ArchiveError> {
    let samples = backend.fetch_range(request).await?;
    if !samples.is_empty() {
        return Ok(LoadOutcome::Data(samples));
    }

    tracing::warn!("No archive data for {} in window, trying fallback", request.key);

    let last = match backend.fetch_last_point(&request.path).await {
        Ok(Some(last)) => last,
        Ok(None) => return Ok(LoadOutcome::NoData),
        Err(e) => {
            tracing::warn!("Error fetching last point for {}: {}", request.path, e);
            return Ok(LoadOutcome::NoData);
        }
    };

    let Some(window) = Viewport::ending_at(last.time_ms, lookback_secs) else {
        return Ok(LoadOutcome::NoData);
    };
    let fallback_request = request.with_window(window.start_ms(), last.time_ms);

    let samples = match backend.fetch_range(&fallback_request).await {
        Ok(samples) => samples,
        Err(e) => {
            tracing::warn!("Error fetching fallback data for {}: {}", request.path, e);
            return Ok(LoadOutcome::NoData);
        }
    };

    let viewport = time_bounds(&samples)
        .and_then(|(min, max)| Viewport::bracketing(min, max, FALLBACK_MARGIN));

    match viewport {
        Some(viewport) => {
            tracing::info!("Fallback retrieved {} points for {}", samples.len(), request.key);
            Ok(LoadOutcome::Fallback { samples, viewport })
        }
        None => Ok(LoadOutcome::NoData),
    }
}
