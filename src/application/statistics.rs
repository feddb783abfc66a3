// Statistics gathering - archive aggregates with buffer fallback
use crate::application::archive_backend::ArchiveBackend;
use crate::domain::series::{SeriesKey, SeriesPath};
use crate::domain::statistics::{SeriesStatistics, Statistics};

/// One archived series to summarise over the current window.
#[derive(Debug, Clone)]
pub struct StatisticsTarget {
    pub key: SeriesKey,
    pub path: Option<SeriesPath>,
    /// Statistics of the local buffer, used when the archive has none.
    pub buffered: Option<Statistics>,
}

/// Asks the archive for each target's statistics. Failures and empty answers
/// are logged and fall back to the buffered statistics; a series with neither
/// is left out.
pub async fn gather(
    backend: &dyn ArchiveBackend,
    targets: Vec<StatisticsTarget>,
    start_ms: i64,
    end_ms: i64,
) -> Vec<SeriesStatistics> {
    let mut entries = Vec::with_capacity(targets.len());

    for target in targets {
        let archived = match &target.path {
            Some(path) => match backend.fetch_statistics(path, start_ms, end_ms).await {
                Ok(Some(stats)) if stats.count > 0 => Some(stats),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Error calculating statistics for {}: {}", target.key, e);
                    None
                }
            },
            None => None,
        };

        if let Some(stats) = archived.or(target.buffered) {
            entries.push(SeriesStatistics {
                key: target.key.to_string(),
                stats,
            });
        }
    }

    entries
}
