//! Retrieval of raw incident records.
//!
//! Sources are tried in preference order. A source that times out is retried;
//! any other failure hands over to the next source.

pub mod file;
pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{CleanerError, Result};
use crate::types::RawRecord;

pub use file::FileSource;
pub use http::{CsvDownloadSource, ODataSource, SocrataSource};

#[async_trait]
pub trait RecordSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<RawRecord>>;
}

fn is_retryable(err: &CleanerError) -> bool {
    matches!(err, CleanerError::FeedTimeout { .. })
}

/// Fetch from the first source that answers. Each source gets up to
/// `max_retries` attempts while it keeps timing out.
#[instrument(skip(sources), fields(sources = sources.len()))]
pub async fn fetch_with_fallback(
    sources: &[Box<dyn RecordSource>],
    max_retries: u32,
    backoff: Duration,
) -> Result<Vec<RawRecord>> {
    let mut last_error = String::from("no sources configured");
    for source in sources {
        for attempt in 1..=max_retries.max(1) {
            match source.fetch().await {
                Ok(records) => {
                    info!(source = source.source_name(), attempt, records = records.len(), "Fetched feed");
                    return Ok(records);
                }
                Err(e) if is_retryable(&e) => {
                    warn!(source = source.source_name(), attempt, "Feed request timed out, retrying");
                    last_error = e.to_string();
                    tokio::time::sleep(backoff * attempt).await;
                }
                Err(e) => {
                    warn!(source = source.source_name(), error = %e, "Feed source failed, trying next");
                    last_error = e.to_string();
                    break;
                }
            }
        }
    }
    Err(CleanerError::FeedExhausted(last_error))
}
