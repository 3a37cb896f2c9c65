use crate::exposition::ParseError;

/// Errors raised while pulling a payload from the metrics endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to fetch metrics from `{url}`: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("metrics endpoint `{url}` responded with non-OK status: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read response body from `{url}`: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised while writing an export batch.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to encode sample record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write export batch: {0}")]
    Write(#[from] std::io::Error),
}

/// Failure of a single scrape cycle. Never fatal to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to process scraped body: {0}")]
    Process(#[from] ParseError),
    #[error("system clock is before the UNIX epoch: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}
