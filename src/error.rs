//! Error taxonomy for the ingestion path.
//!
//! Errors here never cross into the aggregation path: the aggregator always
//! receives a well-formed (possibly stale) record slice. Fetch and
//! subscription failures are absorbed by the mirror, malformed rows are
//! skipped one at a time, and only configuration problems fail startup.

use thiserror::Error;

/// The remote store could not be fetched or returned something unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("store response was not valid JSON: {0}")]
    Body(#[from] serde_json::Error),
}

/// The change-feed subscription could not be opened.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("change feed connect failed: {0}")]
    Connect(#[source] FetchError),
}

/// One observation row failed field or timestamp parsing.
///
/// Always scoped to a single record; the rest of the fetch survives.
#[derive(Debug, Error)]
pub enum MalformedRecordError {
    #[error("missing or invalid field `{0}`")]
    Field(&'static str),

    #[error("unparseable timestamp `{0}`")]
    Timestamp(String),
}

/// Startup configuration is missing or invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("{name} is not a valid URL: `{value}`")]
    InvalidUrl {
        name: &'static str,
        value: String,
    },

    #[error("{name} is not a valid integer: `{value}`")]
    InvalidNumber {
        name: &'static str,
        value: String,
    },
}
