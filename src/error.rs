use std::time::Duration;
use thiserror::Error;

/// Errors raised by the document store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict writing {collection}/{key}")]
    Conflict { collection: String, key: String },

    #[error("document {collection}/{key} already exists")]
    Duplicate { collection: String, key: String },

    #[error("failed to encode or decode document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors raised while enriching a session with external signals.
///
/// Enrichment failures are non-fatal: the orchestrator logs them and
/// substitutes the documented defaults, so the session still scores.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("geocoding lookup failed: {0}")]
    Geocoding(String),

    #[error("geocoding lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("profile read failed during enrichment: {0}")]
    Profile(#[from] StoreError),
}

/// Fatal errors for a single session submission.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to persist session record {session_id}: {source}")]
    Persistence {
        session_id: String,
        source: StoreError,
    },
}
