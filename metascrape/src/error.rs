//! Error types for the resolution engine

use thiserror::Error;

/// Source adapter and transport errors
///
/// None of these abort a resolution. The stage runner records them as
/// `SourceFailure`s and keeps the draft from before the failing attempt.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network communication error (connect, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Request exceeded its per-request timeout
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Adapter cannot build a request for this draft
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Adapter task ended abnormally
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for ScrapeError {
    fn from(err: quick_xml::DeError) -> Self {
        ScrapeError::Parse(format!("XML: {}", err))
    }
}

/// Result type for adapter operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;
