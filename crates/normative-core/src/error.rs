/// Error types for the suggestion engine.
///
/// `SuggestError` covers the AI path and credential checks. Every variant except
/// `MissingCredential` is absorbed by the strategy coordinator and turned into a keyword
/// fallback, so callers only ever see it from the AI selector directly.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("AI mode requires an API key")]
    MissingCredential,

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("AI service error: status={status} message={message}")]
    NonRetryableService { status: u16, message: String },

    #[error("AI request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("AI response format error: {0}")]
    AiResponseFormat(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SuggestError {
    /// Transport failures and server-class statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SuggestError::TransientNetwork(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid knowledge base JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid entry #{index} in {path}: {reason}")]
    InvalidEntry {
        path: PathBuf,
        index: usize,
        reason: String,
    },

    #[error("duplicate normative id: {0}")]
    DuplicateId(String),
}
