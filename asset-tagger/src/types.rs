use serde::{Deserialize, Serialize};
// Shared definitions live in the interfaces crate
pub use interfaces::defs::{AssetRef, ConfigMap, FetchedPayload, PromptSpec, PropertySet, RenditionCandidate};

/// Property stamped on every property set before it is committed.
pub const STATUS_PROPERTY: &str = "aigen:status";
pub const STATUS_PROCESSED: &str = "processed";

/// Base64 image handed to the vision model.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub base64: String,
    pub media_type: String,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

/// First answer of a vision model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceAnswer {
    /// `None` when the response carried no answer content.
    pub content: Option<String>,
    pub attempts: u32,
}

/// Which metadata write path produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePath {
    AssetsApi,
    ContentNode,
}

impl std::fmt::Display for WritePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePath::AssetsApi => write!(f, "assets-api"),
            WritePath::ContentNode => write!(f, "content-node"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Issued, no response observed yet.
    Pending,
    TransientFailure,
    TerminalSuccess,
    TerminalFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAttempt {
    pub attempt_number: u32,
    pub path: WritePath,
    pub outcome: CommitOutcome,
    pub detail: Option<String>,
}

impl CommitAttempt {
    pub fn pending(attempt_number: u32, path: WritePath) -> Self {
        Self {
            attempt_number,
            path,
            outcome: CommitOutcome::Pending,
            detail: None,
        }
    }

    pub fn resolve(mut self, outcome: CommitOutcome, detail: Option<String>) -> Self {
        self.outcome = outcome;
        self.detail = detail;
        self
    }
}

/// Result of a commit that reached terminal success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReport {
    pub path: WritePath,
    pub attempts: Vec<CommitAttempt>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    #[error("No suitable rendition found for {asset} after trying {}: {}", tried.len(), tried.join(", "))]
    NoRenditionAvailable { asset: String, tried: Vec<String> },

    #[error("Inference request failed after {attempts} attempts (status {}): {body}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    InferenceRequestFailed {
        status: Option<u16>,
        body: String,
        attempts: u32,
    },

    #[error("Malformed inference result: {0}")]
    MalformedInferenceResult(String),

    #[error("Failed to update metadata for {asset} via {path} after {attempts} attempts: {last_error}")]
    MetadataCommitFailed {
        asset: String,
        path: WritePath,
        attempts: u32,
        last_error: String,
        /// Every attempt made on this path, the last one `TerminalFailure`.
        attempt_log: Vec<CommitAttempt>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaggerError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TaggerError::NoRenditionAvailable { .. } => "NoRenditionAvailable",
            TaggerError::InferenceRequestFailed { .. } => "InferenceRequestFailed",
            TaggerError::MalformedInferenceResult(_) => "MalformedInferenceResult",
            TaggerError::MetadataCommitFailed { .. } => "MetadataCommitFailed",
            TaggerError::InvalidInput(_) => "InvalidInput",
            TaggerError::Staging(_) => "Staging",
            TaggerError::Http(_) => "Http",
            TaggerError::InvalidUrl(_) => "InvalidInput",
            TaggerError::Io(_) => "Io",
            TaggerError::Serialization(_) => "Serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;

/// Trims a response body to something safe to put into an error or log line.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
