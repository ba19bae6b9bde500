use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid tracker url '{0}'")]
    InvalidUrl(String),

    #[error("tracker rejected credentials during {operation} (status {status})")]
    Auth { operation: String, status: u16 },

    #[error("tracker {operation} failed with status {status}: {body}")]
    Tracker {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("tracker {operation} request failed: {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("issue not found: {0}")]
    IssueNotFound(String),

    #[error("triage worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TriageError {
    /// True for failures that mean the credentials are wrong rather than that
    /// one request went badly.
    pub fn is_auth(&self) -> bool {
        matches!(self, TriageError::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
