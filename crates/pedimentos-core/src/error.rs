use thiserror::Error;

#[derive(Debug, Error)]
pub enum PedimentoError {
    #[error("service not found: {kind} for pedimento {pedimento}")]
    ServiceNotFound { kind: String, pedimento: String },

    #[error("service already exists: {kind} for pedimento {pedimento}")]
    ServiceExists { kind: String, pedimento: String },

    #[error("invalid service kind: {0}")]
    InvalidServiceKind(String),

    #[error("invalid service state code: {0}")]
    InvalidStateCode(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("local registry error: {0}")]
    LocalStore(String),

    #[error("pedimento processor failed: {0}")]
    Processor(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PedimentoError>;

/// Failure reported by a dependent service invocation.
///
/// Always retryable from the executor's point of view; the retry policy
/// alone decides whether another attempt happens.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DownstreamError {
    /// HTTP status returned by the dependent service, if one was received.
    pub status: Option<u16>,
    pub message: String,
}

impl DownstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}
