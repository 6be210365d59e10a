use pedimentos_core::PedimentoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unreadable service record: {0}")]
    InvalidRecord(String),
}

impl From<ApiError> for PedimentoError {
    fn from(e: ApiError) -> Self {
        PedimentoError::Registry(e.to_string())
    }
}
