use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Bearer Token authentication required.")]
    Missing,
    #[error("Invalid API Key.")]
    Invalid,
}

#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("unexpected response format: {0}")]
    UnexpectedResponseFormat(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl TranslateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TranslateError::InvalidRequest(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        TranslateError::Upstream(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        TranslateError::UnexpectedResponseFormat(message.into())
    }

    /// Upstream and format failures are recovered per unit; the rest are caller mistakes.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            TranslateError::Upstream(_) | TranslateError::UnexpectedResponseFormat(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TranslateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            TranslateError::Upstream(_) | TranslateError::UnexpectedResponseFormat(_) => {
                StatusCode::BAD_GATEWAY
            }
            TranslateError::Auth(AuthError::Missing) => StatusCode::UNAUTHORIZED,
            TranslateError::Auth(AuthError::Invalid) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<reqwest::Error> for TranslateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TranslateError::Upstream(format!("request timed out: {}", err));
        }
        if err.is_decode() {
            return TranslateError::UnexpectedResponseFormat(err.to_string());
        }
        TranslateError::Upstream(err.to_string())
    }
}
