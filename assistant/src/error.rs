use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl AssistantError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AssistantError::Network(_) | AssistantError::RateLimited(_) => true,
            AssistantError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the rate limit was hit on input size rather than request
    /// count; screenshots are the usual culprit.
    pub fn is_token_rate_limit(&self) -> bool {
        matches!(self, AssistantError::RateLimited(message) if message.contains("input tokens"))
    }
}
