use thiserror::Error;

pub type Result<T> = std::result::Result<T, JiraError>;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("tracker configuration incomplete: {0}")]
    Configuration(String),

    /// The tracker rejected the request; `message` is the first error string
    /// from its response body.
    #[error("tracker error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not attach {filename} after {attempts} attempts: {message}")]
    AttachExhausted {
        filename: String,
        attempts: u32,
        message: String,
    },
}

impl JiraError {
    /// 404 right after issue creation usually means the issue is not yet
    /// visible to the attachments endpoint; that is worth retrying.
    pub fn is_retryable_attach(&self) -> bool {
        match self {
            JiraError::Api { status, .. } => *status == 404,
            JiraError::Http(_) => true,
            _ => false,
        }
    }
}
