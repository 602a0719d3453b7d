use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// A credential needed to build the request is absent.
    #[error("{0} is not configured")]
    MissingCredentials(&'static str),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),

    /// The service answered but reported failure.
    #[error("upstream {status}: {message}")]
    Upstream { status: u16, message: String },
}

impl LlmError {
    pub fn is_missing_credentials(&self) -> bool {
        matches!(self, LlmError::MissingCredentials(_))
    }
}
