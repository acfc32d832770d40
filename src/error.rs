use thiserror::Error;

/// Errors produced by the wizard and its components.
///
/// Provider failures never surface through this type past the
/// [`Dispatcher`](crate::dispatch::Dispatcher): adapters convert them into
/// failed [`CallResult`](crate::types::CallResult)s. What remains here is
/// configuration, input and internal plumbing errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The named credential slot holds no value.
    #[error("{0} not set")]
    MissingCredential(&'static str),

    /// A configuration value could not be interpreted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller-supplied input was structurally unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A blocking worker panicked or was cancelled before returning.
    #[error("worker task failed: {0}")]
    Join(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same request can possibly change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::MissingCredential(_) | Error::InvalidConfig(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
