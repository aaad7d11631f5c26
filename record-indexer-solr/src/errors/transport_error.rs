use thiserror::Error;

/// Errors from search backend transport operations.
///
/// A non-2xx response is a failure; the response body is captured so the
/// backend's own error report lands in the log.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The backend answered with a failure status.
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The background worker died or reported a failure.
    #[error("Background update worker failed: {0}")]
    Worker(String),

    #[error("Invalid update URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Create an HTTP error.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}
