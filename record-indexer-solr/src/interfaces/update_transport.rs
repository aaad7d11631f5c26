use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TransportError;

/// Abstracts the search backend update endpoint.
///
/// Implementations post JSON payloads (add batches, delete batches,
/// commits, optimize, delete-by-query) to the backend. The trait is the
/// seam between the update buffer and HTTP, enabling tests to run the full
/// pipeline against a recording mock.
///
/// # Ordering
///
/// At most one request is in flight at any time. With a background worker,
/// `submit` first awaits the previous request; a worker failure surfaces
/// from that await and aborts the caller's pass.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    /// Submit a JSON payload to the backend update endpoint.
    ///
    /// # Arguments
    ///
    /// * `body` - The JSON payload to post.
    /// * `timeout` - Per-call timeout; `None` means no limit. Long-running
    ///   operations (optimize, delete-by-query of a whole source) pass a
    ///   long timeout.
    async fn submit(&self, body: String, timeout: Option<Duration>)
        -> Result<(), TransportError>;

    /// Await the outstanding background request, if any.
    async fn wait_idle(&self) -> Result<(), TransportError>;
}
