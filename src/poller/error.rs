//! Poll failure types.

use std::time::Duration;
use thiserror::Error;

/// Errors a single poll round-trip can produce.
///
/// These are never retried by the engine; they travel to the handler inside
/// the poll outcome and the next scheduled tick is the retry.
#[derive(Debug, Error)]
pub enum PollError {
    /// The target address could not be turned into a request.
    #[error("invalid poll address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Connection or protocol failure.
    #[error("request failed: {0}")]
    Request(String),

    /// No response within the target's timeout.
    #[error("poll timed out after {0:?}")]
    Timeout(Duration),

    /// The target answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The response body could not be read.
    #[error("reading response body: {0}")]
    Body(String),
}
