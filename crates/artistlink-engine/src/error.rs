//! Error types for the route-finding engine.
//!
//! [`UpstreamError`] covers the external collaboration source. [`RouteError`]
//! is the unified error returned by searches and wraps every lower layer.

use std::time::Duration;

use artistlink_core::CoreError;
use artistlink_storage::StorageError;

/// Failures talking to the external collaboration source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Non-success response after the local retry policy gave up.
    #[error("upstream unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The remote asked us to slow down. Retried by [`crate::Throttle`] and
    /// never surfaced from it.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Too many consecutive throttles; calls fail fast until the cooldown ends.
    #[error("circuit open after {consecutive} consecutive throttles")]
    CircuitOpen { consecutive: u32 },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::RateLimited { .. })
    }
}

/// Errors that can end a route search.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// An environment override could not be parsed.
    #[error("invalid value for {key}: '{value}'")]
    Config { key: String, value: String },

    /// The spawned search task panicked or was cancelled.
    #[error("search task failed: {0}")]
    Task(String),
}

impl RouteError {
    /// Whether the error aborts the search. Throttling is absorbed by the
    /// retry layer, so only a leaked `RateLimited` is non-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RouteError::Upstream(e) if e.is_transient())
    }
}
