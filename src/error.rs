//! Error types for the keylimit client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for limiter operations.
///
/// Initialization failures (`InputParam`, `LoadScript`) are returned to the
/// caller rather than aborting the process; the binary decides whether to
/// exit. Runtime failures are returned per call and the limiter never retries
/// internally: the scripts are not idempotent, so a retry would spend quota
/// twice.
#[derive(Error, Debug)]
pub enum Error {
    /// The key has no live rule: never created, expired, or deleted.
    #[error("no rule exists for this key")]
    ItemNotExist,

    /// Leaky bucket queue is full; the request must be dropped.
    #[error("request queue is full")]
    ReqOverFlow,

    /// A configuration or rule argument has the wrong shape.
    #[error("invalid input parameter: {0}")]
    InputParam(String),

    /// One of the algorithm's scripts failed to upload at init.
    #[error("failed to load script: {0}")]
    LoadScript(String),

    /// Arity mismatch or unexpected response shape.
    #[error("unexpected request or response shape: {0}")]
    Unknown(String),

    /// The round trip exceeded the configured read + write budget.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Redis protocol or transport errors, propagated verbatim.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool errors (exhaustion, connect failure).
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Pool construction errors at init.
    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, Error>;
