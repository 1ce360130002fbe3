use std::time::Duration;

use crate::messaging::port::TransportError;

/// Core error taxonomy.
///
/// Everything except `Store` is recoverable at the router/dispatcher
/// boundary and is surfaced to the sending side as a notice. A store
/// failure is the one hard error: no component can safely guess session
/// state without the KV layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("not in an active dialog")]
    NoActiveSession,

    #[error("message exceeds the {limit}-character limit")]
    MessageTooLong { limit: usize },

    #[error("delivery failed: {0}")]
    Delivery(#[from] TransportError),

    #[error("state store failure: {0}")]
    Store(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
