use async_trait::async_trait;

use crate::domain::UserId;

/// Errors a transport can surface for a single send.
///
/// `Unreachable` carries the failing recipient so the router and the
/// broadcast dispatcher can make accounting decisions instead of
/// discarding the failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("recipient {recipient} is unreachable: {reason}")]
    Unreachable { recipient: UserId, reason: String },

    #[error("transport failure: {0}")]
    Other(String),
}

/// Cross-messenger delivery port.
///
/// Telegram is the first implementation; the engine never learns how a
/// message is physically delivered, only whether the send succeeded. The
/// transport is expected to enforce its own timeouts — a send either
/// returns or fails, it is never awaited indefinitely by the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: UserId, text: &str)
        -> std::result::Result<(), TransportError>;
}
