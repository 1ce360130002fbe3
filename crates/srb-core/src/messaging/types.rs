use crate::domain::UserId;

/// Cross-messenger inbound message model.
///
/// Messenger-specific fields (chat ids, message ids, media) stay in the
/// adapter; the engine only needs the sender's identity, the profile bits
/// it mirrors into the user directory, and the text.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub sender: UserId,
    pub display_name: String,
    pub handle: Option<String>,
    pub text: String,
    /// Arrival time, unix seconds.
    pub timestamp: i64,
}

impl InboundMessage {
    pub fn new(sender: UserId, display_name: &str, handle: Option<&str>, text: &str) -> Self {
        Self {
            sender,
            display_name: display_name.to_string(),
            handle: handle.map(|h| h.to_string()),
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
