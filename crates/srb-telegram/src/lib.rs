//! Telegram adapter (teloxide).
//!
//! This crate implements the `srb-core` Transport port over the Telegram
//! Bot API and hosts the polling runner + update handlers.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use tokio::time::sleep;

use srb_core::{
    domain::UserId,
    messaging::port::{Transport, TransportError},
};

pub mod handlers;
pub mod keyboards;
pub mod runner;
pub mod texts;

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(user: UserId) -> teloxide::types::ChatId {
        // Private chats share the user's numeric id.
        teloxide::types::ChatId(user.0)
    }

    fn map_err(recipient: UserId, e: RequestError) -> TransportError {
        match &e {
            RequestError::Api(api) => match api {
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation
                | ApiError::CantTalkWithBots => TransportError::Unreachable {
                    recipient,
                    reason: api.to_string(),
                },
                _ => TransportError::Other(e.to_string()),
            },
            _ => TransportError::Other(e.to_string()),
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        recipient: UserId,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let res = self
                .bot
                .send_message(Self::tg_chat(recipient), text.to_string())
                .parse_mode(ParseMode::Html)
                .await;

            match res {
                Ok(_) => return Ok(()),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(e) => return Err(Self::map_err(recipient, e)),
            }
        }
    }
}
