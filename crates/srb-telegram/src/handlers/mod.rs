//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it extracts identity + text from the
//! update, runs menu/command matching, and hands free text to the core
//! dialog router. All presentation (keyboards, notices) lives here.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, ParseMode, ReplyMarkup},
};

use crate::runner::AppState;
use crate::texts;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.from().is_none() {
        return Ok(());
    }

    match msg.text() {
        Some(t) if t.starts_with('/') => commands::handle_command(bot, msg, state).await,
        Some(_) => text::handle_text(bot, msg, state).await,
        None => {
            let _ = bot.send_message(msg.chat.id, texts::ERROR_TEXT_ONLY).await;
            Ok(())
        }
    }
}

pub(crate) async fn send_html(
    bot: &Bot,
    chat: ChatId,
    text: &str,
) -> ResponseResult<Message> {
    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .await
}

pub(crate) async fn send_html_kb(
    bot: &Bot,
    chat: ChatId,
    text: &str,
    markup: impl Into<ReplyMarkup>,
) -> ResponseResult<Message> {
    bot.send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(markup.into())
        .await
}

/// Admin main keyboard with live counts; falls back to zeroes when the
/// store is unhappy (the notice itself still goes out).
pub(crate) async fn admin_menu(state: &AppState) -> teloxide::types::KeyboardMarkup {
    match state.stats.snapshot().await {
        Ok(s) => crate::keyboards::admin_main_menu(s.active_dialogs, s.total_users),
        Err(e) => {
            tracing::warn!(error = %e, "stats snapshot failed");
            crate::keyboards::admin_main_menu(0, 0)
        }
    }
}
