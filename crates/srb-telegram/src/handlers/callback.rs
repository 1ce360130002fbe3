use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use srb_core::domain::UserId;

use crate::keyboards;
use crate::runner::AppState;
use crate::texts;

use super::send_html_kb;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();

    let Some(message) = q.message.as_ref() else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    // Dialog selection is admin-only surface.
    let from_id = UserId(q.from.id.0 as i64);
    if !state.cfg.is_admin(from_id) {
        let _ = bot
            .answer_callback_query(cb_id)
            .text("❌ No access".to_string())
            .await;
        return Ok(());
    }

    if let Some(raw) = data.strip_prefix(keyboards::CB_ENTER_DIALOG) {
        return enter_dialog(bot, message, state, cb_id, raw).await;
    }
    if let Some(raw) = data.strip_prefix(keyboards::CB_START_DIALOG) {
        return start_dialog(bot, message, state, cb_id, raw).await;
    }

    let _ = bot.answer_callback_query(cb_id).await;
    Ok(())
}

fn parse_user_id(raw: &str) -> Option<UserId> {
    raw.parse::<i64>().ok().map(UserId)
}

async fn enter_dialog(
    bot: Bot,
    message: &Message,
    state: Arc<AppState>,
    cb_id: String,
    raw: &str,
) -> ResponseResult<()> {
    let Some(user) = parse_user_id(raw) else {
        let _ = bot
            .answer_callback_query(cb_id)
            .text("❌ Bad selection".to_string())
            .await;
        return Ok(());
    };

    match state.registry.set_admin_focus(state.cfg.admin_id, user).await {
        Ok(()) => {}
        Err(srb_core::Error::NoActiveSession) => {
            let _ = bot
                .answer_callback_query(cb_id)
                .text("❌ The dialog is no longer active".to_string())
                .await;
            return Ok(());
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "failed to set admin focus");
            let _ = bot
                .answer_callback_query(cb_id)
                .text("❌ Error".to_string())
                .await;
            return Ok(());
        }
    }

    let name = display_name_of(&state, user).await;
    let _ = bot
        .edit_message_text(message.chat.id, message.id, texts::admin_entered_dialog(&name))
        .parse_mode(ParseMode::Html)
        .await;

    send_html_kb(
        &bot,
        message.chat.id,
        "Use the buttons to manage the dialog:",
        keyboards::admin_dialog_menu(),
    )
    .await?;

    let _ = bot
        .answer_callback_query(cb_id)
        .text(format!("✅ Joined the dialog with {name}"))
        .await;
    Ok(())
}

async fn start_dialog(
    bot: Bot,
    message: &Message,
    state: Arc<AppState>,
    cb_id: String,
    raw: &str,
) -> ResponseResult<()> {
    let Some(user) = parse_user_id(raw) else {
        let _ = bot
            .answer_callback_query(cb_id)
            .text("❌ Bad selection".to_string())
            .await;
        return Ok(());
    };

    match state.users.get(user).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let _ = bot
                .answer_callback_query(cb_id)
                .text("❌ User not found".to_string())
                .await;
            return Ok(());
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "user lookup failed");
            let _ = bot
                .answer_callback_query(cb_id)
                .text("❌ Error".to_string())
                .await;
            return Ok(());
        }
    }

    if matches!(state.registry.active_session(user).await, Ok(Some(_))) {
        let _ = bot
            .answer_callback_query(cb_id)
            .text("❌ The user is already in a dialog".to_string())
            .await;
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();
    let opened = match state
        .registry
        .start_dialog(user, state.cfg.admin_id, now)
        .await
    {
        Ok(_) => state.registry.set_admin_focus(state.cfg.admin_id, user).await,
        Err(e) => Err(e),
    };
    if let Err(e) = opened {
        tracing::error!(user = %user, error = %e, "failed to open dialog");
        let _ = bot
            .answer_callback_query(cb_id)
            .text("❌ Could not open the dialog".to_string())
            .await;
        return Ok(());
    }

    let name = display_name_of(&state, user).await;
    let _ = bot
        .edit_message_text(
            message.chat.id,
            message.id,
            format!(
                "✅ <b>New dialog with {}!</b>\n\nWrite your messages — the user sees them immediately.",
                srb_core::formatting::escape_html(&name)
            ),
        )
        .parse_mode(ParseMode::Html)
        .await;

    send_html_kb(
        &bot,
        message.chat.id,
        "Use the buttons to manage the dialog:",
        keyboards::admin_dialog_menu(),
    )
    .await?;

    // Let the user know the studio reached out; best-effort.
    let _ = bot
        .send_message(teloxide::types::ChatId(user.0), texts::DIALOG_OPENED_BY_ADMIN)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::user_dialog_menu())
        .await;

    let _ = bot
        .answer_callback_query(cb_id)
        .text(format!("✅ Dialog started with {name}"))
        .await;
    Ok(())
}

async fn display_name_of(state: &Arc<AppState>, user: UserId) -> String {
    state
        .users
        .get(user)
        .await
        .ok()
        .flatten()
        .map(|r| r.display_name)
        .unwrap_or_else(|| format!("user {user}"))
}
