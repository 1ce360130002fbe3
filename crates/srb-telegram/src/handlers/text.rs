use std::sync::Arc;

use teloxide::prelude::*;

use srb_core::{
    domain::UserId,
    messaging::{port::TransportError, types::InboundMessage},
    router::RouteOutcome,
    session::AdminState,
    Error,
};

use crate::keyboards;
use crate::runner::AppState;
use crate::texts;

use super::{admin_menu, send_html, send_html_kb};

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };

    let sender = UserId(from.id.0 as i64);
    if state.cfg.is_admin(sender) {
        handle_admin_text(&bot, &msg, &state, sender, &text).await
    } else {
        handle_user_text(&bot, &msg, &state, sender, &text).await
    }
}

// ============== User side ==============

async fn handle_user_text(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    user: UserId,
    text: &str,
) -> ResponseResult<()> {
    match text {
        keyboards::BTN_START_DIALOG => user_start_dialog(bot, msg, state, user).await,
        keyboards::BTN_END_DIALOG => user_end_dialog(bot, msg, state, user).await,
        keyboards::BTN_OUR_WORK => {
            send_html(bot, msg.chat.id, &texts::our_work(&state.cfg.examples_url)).await?;
            Ok(())
        }
        keyboards::BTN_CHANNEL => {
            send_html(bot, msg.chat.id, &texts::channel(&state.cfg.channel_url)).await?;
            Ok(())
        }
        keyboards::BTN_CONTACTS => {
            send_html(bot, msg.chat.id, texts::CONTACTS).await?;
            Ok(())
        }
        keyboards::BTN_ABOUT => {
            send_html(bot, msg.chat.id, texts::ABOUT_STUDIO).await?;
            Ok(())
        }
        keyboards::BTN_PROMO => user_promo(bot, msg, state, user).await,
        _ => relay_user_text(bot, msg, state, user, text).await,
    }
}

async fn user_start_dialog(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    user: UserId,
) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let now = chrono::Utc::now().timestamp();

    let record = match state
        .users
        .save_contact(user, &from.full_name(), from.username.as_deref(), now)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(user = %user, error = %e, "failed to register user");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    match state.registry.active_session(user).await {
        Ok(Some(_)) => {
            send_html_kb(
                bot,
                msg.chat.id,
                texts::ERROR_DIALOG_EXISTS,
                keyboards::user_dialog_menu(),
            )
            .await?;
            return Ok(());
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(user = %user, error = %e, "session lookup failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    }

    if let Err(e) = state
        .registry
        .start_dialog(user, state.cfg.admin_id, now)
        .await
    {
        tracing::error!(user = %user, error = %e, "failed to start dialog");
        let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        return Ok(());
    }

    send_html_kb(
        bot,
        msg.chat.id,
        texts::DIALOG_STARTED,
        keyboards::user_dialog_menu(),
    )
    .await?;

    // Heads-up for the admin; a failure here never fails the start.
    let note = texts::new_dialog_notification(&record);
    if let Err(e) = state.transport.send(state.cfg.admin_id, &note).await {
        tracing::warn!(error = %e, "admin notification undeliverable");
    }

    Ok(())
}

async fn user_end_dialog(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    user: UserId,
) -> ResponseResult<()> {
    let now = chrono::Utc::now().timestamp();
    match state.registry.end_dialog(user, now).await {
        Ok(None) => {
            send_html_kb(
                bot,
                msg.chat.id,
                texts::ERROR_NO_DIALOG,
                keyboards::user_main_menu(),
            )
            .await?;
        }
        Ok(Some(_)) => {
            send_html_kb(
                bot,
                msg.chat.id,
                texts::DIALOG_ENDED_USER,
                keyboards::user_main_menu(),
            )
            .await?;

            if let Ok(Some(record)) = state.users.get(user).await {
                let note = texts::dialog_ended_notification(&record);
                if let Err(e) = state.transport.send(state.cfg.admin_id, &note).await {
                    tracing::warn!(error = %e, "admin notification undeliverable");
                }
            }
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "failed to end dialog");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        }
    }
    Ok(())
}

async fn user_promo(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    user: UserId,
) -> ResponseResult<()> {
    let promo = state.referrals.promo_code(user).await;
    let count = state.referrals.referee_count(user).await;
    let (promo, count) = match (promo, count) {
        (Ok(p), Ok(c)) => (p, c),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(user = %user, error = %e, "referral lookup failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    let invite_link = format!("https://t.me/{}?start=ref_{}", state.bot_username, user);
    send_html(
        bot,
        msg.chat.id,
        &texts::promo_status(
            promo.as_ref(),
            count,
            state.cfg.referral_threshold,
            &invite_link,
        ),
    )
    .await?;
    Ok(())
}

async fn relay_user_text(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    user: UserId,
    text: &str,
) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let inbound = InboundMessage::new(user, &from.full_name(), from.username.as_deref(), text);

    match state.router.handle_inbound(&inbound).await {
        Ok(RouteOutcome::ForwardedToAdmin { auto_started: true }) => {
            // This very message opened the dialog: hand the user the
            // dialog keyboard and give the admin the usual heads-up.
            send_html_kb(
                bot,
                msg.chat.id,
                texts::DIALOG_STARTED,
                keyboards::user_dialog_menu(),
            )
            .await?;
            if let Ok(Some(record)) = state.users.get(user).await {
                let note = texts::new_dialog_notification(&record);
                let _ = state.transport.send(state.cfg.admin_id, &note).await;
            }
        }
        Ok(_) => {}
        Err(Error::NoActiveSession) => {
            send_html_kb(
                bot,
                msg.chat.id,
                texts::HINT_USE_MENU,
                keyboards::user_main_menu(),
            )
            .await?;
        }
        Err(Error::RateLimitExceeded { .. }) => {
            bot.send_message(msg.chat.id, texts::ERROR_RATE_LIMITED).await?;
        }
        Err(Error::MessageTooLong { limit }) => {
            bot.send_message(msg.chat.id, texts::message_too_long(limit))
                .await?;
        }
        Err(Error::Delivery(e)) => {
            tracing::warn!(user = %user, error = %e, "relay to admin failed");
            bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await?;
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "routing failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        }
    }
    Ok(())
}

// ============== Admin side ==============

async fn handle_admin_text(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
    text: &str,
) -> ResponseResult<()> {
    if text.starts_with(keyboards::BTN_ACTIVE_DIALOGS) {
        return admin_active_dialogs(bot, msg, state).await;
    }
    if text.starts_with(keyboards::BTN_USERS) {
        return admin_users_list(bot, msg, state).await;
    }

    match text {
        keyboards::BTN_NEW_DIALOG => admin_new_dialog(bot, msg, state).await,
        keyboards::BTN_STATS => admin_stats(bot, msg, state).await,
        keyboards::BTN_BROADCAST => admin_broadcast_prompt(bot, msg, state, admin).await,
        keyboards::BTN_CANCEL => admin_cancel(bot, msg, state, admin).await,
        keyboards::BTN_END_DIALOG => admin_end_dialog(bot, msg, state, admin).await,
        keyboards::BTN_SWITCH_DIALOG => {
            set_admin_idle(state, admin).await;
            admin_active_dialogs(bot, msg, state).await
        }
        keyboards::BTN_MAIN_MENU => {
            set_admin_idle(state, admin).await;
            let body = match state.stats.snapshot().await {
                Ok(s) => texts::admin_welcome(&s),
                Err(_) => texts::ERROR_SEND_FAILED.to_string(),
            };
            let kb = admin_menu(state).await;
            send_html_kb(bot, msg.chat.id, &body, kb).await?;
            Ok(())
        }
        _ => {
            let broadcasting = matches!(
                state.registry.admin_state(admin).await,
                Ok(AdminState::Broadcasting)
            );
            if broadcasting {
                run_broadcast(bot, msg, state, admin, text).await
            } else {
                relay_admin_text(bot, msg, state, admin, text).await
            }
        }
    }
}

async fn set_admin_idle(state: &Arc<AppState>, admin: UserId) {
    if let Err(e) = state.registry.set_admin_state(admin, AdminState::Idle).await {
        tracing::error!(error = %e, "failed to reset admin state");
    }
}

async fn admin_active_dialogs(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
) -> ResponseResult<()> {
    let sessions = match state.registry.active_sessions().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "active session listing failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    if sessions.is_empty() {
        send_html(
            bot,
            msg.chat.id,
            "💬 <b>Active dialogs</b>\n\nNone right now. Use \"New dialog\" to open one.",
        )
        .await?;
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();
    let mut body = String::from("💬 <b>Active dialogs:</b>\n\n");
    let mut labeled = Vec::new();
    for session in sessions {
        let record = state.users.get(session.user).await.ok().flatten();
        let name = record
            .as_ref()
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| format!("user {}", session.user));
        let handle = record.as_ref().and_then(|r| r.handle.clone());

        body.push_str(&texts::active_dialog_line(
            &name,
            handle.as_deref(),
            session.user.0,
            now - session.started_at,
            session.message_count,
        ));
        labeled.push((session, name));
    }

    bot.send_message(msg.chat.id, body)
        .parse_mode(teloxide::types::ParseMode::Html)
        .reply_markup(keyboards::enter_dialog_buttons(&labeled))
        .await?;
    Ok(())
}

async fn admin_new_dialog(bot: &Bot, msg: &Message, state: &Arc<AppState>) -> ResponseResult<()> {
    let users = match state.users.all_except(state.cfg.admin_id).await {
        Ok(u) => u,
        Err(e) => {
            tracing::error!(error = %e, "user listing failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    if users.is_empty() {
        bot.send_message(msg.chat.id, "👥 No users yet").await?;
        return Ok(());
    }

    let mut free = Vec::new();
    for user in users {
        match state.registry.active_session(user.id).await {
            Ok(None) => free.push(user),
            Ok(Some(_)) => {}
            Err(e) => {
                tracing::error!(user = %user.id, error = %e, "session lookup failed");
            }
        }
    }

    if free.is_empty() {
        send_html(
            bot,
            msg.chat.id,
            "🆕 <b>New dialog</b>\n\nEveryone already has an open dialog.",
        )
        .await?;
        return Ok(());
    }

    free.truncate(15);
    let mut body = String::from("🆕 <b>Start a new dialog with:</b>\n\n");
    for user in &free {
        body.push_str(&texts::user_line(user, false));
    }

    bot.send_message(msg.chat.id, body)
        .parse_mode(teloxide::types::ParseMode::Html)
        .reply_markup(keyboards::start_dialog_buttons(&free))
        .await?;
    Ok(())
}

async fn admin_users_list(bot: &Bot, msg: &Message, state: &Arc<AppState>) -> ResponseResult<()> {
    let users = match state.users.all_except(state.cfg.admin_id).await {
        Ok(u) => u,
        Err(e) => {
            tracing::error!(error = %e, "user listing failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    if users.is_empty() {
        bot.send_message(msg.chat.id, "👥 No users yet").await?;
        return Ok(());
    }

    let total = users.len();
    let mut body = String::from("👥 <b>All users:</b>\n\n");
    for user in users.iter().take(20) {
        let in_dialog = matches!(
            state.registry.active_session(user.id).await,
            Ok(Some(_))
        );
        body.push_str(&texts::user_line(user, in_dialog));
    }
    if total > 20 {
        body.push_str(&format!("… and {} more", total - 20));
    }

    send_html(bot, msg.chat.id, &body).await?;
    Ok(())
}

async fn admin_stats(bot: &Bot, msg: &Message, state: &Arc<AppState>) -> ResponseResult<()> {
    match state.stats.snapshot().await {
        Ok(s) => {
            send_html(bot, msg.chat.id, &texts::admin_stats(&s)).await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "stats snapshot failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        }
    }
    Ok(())
}

async fn admin_broadcast_prompt(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
) -> ResponseResult<()> {
    if let Err(e) = state
        .registry
        .set_admin_state(admin, AdminState::Broadcasting)
        .await
    {
        tracing::error!(error = %e, "failed to enter broadcast mode");
        let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        return Ok(());
    }

    send_html_kb(
        bot,
        msg.chat.id,
        texts::BROADCAST_PROMPT,
        keyboards::cancel_menu(),
    )
    .await?;
    Ok(())
}

async fn admin_cancel(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
) -> ResponseResult<()> {
    set_admin_idle(state, admin).await;
    let kb = admin_menu(state).await;
    send_html_kb(bot, msg.chat.id, texts::BROADCAST_CANCELLED, kb).await?;
    Ok(())
}

async fn admin_end_dialog(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
) -> ResponseResult<()> {
    let focus = match state.registry.admin_focus(admin).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, "focus lookup failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    };

    let Some(user) = focus else {
        let kb = admin_menu(state).await;
        send_html_kb(bot, msg.chat.id, "❌ You are not in a dialog", kb).await?;
        return Ok(());
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(e) = state.registry.end_dialog(user, now).await {
        tracing::error!(user = %user, error = %e, "failed to end dialog");
        let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        return Ok(());
    }

    let name = state
        .users
        .get(user)
        .await
        .ok()
        .flatten()
        .map(|r| r.display_name)
        .unwrap_or_else(|| format!("user {user}"));

    let kb = admin_menu(state).await;
    send_html_kb(bot, msg.chat.id, &texts::admin_dialog_ended(&name), kb).await?;

    // Tell the user; their dialog is gone either way.
    let _ = bot
        .send_message(teloxide::types::ChatId(user.0), texts::DIALOG_ENDED_BY_ADMIN)
        .parse_mode(teloxide::types::ParseMode::Html)
        .reply_markup(keyboards::user_main_menu())
        .await;

    Ok(())
}

async fn run_broadcast(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
    text: &str,
) -> ResponseResult<()> {
    set_admin_idle(state, admin).await;

    match state.users.count_except(state.cfg.admin_id).await {
        Ok(0) => {
            let kb = admin_menu(state).await;
            send_html_kb(bot, msg.chat.id, texts::BROADCAST_NO_USERS, kb).await?;
            return Ok(());
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(error = %e, "user count failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
            return Ok(());
        }
    }

    bot.send_message(msg.chat.id, texts::BROADCAST_RUNNING).await?;

    // The fan-out runs on its own task so the dispatcher keeps routing
    // while sends are in flight.
    let state = state.clone();
    let bot = bot.clone();
    let chat = msg.chat.id;
    let text = text.to_string();
    tokio::spawn(async move {
        match state.broadcaster.broadcast(&text).await {
            Ok(report) => {
                let kb = admin_menu(&state).await;
                let _ = send_html_kb(&bot, chat, &texts::broadcast_summary(&report, &text), kb)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "broadcast failed");
                let _ = bot.send_message(chat, texts::ERROR_SEND_FAILED).await;
            }
        }
    });

    Ok(())
}

async fn relay_admin_text(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    admin: UserId,
    text: &str,
) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let inbound = InboundMessage::new(admin, &from.full_name(), from.username.as_deref(), text);

    match state.router.handle_inbound(&inbound).await {
        Ok(RouteOutcome::ForwardedToUser { .. }) => {}
        Ok(_) => {
            let kb = admin_menu(state).await;
            send_html_kb(bot, msg.chat.id, texts::HINT_ADMIN_USE_MENU, kb).await?;
        }
        Err(Error::NoActiveSession) => {
            let kb = admin_menu(state).await;
            send_html_kb(bot, msg.chat.id, "❌ The dialog is not active", kb).await?;
        }
        Err(Error::Delivery(TransportError::Unreachable { recipient, .. })) => {
            send_html(bot, msg.chat.id, &texts::delivery_failed_to(recipient.0)).await?;
        }
        Err(Error::Delivery(e)) => {
            tracing::warn!(error = %e, "relay to user failed");
            bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "routing failed");
            let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        }
    }
    Ok(())
}
