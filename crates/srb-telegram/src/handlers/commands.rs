use std::sync::Arc;

use teloxide::prelude::*;

use srb_core::{domain::UserId, session::AdminState};

use crate::keyboards;
use crate::runner::AppState;
use crate::texts;

use super::{admin_menu, send_html_kb};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// `/start ref_<id>` deep links carry the referrer.
fn parse_referral_payload(args: &str) -> Option<UserId> {
    args.trim()
        .strip_prefix("ref_")?
        .parse::<i64>()
        .ok()
        .map(UserId)
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (cmd, args) = parse_command(text);
    match cmd.as_str() {
        "start" => handle_start(&bot, &msg, &state, &args).await,
        _ => {
            let user_id = UserId(from.id.0 as i64);
            if state.cfg.is_admin(user_id) {
                let kb = admin_menu(&state).await;
                let _ = send_html_kb(&bot, msg.chat.id, texts::HINT_ADMIN_USE_MENU, kb).await;
            } else {
                let _ = send_html_kb(
                    &bot,
                    msg.chat.id,
                    texts::HINT_USE_MENU,
                    keyboards::user_main_menu(),
                )
                .await;
            }
            Ok(())
        }
    }
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    args: &str,
) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(from.id.0 as i64);
    let display_name = from.full_name();
    let handle = from.username.as_deref();
    let now = chrono::Utc::now().timestamp();

    if let Err(e) = state
        .users
        .save_contact(user_id, &display_name, handle, now)
        .await
    {
        tracing::error!(user = %user_id, error = %e, "failed to register user");
        let _ = bot.send_message(msg.chat.id, texts::ERROR_SEND_FAILED).await;
        return Ok(());
    }

    // Referral deep link: credit the referrer, reward at the threshold.
    if !state.cfg.is_admin(user_id) {
        if let Some(referrer) = parse_referral_payload(args) {
            match state.referrals.add_referral(referrer, user_id, now).await {
                Ok(Some(promo)) => {
                    let note = texts::promo_issued(&promo.code, state.cfg.referral_threshold);
                    if let Err(e) = state.transport.send(referrer, &note).await {
                        tracing::warn!(referrer = %referrer, error = %e, "promo notice undeliverable");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(referrer = %referrer, error = %e, "referral not recorded");
                }
            }
        }
    }

    if state.cfg.is_admin(user_id) {
        // Opening the panel always leaves any dialog/broadcast mode.
        if let Err(e) = state.registry.set_admin_state(user_id, AdminState::Idle).await {
            tracing::error!(error = %e, "failed to reset admin state");
        }

        let body = match state.stats.snapshot().await {
            Ok(s) => texts::admin_welcome(&s),
            Err(e) => {
                tracing::error!(error = %e, "stats snapshot failed");
                texts::ERROR_SEND_FAILED.to_string()
            }
        };
        let kb = admin_menu(state).await;
        send_html_kb(bot, msg.chat.id, &body, kb).await?;
        return Ok(());
    }

    let in_dialog = match state.registry.active_session(user_id).await {
        Ok(s) => s.is_some(),
        Err(e) => {
            tracing::error!(user = %user_id, error = %e, "session lookup failed");
            false
        }
    };

    if in_dialog {
        send_html_kb(
            bot,
            msg.chat.id,
            texts::RETURN_TO_DIALOG,
            keyboards::user_dialog_menu(),
        )
        .await?;
    } else {
        send_html_kb(
            bot,
            msg.chat.id,
            &texts::welcome(&from.first_name),
            keyboards::user_main_menu(),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_parsed_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/start"), ("start".to_string(), String::new()));
        assert_eq!(
            parse_command("/start@studio_bot ref_42"),
            ("start".to_string(), "ref_42".to_string())
        );
        assert_eq!(
            parse_command("  /Start  hello world "),
            ("start".to_string(), "hello world".to_string())
        );
    }

    #[test]
    fn referral_payloads_need_the_ref_prefix_and_a_numeric_id() {
        assert_eq!(parse_referral_payload("ref_42"), Some(UserId(42)));
        assert_eq!(parse_referral_payload(" ref_42 "), Some(UserId(42)));
        assert_eq!(parse_referral_payload("ref_"), None);
        assert_eq!(parse_referral_payload("ref_abc"), None);
        assert_eq!(parse_referral_payload("42"), None);
        assert_eq!(parse_referral_payload(""), None);
    }
}
