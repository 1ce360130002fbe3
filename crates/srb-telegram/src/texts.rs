//! User-facing copy, Telegram-HTML flavored.
//!
//! Everything dynamic goes through `escape_html`; the static pieces are
//! authored HTML.

use srb_core::{
    broadcast::BroadcastReport,
    formatting::{escape_html, format_duration},
    referral::PromoCode,
    stats::StatsSnapshot,
    users::UserRecord,
};

pub const ERROR_SEND_FAILED: &str =
    "❌ Could not send the message. Please try again later.";
pub const ERROR_RATE_LIMITED: &str = "❌ Too many messages. Give it a minute.";
pub const ERROR_NO_DIALOG: &str =
    "❌ You are not in a dialog. Use the \"Start a dialog\" button.";
pub const ERROR_DIALOG_EXISTS: &str =
    "❌ You already have an open dialog. End it before starting a new one.";
pub const ERROR_TEXT_ONLY: &str = "❌ Only text messages are supported.";
pub const HINT_USE_MENU: &str = "❓ Use the menu buttons, or send /start.";
pub const HINT_ADMIN_USE_MENU: &str = "❓ Unknown command. Use the menu buttons.";

pub const DIALOG_STARTED: &str = "💬 <b>Dialog started!</b>\n\n\
You are now talking to the studio directly — the admin sees your messages \
immediately.\n\n<i>Use the button below to end the dialog.</i>";

pub const RETURN_TO_DIALOG: &str = "💬 <b>Back to your dialog</b>\n\n\
Your dialog with the studio is still open. Keep writing!";

pub const DIALOG_ENDED_USER: &str = "✅ <b>Dialog ended</b>\n\n\
Thanks for the chat! You can start a new dialog any time.";

pub const DIALOG_ENDED_BY_ADMIN: &str = "✅ <b>The studio ended the dialog</b>\n\n\
Thanks for the chat! You can start a new dialog any time.";

pub const DIALOG_OPENED_BY_ADMIN: &str = "💬 <b>The studio opened a dialog with you!</b>\n\n\
Write your messages here — the admin sees them in real time.";

pub const ABOUT_STUDIO: &str = "ℹ️ <b>About the studio</b>\n\n\
🎤 <b>Services:</b>\n\
• Vocal and instrument recording\n\
• Mixing and mastering\n\
• Arrangement and full-cycle production\n\n\
💬 Use the \"Start a dialog\" button to talk to us directly.";

pub const CONTACTS: &str = "📲 <b>Contacts</b>\n\n\
💬 The fastest way to reach us is the \"Start a dialog\" button.\n\n\
⏰ <b>Hours:</b>\nMon–Fri 10:00–20:00\nSat–Sun 12:00–18:00";

pub const BROADCAST_PROMPT: &str = "📢 <b>Broadcast</b>\n\n\
Send the text to deliver to every user:";
pub const BROADCAST_CANCELLED: &str = "❌ Broadcast cancelled";
pub const BROADCAST_RUNNING: &str = "📡 Broadcasting…";
pub const BROADCAST_NO_USERS: &str = "❌ There are no users to broadcast to";

pub fn welcome(first_name: &str) -> String {
    format!(
        "Hi, {}! 👋\nWelcome to the studio.\n\n\
🎵 Here you can:\n\
▫️ Start a dialog with the admin\n\
▫️ Listen to our work\n\
▫️ Get a quick consultation\n\n\
Pick an action from the menu:",
        escape_html(first_name)
    )
}

pub fn our_work(examples_url: &str) -> String {
    format!(
        "🎵 <b>Our work</b>\n\nArrangement, mixing, mastering — listen here:\n{}",
        escape_html(examples_url)
    )
}

pub fn channel(channel_url: &str) -> String {
    format!(
        "📢 <b>Follow our channel!</b>\n\n{}\n\n\
New releases, behind-the-scenes and special offers.",
        escape_html(channel_url)
    )
}

pub fn admin_welcome(stats: &StatsSnapshot) -> String {
    format!(
        "👨‍💼 <b>Studio admin panel</b>\n\n\
• Active dialogs: {}\n\
• Total users: {}\n\
• Uptime: {}\n\n\
Use the buttons to manage the bot:",
        stats.active_dialogs,
        stats.total_users,
        format_duration(stats.uptime.as_secs() as i64)
    )
}

pub fn admin_stats(stats: &StatsSnapshot) -> String {
    format!(
        "📊 <b>Bot statistics</b>\n\n\
<b>👥 Users:</b> {}\n\
<b>💬 Dialogs:</b> {} active, {} total\n\
<b>📨 Messages:</b> {} total\n\
<b>⏰ Uptime:</b> {}",
        stats.total_users,
        stats.active_dialogs,
        stats.total_dialogs,
        stats.total_messages,
        format_duration(stats.uptime.as_secs() as i64)
    )
}

pub fn new_dialog_notification(user: &UserRecord) -> String {
    format!(
        "🆕 <b>New dialog started!</b>\n\n\
👤 {}\n🆔 <code>{}</code>\n📧 @{}\n\n\
The user is waiting for a reply. Open \"Active dialogs\" to join.",
        escape_html(&user.display_name),
        user.id,
        escape_html(user.handle.as_deref().unwrap_or("none")),
    )
}

pub fn dialog_ended_notification(user: &UserRecord) -> String {
    format!(
        "❌ <b>Dialog ended by the user</b>\n\n👤 {} (🆔 <code>{}</code>)",
        escape_html(&user.display_name),
        user.id,
    )
}

pub fn admin_dialog_ended(display_name: &str) -> String {
    format!("✅ Dialog with {} ended", escape_html(display_name))
}

pub fn admin_entered_dialog(display_name: &str) -> String {
    format!(
        "💬 <b>Dialog with {}</b>\n\nWrite your messages — the user sees them immediately!",
        escape_html(display_name)
    )
}

pub fn delivery_failed_to(user_id: i64) -> String {
    format!("❌ Could not deliver to user <code>{user_id}</code>. The dialog stays open — retry or end it.")
}

pub fn active_dialog_line(name: &str, handle: Option<&str>, user_id: i64, duration_secs: i64, messages: u64) -> String {
    format!(
        "👤 <b>{}</b>\n📧 @{} | 🆔 <code>{}</code>\n⏰ {} | 💬 {} messages\n\n",
        escape_html(name),
        escape_html(handle.unwrap_or("none")),
        user_id,
        format_duration(duration_secs),
        messages,
    )
}

pub fn user_line(user: &UserRecord, in_dialog: bool) -> String {
    let status = if in_dialog { "🟢 in dialog" } else { "⚪ free" };
    format!(
        "👤 <b>{}</b> {}\n🆔 <code>{}</code> | 📧 @{} | 📨 {} messages\n\n",
        escape_html(&user.display_name),
        status,
        user.id,
        escape_html(user.handle.as_deref().unwrap_or("none")),
        user.total_messages,
    )
}

pub fn broadcast_summary(report: &BroadcastReport, text: &str) -> String {
    format!(
        "📊 <b>Broadcast finished!</b>\n\n\
✅ Delivered: {}\n❌ Failed/blocked: {}\n📋 Total recipients: {}\n\n\
💬 <b>Text:</b>\n<i>{}</i>",
        report.delivered,
        report.failed,
        report.total,
        escape_html(text),
    )
}

pub fn promo_status(promo: Option<&PromoCode>, referrals: usize, threshold: usize, invite_link: &str) -> String {
    match promo {
        Some(p) => format!(
            "🎁 <b>Your promo code:</b> <code>{}</code>\n\nShow it to the admin to claim your reward.",
            escape_html(&p.code)
        ),
        None => format!(
            "🎁 <b>Referral program</b>\n\n\
Invite {threshold} friends and get a promo code for a studio discount.\n\
Invited so far: <b>{referrals}</b> of {threshold}.\n\n\
Your invite link:\n{}",
            escape_html(invite_link)
        ),
    }
}

pub fn promo_issued(code: &str, threshold: usize) -> String {
    format!(
        "🎉 <b>You did it!</b>\n\n{threshold} friends joined with your link. \
Your promo code: <code>{}</code>",
        escape_html(code)
    )
}

pub fn message_too_long(limit: usize) -> String {
    format!("❌ The message is too long. Keep it under {limit} characters.")
}
