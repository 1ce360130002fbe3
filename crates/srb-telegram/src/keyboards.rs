//! Reply/inline keyboard construction + the button labels the text handler
//! matches against.

use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use srb_core::{session::DialogSession, users::UserRecord};

// User menu
pub const BTN_START_DIALOG: &str = "💬 Start a dialog";
pub const BTN_END_DIALOG: &str = "❌ End dialog";
pub const BTN_OUR_WORK: &str = "🎧 Our work";
pub const BTN_CHANNEL: &str = "📢 Our channel";
pub const BTN_CONTACTS: &str = "📲 Contacts";
pub const BTN_ABOUT: &str = "ℹ️ About the studio";
pub const BTN_PROMO: &str = "🎁 My promo code";

// Admin menu. Active-dialog/user buttons carry live counts, so the handler
// matches them by prefix.
pub const BTN_ACTIVE_DIALOGS: &str = "💬 Active dialogs";
pub const BTN_NEW_DIALOG: &str = "🆕 New dialog";
pub const BTN_USERS: &str = "👥 Users";
pub const BTN_STATS: &str = "📊 Statistics";
pub const BTN_BROADCAST: &str = "📢 Broadcast";
pub const BTN_SWITCH_DIALOG: &str = "🔄 Switch dialog";
pub const BTN_MAIN_MENU: &str = "🏠 Main menu";
pub const BTN_CANCEL: &str = "❌ Cancel";

// Callback-data prefixes for admin dialog selection.
pub const CB_ENTER_DIALOG: &str = "dlg:enter:";
pub const CB_START_DIALOG: &str = "dlg:start:";

fn reply_rows(rows: Vec<Vec<&str>>) -> KeyboardMarkup {
    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(KeyboardButton::new).collect())
        .collect::<Vec<Vec<_>>>();
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

pub fn user_main_menu() -> KeyboardMarkup {
    reply_rows(vec![
        vec![BTN_START_DIALOG, BTN_OUR_WORK],
        vec![BTN_CHANNEL, BTN_CONTACTS],
        vec![BTN_ABOUT, BTN_PROMO],
    ])
}

pub fn user_dialog_menu() -> KeyboardMarkup {
    reply_rows(vec![vec![BTN_END_DIALOG]])
}

pub fn admin_main_menu(active_dialogs: usize, total_users: usize) -> KeyboardMarkup {
    let dialogs_label = format!("{BTN_ACTIVE_DIALOGS} ({active_dialogs})");
    let users_label = format!("{BTN_USERS} ({total_users})");

    let rows = vec![
        vec![
            KeyboardButton::new(dialogs_label),
            KeyboardButton::new(BTN_NEW_DIALOG),
        ],
        vec![
            KeyboardButton::new(users_label),
            KeyboardButton::new(BTN_STATS),
        ],
        vec![KeyboardButton::new(BTN_BROADCAST)],
    ];
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

pub fn admin_dialog_menu() -> KeyboardMarkup {
    reply_rows(vec![
        vec![BTN_END_DIALOG, BTN_SWITCH_DIALOG],
        vec![BTN_MAIN_MENU],
    ])
}

pub fn cancel_menu() -> KeyboardMarkup {
    reply_rows(vec![vec![BTN_CANCEL]])
}

fn short_label(name: &str) -> String {
    if name.chars().count() > 25 {
        format!("{}…", name.chars().take(25).collect::<String>())
    } else {
        name.to_string()
    }
}

/// One button per active dialog, for the admin to jump in.
pub fn enter_dialog_buttons(dialogs: &[(DialogSession, String)]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = dialogs
        .iter()
        .map(|(session, name)| {
            vec![InlineKeyboardButton::callback(
                format!("💬 {}", short_label(name)),
                format!("{CB_ENTER_DIALOG}{}", session.user),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// One button per free user, for the admin to open a new dialog.
pub fn start_dialog_buttons(users: &[UserRecord]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = users
        .iter()
        .map(|u| {
            vec![InlineKeyboardButton::callback(
                format!("💬 {}", short_label(&u.display_name)),
                format!("{CB_START_DIALOG}{}", u.id),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}
