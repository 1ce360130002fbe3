use std::{env, fs, path::Path, time::Duration};

use crate::{domain::UserId, errors::Error, Result};

/// Typed configuration for the bot.
///
/// Everything is env-driven with the same defaults the studio has been
/// running in production; only the token and the admin id are required.
#[derive(Clone, Debug)]
pub struct Config {
    // Core identity
    pub bot_token: String,
    pub admin_id: UserId,

    // Dialog policy
    pub auto_start_on_first_message: bool,
    pub max_message_length: usize,

    // Inbound rate limiting
    pub rate_limit_messages: u32,
    pub rate_limit_window: Duration,

    // Broadcast pacing: brief pause every `broadcast_pause_every` sends.
    pub broadcast_pause_every: usize,
    pub broadcast_pause: Duration,

    // Referral rewards
    pub referral_threshold: usize,

    // Static links shown by the menu layer
    pub channel_url: String,
    pub examples_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_id = env_i64("ADMIN_ID")
            .map(UserId)
            .ok_or_else(|| Error::Config("ADMIN_ID environment variable is required".to_string()))?;

        let auto_start_on_first_message =
            env_bool("AUTO_START_ON_FIRST_MESSAGE").unwrap_or(false);
        let max_message_length = env_usize("MAX_MESSAGE_LENGTH").unwrap_or(4000);

        let rate_limit_messages = env_u32("RATE_LIMIT_MESSAGES").unwrap_or(10);
        let rate_limit_window = Duration::from_secs(env_u64("RATE_LIMIT_WINDOW").unwrap_or(60));

        let broadcast_pause_every = env_usize("BROADCAST_PAUSE_EVERY").unwrap_or(25);
        let broadcast_pause = Duration::from_millis(env_u64("BROADCAST_PAUSE_MS").unwrap_or(1_000));

        let referral_threshold = env_usize("REFERRAL_THRESHOLD").unwrap_or(3);

        let channel_url =
            env_str("CHANNEL_URL").unwrap_or_else(|| "https://t.me/kuznya_music".to_string());
        let examples_url =
            env_str("EXAMPLES_URL").unwrap_or_else(|| "https://t.me/kuznya_music/41".to_string());

        Ok(Self {
            bot_token,
            admin_id,
            auto_start_on_first_message,
            max_message_length,
            rate_limit_messages,
            rate_limit_window,
            broadcast_pause_every,
            broadcast_pause,
            referral_threshold,
            channel_url,
            examples_url,
        })
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        user == self.admin_id
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}
