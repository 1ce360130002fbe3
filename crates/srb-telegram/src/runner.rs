use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use srb_core::{
    broadcast::BroadcastDispatcher,
    config::Config,
    messaging::{
        port::Transport,
        throttled::{ThrottleConfig, ThrottledTransport},
    },
    ratelimit::RateLimiter,
    referral::ReferralEngine,
    router::DialogRouter,
    session::SessionRegistry,
    stats::StatsCollector,
    store::StateStore,
    users::UserDirectory,
};

use crate::{handlers, TelegramTransport};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub users: Arc<UserDirectory>,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<DialogRouter>,
    pub broadcaster: Arc<BroadcastDispatcher>,
    pub referrals: Arc<ReferralEngine>,
    pub stats: Arc<StatsCollector>,
    pub transport: Arc<dyn Transport>,
    /// Used to build referral invite links; empty when get_me failed.
    pub bot_username: String,
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn StateStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => me.username().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch bot identity");
            String::new()
        }
    };
    tracing::info!(bot = %bot_username, admin = %cfg.admin_id, "studio relay bot starting");

    // Wrap the raw Telegram transport with a throttling decorator so
    // relayed and broadcast traffic stays under Telegram flood limits.
    let raw: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let transport: Arc<dyn Transport> =
        Arc::new(ThrottledTransport::new(raw, ThrottleConfig::default()));

    let users = Arc::new(UserDirectory::new(store.clone()));
    let registry = Arc::new(SessionRegistry::new(store.clone()));
    let limiter = Arc::new(RateLimiter::new(
        store.clone(),
        cfg.rate_limit_messages,
        cfg.rate_limit_window,
    ));
    let router = Arc::new(DialogRouter::new(
        cfg.clone(),
        users.clone(),
        registry.clone(),
        limiter,
        transport.clone(),
    ));
    let broadcaster = Arc::new(BroadcastDispatcher::new(
        users.clone(),
        transport.clone(),
        cfg.admin_id,
        cfg.broadcast_pause_every,
        cfg.broadcast_pause,
    ));
    let referrals = Arc::new(ReferralEngine::new(store, cfg.referral_threshold));
    let stats = Arc::new(StatsCollector::new(
        users.clone(),
        registry.clone(),
        cfg.admin_id,
    ));

    let state = Arc::new(AppState {
        cfg,
        users,
        registry,
        router,
        broadcaster,
        referrals,
        stats,
        transport,
        bot_username,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
