use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use guidebot_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use guidebot_core::{
    alerts::Moderation,
    booking::BookingService,
    config::Config,
    conversation::{Conversations, InMemoryConversations},
    dispatcher::DeliveryDispatcher,
    messaging::port::MessagingPort,
    outbox::NotificationQueue,
    ports::Providers,
    reminders::Reminders,
    security::RateLimiter,
    store::Store,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Store,
    pub conversations: Arc<Conversations>,
    pub bookings: Arc<BookingService>,
    pub moderation: Arc<Moderation>,
    pub reminders: Arc<Reminders>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

pub async fn run_polling(cfg: Arc<Config>, store: Store, providers: Providers) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "guidebot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    tracing::info!(admins = cfg.admin_ids.len(), db = %cfg.database_path, "configuration loaded");
    if cfg.admin_ids.is_empty() {
        tracing::warn!("ADMIN_IDS is empty: moderation alerts will not be delivered");
    }

    // Outbox sweeps can burst (subscriber fan-out), so outbound calls go
    // through the throttling decorator. 429 retries stay in the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let queue: Arc<dyn NotificationQueue> = Arc::new(store.clone());
    let dispatcher = Arc::new(DeliveryDispatcher::new(queue, messenger.clone()));
    let shutdown = CancellationToken::new();
    let sweeper = dispatcher.start(cfg.dispatch_interval, shutdown.clone());

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store: store.clone(),
        conversations: Arc::new(Conversations::new(
            store.clone(),
            Arc::new(InMemoryConversations::default()),
            cfg.admin_ids.clone(),
        )),
        bookings: Arc::new(BookingService::new(store.clone())),
        moderation: Arc::new(Moderation::new(store.clone())),
        reminders: Arc::new(Reminders::new(
            store,
            providers,
            cfg.default_user_location,
        )),
        dispatcher,
        messenger,
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Let an in-flight sweep finish before exiting.
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "dispatcher task panicked");
    }
    tracing::info!("guidebot stopped");
    Ok(())
}
