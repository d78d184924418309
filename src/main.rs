use anyhow::Result;
use log::{error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chatwarden::bot::timers::AnnouncementTimer;
use chatwarden::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting chatwarden v{}", chatwarden::VERSION);

    let settings = EngineSettings::from_env()?;
    info!(
        "Moderating {} chat(s) with {} moderator handle(s)",
        settings.routing.moderated_chats.len(),
        settings.exemptions.moderator_count()
    );

    // Rule documents
    let config = ConfigurationManager::new(&settings.config_dir);
    if let Err(e) = config.initialize().await {
        error!("Failed to load rule documents: {:#}", e);
        return Err(e);
    }

    if settings.watch_config {
        if let Err(e) = config.watch().await {
            warn!("Rule documents will only reload via /admin/reload: {:#}", e);
        }
    }

    let transport: Arc<dyn Transport> = if settings.dry_run {
        warn!("DRY_RUN enabled: replies and deletions are only logged");
        Arc::new(DryRunTransport::new())
    } else {
        let telegram = TelegramConfig::from_env()?;
        Arc::new(TelegramClient::new(&telegram)?)
    };

    if let Some(url) = &settings.webhook_url {
        if let Err(e) = transport.set_webhook(url).await {
            warn!("Webhook registration failed, retry via /admin/setwebhook: {}", e);
        }
    }

    let bot = Arc::new(ModerationBot::new(
        &settings,
        config.clone(),
        Arc::clone(&transport),
        Arc::new(UnconfiguredExtractor),
    ));

    let timer_shutdown = if settings.announcements_enabled {
        let timer = AnnouncementTimer::new(config.clone(), settings.routing.clone(), Arc::clone(&transport));
        let signal = timer.shutdown_signal();
        timer.start();
        Some(signal)
    } else {
        None
    };

    let server = WebhookServer::new(Arc::clone(&bot), &settings);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
    };

    let result = server.start(settings.webhook_port, shutdown).await;

    if let Some(signal) = timer_shutdown {
        signal.store(true, Ordering::Relaxed);
    }

    let stats = bot.stats().snapshot();
    info!(
        "Stopped after {} event(s): {} reply, {} reply+delete, {} silent delete, {} dispatch",
        stats.events, stats.replies, stats.reply_and_delete, stats.silent_deletes, stats.dispatches
    );

    result
}
