//! lztbot — forum notification relay and thread auto-bumper
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the forum gateway, stores and delivery channel, then runs the
//! notification poller and the bump scheduler until Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lztbot::config::AppConfig;
use lztbot::dashboard::{self, DashboardState};
use lztbot::delivery::telegram::TelegramChannel;
use lztbot::delivery::DeliveryChannel;
use lztbot::engine::bumper::BumpScheduler;
use lztbot::engine::poller::NotificationPoller;
use lztbot::extract::MarkupExtractor;
use lztbot::forum::client::ForumClient;
use lztbot::forum::rate_limiter::RateLimiter;
use lztbot::forum::ForumApi;
use lztbot::render::EventRenderer;
use lztbot::storage::{
    BumpRegistry, JsonFileStore, SettingsStore, WatermarkDoc, WatermarkStore, BUMPS_FILE,
    SETTINGS_FILE, WATERMARK_FILE,
};
use lztbot::types::{BumpScheduleEntry, Settings};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("LZTBOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        name = %cfg.bot.name,
        data_dir = %cfg.bot.data_dir.display(),
        poller = cfg.poller.enabled,
        bumps = cfg.bumps.enabled,
        "lztbot starting up"
    );

    // -- Secrets ---------------------------------------------------------

    let forum_token = AppConfig::resolve_token(&cfg.forum.token_env)?;
    let tg_token = SecretString::new(AppConfig::resolve_env(&cfg.telegram.bot_token_env)?);
    let chat_id = cfg.resolve_chat_id()?;

    // -- Components ------------------------------------------------------

    let limiter = RateLimiter::new(cfg.forum.min_call_spacing());
    let api: Arc<dyn ForumApi> = Arc::new(ForumClient::new(
        &cfg.forum.api_base,
        forum_token,
        cfg.forum.timeout(),
        limiter,
    )?);
    let channel: Arc<dyn DeliveryChannel> = Arc::new(TelegramChannel::new(
        &cfg.telegram.api_base,
        tg_token,
        cfg.forum.timeout(),
    )?);

    let data_dir = &cfg.bot.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
    let settings = Arc::new(SettingsStore::new(Arc::new(JsonFileStore::<Settings>::new(
        data_dir.join(SETTINGS_FILE),
    ))));
    let watermark = WatermarkStore::new(Arc::new(JsonFileStore::<WatermarkDoc>::new(
        data_dir.join(WATERMARK_FILE),
    )));
    let registry = Arc::new(BumpRegistry::new(Arc::new(
        JsonFileStore::<Vec<BumpScheduleEntry>>::new(data_dir.join(BUMPS_FILE)),
    )));

    let poller = Arc::new(NotificationPoller::new(
        api.clone(),
        channel.clone(),
        MarkupExtractor::new(&cfg.forum.site_base, &cfg.forum.api_base),
        EventRenderer::with_offset_hours(cfg.bot.display_utc_offset_hours),
        watermark.clone(),
        settings.clone(),
        chat_id,
        cfg.poller.clone(),
    ));
    let scheduler = Arc::new(BumpScheduler::new(
        api,
        registry,
        channel.clone(),
        chat_id,
        &cfg.bumps,
    ));

    // -- Background loops ------------------------------------------------

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if cfg.poller.enabled {
        let poller = poller.clone();
        let cancel = cancel.clone();
        tasks.push(("poller", tokio::spawn(async move { poller.run(cancel).await })));
    } else {
        warn!("Notification poller disabled in config");
    }

    if cfg.bumps.enabled {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tasks.push(("bumper", tokio::spawn(async move { scheduler.run(cancel).await })));
    } else {
        warn!("Bump scheduler disabled in config");
    }

    if cfg.dashboard.enabled {
        match AppConfig::resolve_token(&cfg.dashboard.token_env) {
            Ok(auth_token) => {
                let state = Arc::new(DashboardState {
                    scheduler,
                    settings,
                    watermark,
                    channel,
                    chat_id,
                    started_at: chrono::Utc::now(),
                    auth_token,
                });
                let handle = dashboard::spawn_dashboard(
                    state,
                    &cfg.dashboard.bind,
                    cfg.dashboard.port,
                    cancel.clone(),
                )
                .await?;
                tasks.push(("dashboard", handle));
            }
            Err(e) => warn!(error = %e, "Dashboard disabled: no access token"),
        }
    }

    info!("Running. Press Ctrl+C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received.");
    cancel.cancel();

    for (name, handle) in tasks {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "Task ended abnormally");
        }
    }

    info!("lztbot shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lztbot=info"));

    let json_logging = std::env::var("LZTBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
