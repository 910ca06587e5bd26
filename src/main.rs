// ABOUTME: Main entry point for the Discord-MCP bridge
// ABOUTME: Initializes logging, config, Discord client, reply waiter, and API server

use anyhow::Result;
use futures_util::StreamExt;
use herald::{
    config::Config, discord::DiscordClient, server::AppState, ChatClient, RateLimiter,
    ReplyWaiter, ToolDispatcher,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Bridge crashed with the following error:         ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,serenity=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Discord-MCP Bridge");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!(
        host = %config.api.host,
        port = config.api.port,
        allowed_guilds = config.discord.allowed_guilds.len(),
        allowed_channels = config.discord.allowed_channels.len(),
        rate_limit = config.limits.max_requests,
        "Configuration loaded"
    );

    // Connect to Discord (REST auth plus spawned gateway task)
    let chat: Arc<dyn ChatClient> = Arc::new(DiscordClient::connect(&config.discord.token).await?);

    // Pump gateway events into the reply waiter
    let waiter = Arc::new(ReplyWaiter::new(chat.bot_user_id()));
    let mut events = chat.event_stream().await?;
    let pump_waiter = Arc::clone(&waiter);
    tokio::spawn(async move {
        while let Some(message) = events.next().await {
            pump_waiter.handle_event(&message);
        }
        tracing::warn!("Gateway event stream ended");
    });

    let dispatcher = ToolDispatcher::new(
        Arc::clone(&chat),
        config.access_scope(),
        Arc::clone(&waiter),
        config.dispatch_limits(),
    );

    let state = Arc::new(AppState {
        dispatcher,
        limiter: RateLimiter::new(config.limits.max_requests, config.rate_window()),
        api_key: config.api.api_key.clone(),
        chat,
    });

    herald::server::serve(&config.api.host, config.api.port, state).await
}
