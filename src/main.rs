//! antidel binary
//!
//! Environment variables:
//! - ANTIDEL_CONFIG: optional JSON configuration file
//! - ANTIDEL_BOT_TOKEN: Telegram bot token
//! - ANTIDEL_CHAT_ID: destination chat or channel
//! - ANTIDEL_MEDIA_DIR: media cache directory (default: "media")
//! - RUST_LOG: log filter (default: "antidel=info")

use antidel::{Config, Relay, TelegramClient, run_with_shutdown};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "antidel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let relay = match start(config.clone()).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed to start");
            send_crash_notice(&config).await;
            return ExitCode::FAILURE;
        }
    };

    match run_with_shutdown(relay).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Shutdown failed");
            ExitCode::FAILURE
        }
    }
}

async fn start(config: Config) -> antidel::Result<Relay> {
    let relay = Relay::new(config).await?;
    relay.start().await?;
    Ok(relay)
}

/// Best effort: failures are only logged
async fn send_crash_notice(config: &Config) {
    if config.telegram.bot_token.is_empty() || config.telegram.chat_id.is_empty() {
        tracing::warn!("No Telegram credentials, crash notice not sent");
        return;
    }

    let result = match TelegramClient::new(&config.telegram) {
        Ok(client) => client.notify_crash().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to send crash notice");
    }
}
