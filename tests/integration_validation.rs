use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use media_gate_bot::bot::gate::{check_membership, GateOutcome};
use media_gate_bot::bot::transport::TelegramTransport;
use media_gate_bot::config::Settings;
use media_gate_bot::extractor::YtDlpExtractor;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::UserId;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::test]
#[ignore = "Requires real credentials"]
async fn test_credentials_validation() -> Result<()> {
    load_dotenv();
    init_tracing();

    info!("Starting integration test for credentials validation...");
    let settings = Settings::new().map_err(|e| anyhow!("configuration: {e}"))?;

    let bot = Bot::new(settings.telegram_token.clone());
    let me = bot.get_me().await?;
    info!("Telegram token belongs to @{}", me.username());

    // The bot must be able to see the channel's member list
    let transport = TelegramTransport::new(bot);
    let outcome = check_membership(&transport, &settings.channel(), me.id).await;
    if let GateOutcome::Unverifiable(reason) = outcome {
        return Err(anyhow!(
            "bot cannot query {}: {reason}",
            settings.required_channel
        ));
    }

    if let Some(user_id) = std::env::var("TEST_USER_ID")
        .ok()
        .and_then(|id| id.parse::<u64>().ok())
    {
        let outcome = check_membership(&transport, &settings.channel(), UserId(user_id)).await;
        info!("Membership of test user {user_id}: {outcome:?}");
    }

    info!("Credentials validation test passed successfully.");
    Ok(())
}

#[tokio::test]
#[ignore = "Requires yt-dlp on PATH"]
async fn test_ytdlp_available() -> Result<()> {
    load_dotenv();
    init_tracing();

    let settings = Settings::default();
    let version = YtDlpExtractor::from_settings(&settings)
        .probe()
        .await
        .ok_or_else(|| anyhow!("{} is not runnable", settings.ytdlp_binary))?;
    info!("yt-dlp version {version}");
    Ok(())
}

fn load_dotenv() {
    let env_path = Path::new("../.env");
    if env_path.exists() {
        let _ = dotenvy::from_path(env_path);
    } else {
        dotenv().ok();
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
