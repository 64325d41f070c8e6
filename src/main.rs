use dotenvy::dotenv;
use media_gate_bot::bot::transport::TelegramTransport;
use media_gate_bot::bot::{schema, BotController, ControllerConfig};
use media_gate_bot::config::Settings;
use media_gate_bot::extractor::YtDlpExtractor;
use media_gate_bot::session::SessionStore;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from logs
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .token_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        let output = self
            .token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        self.token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may be shorter or longer
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Compile redaction patterns before anything can log the token
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Media Gate Bot...");

    let settings = init_settings();
    init_downloads_dir(&settings).await;

    let extractor = Arc::new(YtDlpExtractor::from_settings(&settings));
    match extractor.probe().await {
        Some(version) => info!("Using {} {}", settings.ytdlp_binary, version),
        None => warn!(
            "{} is not available; every download will fail until it is installed",
            settings.ytdlp_binary
        ),
    }

    let bot = Bot::new(settings.telegram_token.clone());
    let controller: Arc<BotController> = Arc::new(BotController::new(
        Arc::new(TelegramTransport::new(bot.clone())),
        extractor,
        Arc::new(SessionStore::new()),
        ControllerConfig::from_settings(&settings),
    ));

    info!(channel = %settings.required_channel, "Bot is running...");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![controller])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("media_gate_bot=info,teloxide=warn,hyper=warn,reqwest=warn,tokio=warn")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_downloads_dir(settings: &Settings) {
    if let Err(e) = tokio::fs::create_dir_all(&settings.downloads_dir).await {
        error!(
            "Failed to create downloads directory {}: {}",
            settings.downloads_dir.display(),
            e
        );
        std::process::exit(1);
    }
    info!("Downloads directory: {}", settings.downloads_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_bot_token() {
        let patterns = RedactionPatterns::new().expect("patterns compile");
        let token = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1";

        let url =
            format!("error sending request for url (https://api.telegram.org/bot{token}/getMe)");
        let redacted = patterns.redact(&url);
        assert!(!redacted.contains(token), "{redacted}");
        assert!(redacted.contains("[TELEGRAM_TOKEN]"));

        let bare = patterns.redact(&format!("token={token}"));
        assert!(!bare.contains(token), "{bare}");
    }
}
