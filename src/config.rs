//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the download defaults.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use teloxide::types::{ChatId, Recipient};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,

    /// Channel every user must be subscribed to (`@handle` or numeric id)
    #[serde(default)]
    pub required_channel: String,

    /// Invite link shown in the join prompt when the channel has no public handle
    pub channel_invite_link: Option<String>,

    /// Scratch directory for downloads
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Optional Netscape cookies file handed to yt-dlp
    pub cookies_file: Option<PathBuf>,

    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_binary")]
    pub ytdlp_binary: String,

    /// Upper bound for a single extraction
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Largest file (in MB) the bot will try to upload
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            required_channel: String::new(),
            channel_invite_link: None,
            downloads_dir: default_downloads_dir(),
            cookies_file: None,
            ytdlp_binary: default_ytdlp_binary(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOADS_DIR)
}

fn default_ytdlp_binary() -> String {
    DEFAULT_YTDLP_BINARY.to_string()
}

const fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

const fn default_max_upload_mb() -> u64 {
    DEFAULT_MAX_UPLOAD_MB
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if one of the sources cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `APP__REQUIRED_CHANNEL=@news ./target/app`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Bare UPPER_SNAKE_CASE variables; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_gate_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the bot token or
    /// required channel is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Older deployments export the token as BOT_TOKEN
        if settings.telegram_token.trim().is_empty() {
            if let Ok(val) = std::env::var("BOT_TOKEN") {
                settings.telegram_token = val;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings that have no usable default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` naming the first missing key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::NotFound("telegram_token".to_string()));
        }
        if self.required_channel.trim().is_empty() {
            return Err(ConfigError::NotFound("required_channel".to_string()));
        }
        Ok(())
    }

    /// Parsed reference to the required channel
    #[must_use]
    pub fn channel(&self) -> ChannelRef {
        ChannelRef::parse(&self.required_channel)
    }

    /// URL of the join button, if one can be built
    #[must_use]
    pub fn join_link(&self) -> Option<String> {
        self.channel_invite_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(ToString::to_string)
            .or_else(|| self.channel().public_link())
    }

    /// Extraction timeout as a `Duration`
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Upload ceiling in bytes
    #[must_use]
    pub const fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

/// Reference to the channel users must join.
///
/// The configured value is kept opaque: numeric values address the channel by
/// id, anything else by public username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Numeric chat id, e.g. `-1001234567890`
    Id(ChatId),
    /// Public username including the leading `@`
    Username(String),
}

impl ChannelRef {
    /// Parse a configured channel reference
    ///
    /// # Examples
    ///
    /// ```
    /// use media_gate_bot::config::ChannelRef;
    ///
    /// assert_eq!(
    ///     ChannelRef::parse("news"),
    ///     ChannelRef::Username("@news".to_string())
    /// );
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Self::Id(ChatId(id));
        }
        if raw.starts_with('@') {
            Self::Username(raw.to_string())
        } else {
            Self::Username(format!("@{raw}"))
        }
    }

    /// `t.me` link for channels with a public username
    #[must_use]
    pub fn public_link(&self) -> Option<String> {
        match self {
            Self::Id(_) => None,
            Self::Username(name) => Some(format!("https://t.me/{}", name.trim_start_matches('@'))),
        }
    }
}

impl From<&ChannelRef> for Recipient {
    fn from(channel: &ChannelRef) -> Self {
        match channel {
            ChannelRef::Id(id) => Self::Id(*id),
            ChannelRef::Username(name) => Self::ChannelUsername(name.clone()),
        }
    }
}

/// Default scratch directory, relative to the working directory
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
/// Default extraction executable
pub const DEFAULT_YTDLP_BINARY: &str = "yt-dlp";
/// Default extraction timeout in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600; // 10 minutes
/// Bot API upload limit for bots on the public server
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;
/// Longest error description forwarded to a chat
pub const MAX_ERROR_DESCRIPTION_CHARS: usize = 500;

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(token: &str, channel: &str) -> Settings {
        Settings {
            telegram_token: token.to_string(),
            required_channel: channel.to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!(
            ChannelRef::parse("@bigboss_community"),
            ChannelRef::Username("@bigboss_community".to_string())
        );
        assert_eq!(
            ChannelRef::parse(" bigboss_community "),
            ChannelRef::Username("@bigboss_community".to_string())
        );
        assert_eq!(
            ChannelRef::parse("-1001234567890"),
            ChannelRef::Id(ChatId(-1_001_234_567_890))
        );
    }

    #[test]
    fn test_join_link() {
        let s = settings("dummy", "@news");
        assert_eq!(s.join_link().as_deref(), Some("https://t.me/news"));

        // Numeric channels need an explicit invite link
        let mut s = settings("dummy", "-100200300");
        assert_eq!(s.join_link(), None);
        s.channel_invite_link = Some("https://t.me/+abcdef".to_string());
        assert_eq!(s.join_link().as_deref(), Some("https://t.me/+abcdef"));

        // Blank invite link falls back to the handle
        let mut s = settings("dummy", "@news");
        s.channel_invite_link = Some("  ".to_string());
        assert_eq!(s.join_link().as_deref(), Some("https://t.me/news"));
    }

    #[test]
    fn test_validate_requires_token_and_channel() {
        assert!(settings("dummy", "@news").validate().is_ok());
        assert!(matches!(
            settings("  ", "@news").validate(),
            Err(ConfigError::NotFound(key)) if key == "telegram_token"
        ));
        assert!(matches!(
            settings("dummy", "").validate(),
            Err(ConfigError::NotFound(key)) if key == "required_channel"
        ));
    }

    #[test]
    fn test_limits() {
        let mut s = settings("dummy", "@news");
        s.max_upload_mb = 2;
        s.download_timeout_secs = 30;
        assert_eq!(s.max_upload_bytes(), 2 * 1024 * 1024);
        assert_eq!(s.download_timeout(), Duration::from_secs(30));
    }
}
