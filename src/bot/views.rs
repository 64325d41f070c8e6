//! User-facing texts and keyboards
//!
//! Contains every message the bot sends, plus the inline keyboards and their
//! callback tags.

use crate::extractor::MediaFormat;
use crate::utils::truncate_str;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Callback data for the MP3 button
pub const CALLBACK_DOWNLOAD_MP3: &str = "download_mp3";
/// Callback data for the MP4 button
pub const CALLBACK_DOWNLOAD_MP4: &str = "download_mp4";

// ─────────────────────────────────────────────────────────────────────────────
// Texts
// ─────────────────────────────────────────────────────────────────────────────

/// Instructions for subscribed users
pub const WELCOME: &str = "✅ Send me a YouTube / TikTok / Facebook link.";
/// Shown to users outside the required channel
pub const JOIN_PROMPT: &str = "🚫 Please join the channel first!";
/// `/start` when membership cannot be checked
pub const START_UNVERIFIABLE: &str =
    "⚠️ Unable to verify your subscription. Please join the channel first.";
/// Incoming text when membership cannot be checked
pub const UNVERIFIABLE: &str = "⚠️ Unable to verify your subscription right now.";
/// Text that is not a link
pub const INVALID_LINK: &str = "❗ Please send a valid link (it must start with http).";
/// Prompt above the format buttons
pub const CHOOSE_FORMAT: &str = "🔽 Choose a download format:";
/// Button pressed with no stored link
pub const SEND_LINK_AGAIN: &str = "❗ Please send the link again.";
/// Button pressed while a download is already running
pub const DOWNLOAD_BUSY: &str =
    "⏳ A download is already running in this chat. Please wait for it to finish.";

/// Label of the join button
pub const JOIN_BUTTON: &str = "📢 Join Channel";
/// Label of the MP3 button
pub const MP3_BUTTON: &str = "🎧 Download MP3";
/// Label of the MP4 button
pub const MP4_BUTTON: &str = "📹 Download MP4";

/// Telegram caption limit
const CAPTION_LIMIT: usize = 1024;

/// Progress text shown in place of the format buttons
#[must_use]
pub fn downloading(format: MediaFormat) -> String {
    format!("📥 Downloading {}...", format.label())
}

/// Caption attached to the delivered file
///
/// # Examples
///
/// ```
/// use media_gate_bot::bot::views::caption;
/// use media_gate_bot::extractor::MediaFormat;
///
/// assert_eq!(caption("X", MediaFormat::Mp4), "✅ Title: X\n📁 Format: MP4");
/// ```
#[must_use]
pub fn caption(title: &str, format: MediaFormat) -> String {
    // Leave room for the surrounding text
    let title = truncate_str(title, CAPTION_LIMIT - 64);
    format!("✅ Title: {title}\n📁 Format: {}", format.label())
}

/// Extraction failed
#[must_use]
pub fn download_failed(reason: &str) -> String {
    format!("❌ Download failed: {reason}")
}

/// Upload failed
#[must_use]
pub fn delivery_failed(reason: &str) -> String {
    format!("❌ Could not send the file: {reason}")
}

/// File exceeds the upload ceiling
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn file_too_large(size_bytes: u64, limit_mb: u64) -> String {
    let size_mb = size_bytes as f64 / 1024.0 / 1024.0;
    format!("❌ The file is too large to send ({size_mb:.1} MB, limit {limit_mb} MB).")
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Format for a callback tag: MP3 for the MP3 tag, MP4 for anything else
#[must_use]
pub fn choice_format(tag: &str) -> MediaFormat {
    if tag == CALLBACK_DOWNLOAD_MP3 {
        MediaFormat::Mp3
    } else {
        MediaFormat::Mp4
    }
}

/// Whether a callback tag belongs to the format keyboard
#[must_use]
pub fn is_format_choice(tag: &str) -> bool {
    tag == CALLBACK_DOWNLOAD_MP3 || tag == CALLBACK_DOWNLOAD_MP4
}

/// Create the format selection keyboard
///
/// # Examples
///
/// ```
/// use media_gate_bot::bot::views::format_keyboard;
/// let keyboard = format_keyboard();
/// assert_eq!(keyboard.inline_keyboard.len(), 2);
/// ```
#[must_use]
pub fn format_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            MP3_BUTTON,
            CALLBACK_DOWNLOAD_MP3,
        )],
        vec![InlineKeyboardButton::callback(
            MP4_BUTTON,
            CALLBACK_DOWNLOAD_MP4,
        )],
    ])
}

/// Keyboard with a single join button, if `link` is a valid URL
#[must_use]
pub fn join_keyboard(link: &str) -> Option<InlineKeyboardMarkup> {
    let url = link.parse().ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::url(JOIN_BUTTON, url),
    ]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_choice_format() {
        assert_eq!(choice_format(CALLBACK_DOWNLOAD_MP3), MediaFormat::Mp3);
        assert_eq!(choice_format(CALLBACK_DOWNLOAD_MP4), MediaFormat::Mp4);
        assert!(is_format_choice(CALLBACK_DOWNLOAD_MP4));
        assert!(!is_format_choice("something_else"));
    }

    #[test]
    fn test_format_keyboard_tags() {
        let keyboard = format_keyboard();
        let tags: Vec<String> = keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec![CALLBACK_DOWNLOAD_MP3, CALLBACK_DOWNLOAD_MP4]);
    }

    #[test]
    fn test_join_keyboard() {
        let keyboard = join_keyboard("https://t.me/news").expect("valid link");
        assert_eq!(keyboard.inline_keyboard[0][0].text, JOIN_BUTTON);
        assert!(join_keyboard("not a url").is_none());
    }

    #[test]
    fn test_texts() {
        assert_eq!(downloading(MediaFormat::Mp3), "📥 Downloading MP3...");
        assert_eq!(
            caption("X", MediaFormat::Mp4),
            "✅ Title: X\n📁 Format: MP4"
        );
        assert!(download_failed("unsupported site").contains("unsupported site"));
        assert!(file_too_large(60 * 1024 * 1024, 50).contains("60.0 MB"));
    }

    #[test]
    fn test_caption_is_bounded() {
        let long_title = "t".repeat(5000);
        assert!(caption(&long_title, MediaFormat::Mp3).chars().count() <= CAPTION_LIMIT);
    }
}
