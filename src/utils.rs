//! Utility functions for text processing of user input and tool output.
//!
//! Patterns are declared with `lazy_regex!` so they are validated at compile
//! time and built on first use.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Match ANSI escape sequences (colors, cursor movement)
static RE_ANSI: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\x1b\[[0-9;?]*[A-Za-z]");

/// Scheme prefix a message must start with to be treated as a link
pub const LINK_PREFIX: &str = "http";

/// Return the trimmed link if `text` looks like one.
///
/// Only the scheme prefix is checked; the extractor decides whether the site
/// is actually supported.
///
/// # Examples
///
/// ```
/// use media_gate_bot::utils::parse_link;
/// assert_eq!(parse_link("  https://youtu.be/x \n"), Some("https://youtu.be/x"));
/// assert_eq!(parse_link("not a link"), None);
/// ```
#[must_use]
pub fn parse_link(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    trimmed.starts_with(LINK_PREFIX).then_some(trimmed)
}

/// Truncates a string to a maximum number of characters (not bytes).
///
/// # Examples
///
/// ```
/// use media_gate_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Remove ANSI escape sequences from process output
#[must_use]
pub fn strip_ansi(s: &str) -> String {
    RE_ANSI.replace_all(s, "").to_string()
}

/// Pick the human-readable error out of yt-dlp's stderr.
///
/// `ERROR:` lines win; otherwise the last non-empty line is used. The result
/// is capped at `max_chars`.
#[must_use]
pub fn error_description(stderr: &str, max_chars: usize) -> String {
    let clean = strip_ansi(stderr);
    let errors: Vec<&str> = clean
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();

    let description = if errors.is_empty() {
        clean
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .unwrap_or("unknown error")
            .to_string()
    } else {
        errors.join("\n")
    };

    let truncated = truncate_str(&description, max_chars);
    if truncated.len() < description.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_parse_link() {
        assert_eq!(
            parse_link("https://example.com/v"),
            Some("https://example.com/v")
        );
        assert_eq!(parse_link("\thttp://a.b  "), Some("http://a.b"));
        assert_eq!(parse_link("not a link"), None);
        assert_eq!(parse_link("ftp://example.com"), None);
        assert_eq!(parse_link("   "), None);
        // Case-sensitive, like the scheme check it mirrors
        assert_eq!(parse_link("HTTPS://example.com"), None);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(
            strip_ansi("\x1b[0;31mERROR:\x1b[0m Unsupported URL"),
            "ERROR: Unsupported URL"
        );
    }

    #[test]
    fn test_error_description_prefers_error_lines() {
        let stderr = concat!(
            "[generic] Extracting URL\n",
            "WARNING: something\n",
            "\x1b[0;31mERROR:\x1b[0m [generic] Unsupported URL: https://x.y\n",
        );
        assert_eq!(
            error_description(stderr, 500),
            "ERROR: [generic] Unsupported URL: https://x.y"
        );
    }

    #[test]
    fn test_error_description_falls_back_to_last_line() {
        assert_eq!(error_description("first\nsecond\n\n", 500), "second");
        assert_eq!(error_description("", 500), "unknown error");
    }

    #[test]
    fn test_error_description_truncates() {
        let long = format!("ERROR: {}", "x".repeat(100));
        let out = error_description(&long, 10);
        assert_eq!(out, "ERROR: xxx...");
    }
}
