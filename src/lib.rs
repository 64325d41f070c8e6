#![deny(missing_docs)]
//! Media Gate Bot
//!
//! A Telegram bot that downloads audio or video from a pasted link and sends
//! the file back, for subscribers of a required channel only.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Media extraction (yt-dlp)
pub mod extractor;
/// Per-chat session state
pub mod session;
/// Utility functions
pub mod utils;

#[cfg(test)]
pub mod testing;
