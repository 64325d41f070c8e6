//! Per-chat session store
//!
//! Holds the link each chat is about to download and tracks which chats have
//! a download in flight. Keyed by chat id only, so nothing leaks between
//! chats that share a user.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use teloxide::types::ChatId;
use tokio::sync::RwLock;
use tracing::debug;

/// Conversation state of a single chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    /// Link waiting for a format choice
    pub pending_url: Option<String>,
}

/// Process-wide table of chat sessions.
///
/// Shared between handlers behind an `Arc`; it is the only writer of
/// session state.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ChatId, ChatSession>>,
    in_flight: Arc<Mutex<HashSet<ChatId>>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `url` as the pending link for `chat_id`, replacing any previous one
    pub async fn set_pending_url(&self, chat_id: ChatId, url: impl Into<String>) {
        let url = url.into();
        debug!(chat_id = chat_id.0, url = %url, "Storing pending link");
        let mut sessions = self.sessions.write().await;
        sessions.entry(chat_id).or_default().pending_url = Some(url);
    }

    /// Current pending link, if any
    pub async fn pending_url(&self, chat_id: ChatId) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&chat_id)
            .and_then(|session| session.pending_url.clone())
    }

    /// Remove and return the pending link, returning the chat to idle
    pub async fn take_pending_url(&self, chat_id: ChatId) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let url = sessions
            .get_mut(&chat_id)
            .and_then(|session| session.pending_url.take());
        if sessions
            .get(&chat_id)
            .is_some_and(|session| session.pending_url.is_none())
        {
            sessions.remove(&chat_id);
        }
        url
    }

    /// Mark a download as running for `chat_id`.
    ///
    /// Returns `None` if one is already running. The returned guard clears
    /// the mark when dropped, on every exit path.
    #[must_use]
    pub fn try_begin_download(&self, chat_id: ChatId) -> Option<DownloadGuard> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(chat_id) {
            return None;
        }
        Some(DownloadGuard {
            chat_id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Check if a download is currently running for this chat
    #[must_use]
    pub fn is_downloading(&self, chat_id: ChatId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&chat_id)
    }
}

/// Marks a chat as busy for as long as it lives
#[derive(Debug)]
pub struct DownloadGuard {
    chat_id: ChatId,
    in_flight: Arc<Mutex<HashSet<ChatId>>>,
}

impl DownloadGuard {
    /// Chat this guard belongs to
    #[must_use]
    pub const fn chat_id(&self) -> ChatId {
        self.chat_id
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.chat_id);
    }
}
