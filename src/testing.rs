//! Testing helpers and fake collaborators.
//!
//! Provides a transport that records every outbound call instead of talking
//! to Telegram.

use crate::bot::gate::MembershipStatus;
use crate::bot::transport::{ChatTransport, TransportError};
use crate::config::ChannelRef;
use crate::extractor::DownloadedMedia;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use teloxide::types::{ChatId, InlineKeyboardButtonKind, InlineKeyboardMarkup, MessageId, UserId};

/// One call made through [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain text message
    Text(ChatId, String),
    /// Text with inline buttons; holds each button's callback data or URL
    Buttons(ChatId, String, Vec<String>),
    /// Edited message text
    Edit(ChatId, MessageId, String),
    /// Audio upload with its caption
    Audio(ChatId, String),
    /// Video upload with its caption
    Video(ChatId, String),
}

/// Fake transport with a fixed membership answer.
pub struct RecordingTransport {
    membership: Result<MembershipStatus, String>,
    fail_uploads: bool,
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    /// Every membership query returns `status`
    #[must_use]
    pub fn with_status(status: MembershipStatus) -> Self {
        Self {
            membership: Ok(status),
            fail_uploads: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every membership query fails with `reason`
    #[must_use]
    pub fn with_membership_error(reason: &str) -> Self {
        Self {
            membership: Err(reason.to_string()),
            fail_uploads: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Make audio and video uploads fail
    #[must_use]
    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Calls recorded so far
    #[must_use]
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: Outbound) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn upload(&self, media: &DownloadedMedia, call: Outbound) -> Result<(), TransportError> {
        assert!(media.path().exists(), "uploaded file must exist");
        if self.fail_uploads {
            return Err(TransportError::Rejected("Request Entity Too Large".to_string()));
        }
        self.record(call);
        Ok(())
    }
}

fn button_targets(keyboard: &InlineKeyboardMarkup) -> Vec<String> {
    keyboard
        .inline_keyboard
        .iter()
        .flatten()
        .map(|button| match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
            InlineKeyboardButtonKind::Url(url) => url.to_string(),
            other => format!("{other:?}"),
        })
        .collect()
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn membership(
        &self,
        _channel: &ChannelRef,
        _user_id: UserId,
    ) -> Result<MembershipStatus, TransportError> {
        self.membership
            .clone()
            .map_err(TransportError::Rejected)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.record(Outbound::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_with_buttons(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TransportError> {
        self.record(Outbound::Buttons(
            chat_id,
            text.to_string(),
            button_targets(&keyboard),
        ));
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        self.record(Outbound::Edit(chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError> {
        self.upload(media, Outbound::Audio(chat_id, caption.to_string()))
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError> {
        self.upload(media, Outbound::Video(chat_id, caption.to_string()))
    }
}
