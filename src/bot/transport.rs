//! Messaging transport seam
//!
//! The controller talks to Telegram only through [`ChatTransport`], which
//! keeps the workflow testable without a live bot.

use super::gate::MembershipStatus;
use crate::config::ChannelRef;
use crate::extractor::DownloadedMedia;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, ChatMemberStatus, InlineKeyboardMarkup, InputFile, MessageId, Recipient, UserId,
};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::debug;

/// Errors raised by transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    /// Telegram API or network failure
    #[error("Telegram error: {0}")]
    Telegram(#[from] RequestError),
    /// Local file could not be read for upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Operation refused for any other reason
    #[error("{0}")]
    Rejected(String),
}

/// Outbound operations the controller needs from the messaging platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Look up `user_id` in `channel`
    async fn membership(
        &self,
        channel: &ChannelRef,
        user_id: UserId,
    ) -> Result<MembershipStatus, TransportError>;

    /// Send a plain text message
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;

    /// Send a text message with an inline keyboard
    async fn send_with_buttons(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TransportError>;

    /// Replace the text of an existing message
    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Upload a file as an audio attachment
    async fn send_audio(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError>;

    /// Upload a file as a video attachment
    async fn send_video(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError>;
}

/// [`ChatTransport`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot instance
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn membership_from_status(status: ChatMemberStatus) -> MembershipStatus {
    match status {
        ChatMemberStatus::Owner => MembershipStatus::Creator,
        ChatMemberStatus::Administrator => MembershipStatus::Administrator,
        ChatMemberStatus::Member => MembershipStatus::Member,
        _ => MembershipStatus::Other,
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn membership(
        &self,
        channel: &ChannelRef,
        user_id: UserId,
    ) -> Result<MembershipStatus, TransportError> {
        match self
            .bot
            .get_chat_member(Recipient::from(channel), user_id)
            .await
        {
            Ok(member) => Ok(membership_from_status(member.kind.status())),
            // The channel resolved but has never seen this user
            Err(RequestError::Api(ApiError::UserNotFound)) => Ok(MembershipStatus::Other),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }

    async fn send_with_buttons(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), TransportError> {
        self.bot
            .send_message(chat_id, text)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        match self.bot.edit_message_text(chat_id, message_id, text).await {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!("Message update skipped: message is not modified");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError> {
        let file = InputFile::file(media.path()).file_name(media.file_name());
        self.bot
            .send_audio(chat_id, file)
            .title(media.title())
            .caption(caption)
            .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        caption: &str,
    ) -> Result<(), TransportError> {
        let file = InputFile::file(media.path()).file_name(media.file_name());
        self.bot
            .send_video(chat_id, file)
            .caption(caption)
            .supports_streaming(true)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            membership_from_status(ChatMemberStatus::Owner),
            MembershipStatus::Creator
        );
        assert_eq!(
            membership_from_status(ChatMemberStatus::Administrator),
            MembershipStatus::Administrator
        );
        assert_eq!(
            membership_from_status(ChatMemberStatus::Member),
            MembershipStatus::Member
        );
        for status in [
            ChatMemberStatus::Restricted,
            ChatMemberStatus::Left,
            ChatMemberStatus::Banned,
        ] {
            assert_eq!(membership_from_status(status), MembershipStatus::Other);
        }
    }
}
