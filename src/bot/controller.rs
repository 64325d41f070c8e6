//! Interaction controller
//!
//! Drives the per-chat workflow: link → format choice → delivery. A chat is
//! idle until a link is stored, waits for a format choice while it has one,
//! and is idle again once the choice has been handled, whatever the outcome.

use super::gate::{check_membership, GateOutcome};
use super::transport::ChatTransport;
use super::views;
use crate::config::{ChannelRef, Settings};
use crate::extractor::{DownloadedMedia, MediaExtractor, MediaFormat, MediaRequest};
use crate::session::SessionStore;
use crate::utils::parse_link;
use anyhow::Result;
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId, UserId};
use tracing::{error, info, warn};

/// Runtime options for the controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Channel users must be subscribed to
    pub channel: ChannelRef,
    /// URL of the join button, if any
    pub join_link: Option<String>,
    /// Largest file that will be uploaded
    pub max_upload_bytes: u64,
}

impl ControllerConfig {
    /// Derive controller options from application settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            channel: settings.channel(),
            join_link: settings.join_link(),
            max_upload_bytes: settings.max_upload_bytes(),
        }
    }
}

/// Owns the session table and runs the three user-facing operations.
///
/// Generic over the transport and extractor so the workflow can run against
/// fakes in tests.
pub struct InteractionController<T: ?Sized, E: ?Sized> {
    transport: Arc<T>,
    extractor: Arc<E>,
    sessions: Arc<SessionStore>,
    config: ControllerConfig,
}

impl<T, E> InteractionController<T, E>
where
    T: ChatTransport + ?Sized,
    E: MediaExtractor + ?Sized,
{
    /// Create a controller over the given collaborators
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        extractor: Arc<E>,
        sessions: Arc<SessionStore>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            transport,
            extractor,
            sessions,
            config,
        }
    }

    /// Session table used by this controller
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    async fn send_join_prompt(&self, chat_id: ChatId) -> Result<()> {
        match self.config.join_link.as_deref().and_then(views::join_keyboard) {
            Some(keyboard) => {
                self.transport
                    .send_with_buttons(chat_id, views::JOIN_PROMPT, keyboard)
                    .await?;
            }
            None => self.transport.send_text(chat_id, views::JOIN_PROMPT).await?,
        }
        Ok(())
    }

    /// `/start`: greet subscribers, point everyone else at the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be sent.
    pub async fn handle_start(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        info!(chat_id = chat_id.0, user_id = user_id.0, "User initiated /start command.");

        match check_membership(self.transport.as_ref(), &self.config.channel, user_id).await {
            GateOutcome::Subscribed => {
                self.transport.send_text(chat_id, views::WELCOME).await?;
            }
            GateOutcome::NotSubscribed => self.send_join_prompt(chat_id).await?,
            GateOutcome::Unverifiable(_) => {
                self.transport
                    .send_text(chat_id, views::START_UNVERIFIABLE)
                    .await?;
            }
        }
        Ok(())
    }

    /// Free text: store a link and offer the format buttons.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be sent.
    pub async fn handle_incoming_text(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
    ) -> Result<()> {
        match check_membership(self.transport.as_ref(), &self.config.channel, user_id).await {
            GateOutcome::Subscribed => {}
            GateOutcome::NotSubscribed => return self.send_join_prompt(chat_id).await,
            GateOutcome::Unverifiable(_) => {
                self.transport.send_text(chat_id, views::UNVERIFIABLE).await?;
                return Ok(());
            }
        }

        let Some(url) = parse_link(text) else {
            info!(chat_id = chat_id.0, "Rejected text that is not a link");
            self.transport.send_text(chat_id, views::INVALID_LINK).await?;
            return Ok(());
        };

        self.sessions.set_pending_url(chat_id, url).await;
        self.transport
            .send_with_buttons(chat_id, views::CHOOSE_FORMAT, views::format_keyboard())
            .await?;
        Ok(())
    }

    /// Format button: download the pending link and send the file back.
    ///
    /// Only one download runs per chat; a second press while one is running
    /// is turned away without touching the pending link.
    ///
    /// # Errors
    ///
    /// Returns an error if a status message cannot be sent. Extraction and
    /// upload failures are reported to the chat instead.
    pub async fn handle_format_choice(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        choice_tag: &str,
    ) -> Result<()> {
        let Some(_guard) = self.sessions.try_begin_download(chat_id) else {
            info!(chat_id = chat_id.0, "Format choice ignored: download already running");
            self.transport.send_text(chat_id, views::DOWNLOAD_BUSY).await?;
            return Ok(());
        };

        let Some(url) = self.sessions.take_pending_url(chat_id).await else {
            info!(chat_id = chat_id.0, "Format choice without a pending link");
            self.transport
                .edit_text(chat_id, message_id, views::SEND_LINK_AGAIN)
                .await?;
            return Ok(());
        };

        let format = views::choice_format(choice_tag);
        info!(chat_id = chat_id.0, url = %url, format = format.label(), "Starting download");

        if let Err(e) = self
            .transport
            .edit_text(chat_id, message_id, &views::downloading(format))
            .await
        {
            warn!(chat_id = chat_id.0, error = %e, "Failed to show download progress");
        }

        let media = match self.extractor.fetch(MediaRequest { url, format }).await {
            Ok(media) => media,
            Err(e) => {
                warn!(chat_id = chat_id.0, error = %e, "Extraction failed");
                self.transport
                    .send_text(chat_id, &views::download_failed(&e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let delivery = self.deliver(chat_id, &media, format).await;

        if let Err(e) = media.discard().await {
            error!(chat_id = chat_id.0, error = %e, "Failed to remove downloaded file");
        }

        if let Err(reason) = delivery {
            self.transport.send_text(chat_id, &reason).await?;
        }
        Ok(())
    }

    /// Upload the file. On failure returns the text to show the user.
    async fn deliver(
        &self,
        chat_id: ChatId,
        media: &DownloadedMedia,
        format: MediaFormat,
    ) -> std::result::Result<(), String> {
        let size = media
            .size()
            .await
            .map_err(|e| views::delivery_failed(&e.to_string()))?;
        if size > self.config.max_upload_bytes {
            warn!(chat_id = chat_id.0, size, "Downloaded file exceeds upload limit");
            return Err(views::file_too_large(
                size,
                self.config.max_upload_bytes / 1024 / 1024,
            ));
        }

        let caption = views::caption(media.title(), format);
        let sent = if format.is_audio() {
            self.transport.send_audio(chat_id, media, &caption).await
        } else {
            self.transport.send_video(chat_id, media, &caption).await
        };

        match sent {
            Ok(()) => {
                info!(chat_id = chat_id.0, title = %media.title(), "File delivered");
                Ok(())
            }
            Err(e) => {
                warn!(chat_id = chat_id.0, error = %e, "Failed to deliver file");
                Err(views::delivery_failed(&e.to_string()))
            }
        }
    }
}
