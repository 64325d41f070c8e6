//! Telegram update routing
//!
//! Maps commands, plain text, and button presses onto the interaction
//! controller. Failures are logged here and never reach the dispatcher.

use super::controller::InteractionController;
use super::transport::TelegramTransport;
use super::views;
use crate::extractor::YtDlpExtractor;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, warn};

/// Controller wired to Telegram and yt-dlp
pub type BotController = InteractionController<TelegramTransport, YtDlpExtractor>;

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Start the bot and show instructions
    #[command(description = "Start the bot.")]
    Start,
    /// Show instructions again
    #[command(description = "How to use the bot.")]
    Help,
}

/// Whether a text message should be treated as a possible link
fn is_plain_text(msg: &Message) -> bool {
    msg.text().is_some_and(|text| !text.starts_with('/'))
}

/// Build the update routing tree
#[must_use]
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::filter(|msg: Message| is_plain_text(&msg)).endpoint(handle_text)),
        )
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    controller: Arc<BotController>,
) -> Result<(), teloxide::RequestError> {
    let Some(user) = msg.from.as_ref() else {
        return respond(());
    };

    let res = match cmd {
        Command::Start | Command::Help => controller.handle_start(msg.chat.id, user.id).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    msg: Message,
    controller: Arc<BotController>,
) -> Result<(), teloxide::RequestError> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return respond(());
    };

    if let Err(e) = controller
        .handle_incoming_text(msg.chat.id, user.id, text)
        .await
    {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    controller: Arc<BotController>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }

    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        return respond(());
    };
    if !views::is_format_choice(data) {
        debug!(data = %data, "Ignoring unknown callback");
        return respond(());
    }

    let chat_id = message.chat().id;
    let message_id = message.id();
    let tag = data.to_string();

    // Downloads can take minutes; keep the dispatcher free for this chat's
    // next update so a double press is turned away instead of queued.
    tokio::spawn(async move {
        if let Err(e) = controller
            .handle_format_choice(chat_id, message_id, &tag)
            .await
        {
            error!("Format choice handler error: {}", e);
        }
    });

    respond(())
}
