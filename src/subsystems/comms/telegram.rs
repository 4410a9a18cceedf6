//! Telegram comms channel — receives updates via the Bot API, relays text to
//! the chat agent and sends the reply chunks back to the same chat.
//!
//! Updates arrive either by long polling or, on a hosted deployment, by a
//! webhook served from an embedded axum listener. Both modes drop updates
//! that queued up while the bot was offline.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use teloxide::update_listeners::{Polling, webhooks};
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeliveryMode;
use crate::error::AppError;
use crate::subsystems::memory::UserId;
use crate::subsystems::runtime::{Component, ComponentFuture};
use super::state::CommsState;

/// Used in `/start` when Telegram does not tell us who is talking.
const FALLBACK_NAME: &str = "there";

// ── Commands ─────────────────────────────────────────────────────────────────

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "clear the conversation history")]
    Reset,
}

// ── TelegramChannel ──────────────────────────────────────────────────────────

pub struct TelegramChannel {
    channel_id: String,
    state: Arc<CommsState>,
    token: String,
    delivery: DeliveryMode,
}

impl TelegramChannel {
    pub fn new(
        channel_id: impl Into<String>,
        state: Arc<CommsState>,
        token: String,
        delivery: DeliveryMode,
    ) -> Self {
        Self { channel_id: channel_id.into(), state, token, delivery }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.channel_id, self.state, self.token, self.delivery, shutdown))
    }
}

// ── Handler tree ─────────────────────────────────────────────────────────────

/// `/start` and `/reset` go to [`on_command`]; plain text (anything that
/// does not start with `/`) goes to [`on_text`]. Everything else is dropped.
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(on_command))
        .branch(dptree::filter(|msg: Message| is_plain_text(&msg)).endpoint(on_text))
}

fn is_plain_text(msg: &Message) -> bool {
    msg.text().is_some_and(|t| !t.starts_with('/'))
}

fn sender(msg: &Message) -> Option<(UserId, &str)> {
    msg.from.as_ref().map(|u| (UserId(u.id.0), u.first_name.as_str()))
}

async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    channel_id: Arc<str>,
    state: Arc<CommsState>,
) -> ResponseResult<()> {
    let Some((user_id, first_name)) = sender(&msg) else {
        debug!(%channel_id, "command without sender ignored");
        return Ok(());
    };

    let reply = match cmd {
        Command::Start => {
            let name = if first_name.is_empty() { FALLBACK_NAME } else { first_name };
            state.welcome(user_id, name)
        }
        Command::Reset => state.reset(user_id).await,
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn on_text(
    bot: Bot,
    msg: Message,
    channel_id: Arc<str>,
    state: Arc<CommsState>,
) -> ResponseResult<()> {
    let (Some((user_id, _)), Some(text)) = (sender(&msg), msg.text()) else {
        return Ok(());
    };
    debug!(%channel_id, %user_id, chars = text.chars().count(), "telegram received message");

    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        warn!(%channel_id, "failed to send typing action: {e}");
    }

    for chunk in state.send_message(&channel_id, user_id, text).await {
        bot.send_message(msg.chat.id, chunk).await?;
    }
    Ok(())
}

// ── run_telegram ─────────────────────────────────────────────────────────────

async fn run_telegram(
    channel_id: String,
    state: Arc<CommsState>,
    token: String,
    delivery: DeliveryMode,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, mode = delivery.label(), "telegram channel starting");

    let bot = Bot::new(token);
    let id: Arc<str> = Arc::from(channel_id.as_str());

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![id, state])
        .default_handler(|upd| async move {
            debug!(update_id = ?upd.id, "unhandled telegram update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram handler failed"))
        .build();

    let serve = async {
        match delivery {
            DeliveryMode::Polling => {
                let listener = Polling::builder(bot).drop_pending_updates().build();
                dispatcher
                    .dispatch_with_listener(
                        listener,
                        LoggingErrorHandler::with_custom_text("telegram polling error"),
                    )
                    .await;
            }
            DeliveryMode::Webhook { listen, url } => {
                let url: reqwest::Url = url
                    .parse()
                    .map_err(|e| AppError::Config(format!("invalid webhook url '{url}': {e}")))?;
                info!(%listen, %url, "registering telegram webhook");
                let options = webhooks::Options::new(listen, url).drop_pending_updates();
                let listener = webhooks::axum(bot, options)
                    .await
                    .map_err(|e| AppError::Comms(format!("webhook setup failed: {e}")))?;
                dispatcher
                    .dispatch_with_listener(
                        listener,
                        LoggingErrorHandler::with_custom_text("telegram webhook error"),
                    )
                    .await;
            }
        }
        Ok::<(), AppError>(())
    };

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received — closing telegram channel");
        }
        res = serve => {
            res?;
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
        }
    }

    Ok(())
}
