//! Telegram command surface.
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

pub mod commands;
pub mod legacy;
mod replies;

use crate::config::SettingsLayout;
use crate::state::AppState;
use commands::Command;
use legacy::LegacyCommand;

async fn reply_all(bot: &Bot, chat: ChatId, replies: Vec<String>) -> ResponseResult<()> {
    for text in replies {
        bot.send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

async fn on_command(bot: Bot, msg: Message, cmd: Command, state: Arc<AppState>) -> ResponseResult<()> {
    info!(command = ?cmd, "Handling command.");
    reply_all(&bot, msg.chat.id, commands::handle(&state, cmd).await).await
}

async fn on_legacy_command(
    bot: Bot,
    msg: Message,
    cmd: LegacyCommand,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    info!(command = ?cmd, "Handling command.");
    reply_all(&bot, msg.chat.id, legacy::handle(&state, cmd).await).await
}

/// Messages from any chat but `chat` are ignored.
fn schema(chat: ChatId, layout: SettingsLayout) -> UpdateHandler<teloxide::RequestError> {
    let messages = Update::filter_message().filter(move |msg: Message| msg.chat.id == chat);
    match layout {
        SettingsLayout::Multi => messages.branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(on_command),
        ),
        SettingsLayout::Legacy => messages.branch(
            dptree::entry()
                .filter_command::<LegacyCommand>()
                .endpoint(on_legacy_command),
        ),
    }
}

/// Publishes the command list and polls for updates until Ctrl-C.
pub async fn run(bot: Bot, state: Arc<AppState>, chat: ChatId, layout: SettingsLayout) {
    let published = match layout {
        SettingsLayout::Multi => bot.set_my_commands(Command::bot_commands()).await,
        SettingsLayout::Legacy => bot.set_my_commands(LegacyCommand::bot_commands()).await,
    };
    if let Err(e) = published {
        error!(error = %e, "Failed to publish the command list.");
    }

    info!(?layout, "Bot is polling for commands.");
    Dispatcher::builder(bot, schema(chat, layout))
        .dependencies(dptree::deps![state])
        // No per-chat ordering: a slow probe must not hold up other commands.
        .distribution_function(|_| None::<std::convert::Infallible>)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
