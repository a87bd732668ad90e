//! Telegram front end for chat-relay.
//!
//! Wires the Bot API transport to the turn dispatcher and runs the long
//! polling loop until shutdown.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod relay;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use relay_core::{LiveOutputPresenter, TurnDispatcher};
use relay_telegram::TelegramBot;
use tracing::info;

pub use config::{BotConfig, CliOverrides};
pub use relay::{RelayBot, RelayContext, UNAUTHORIZED_TEXT};

/// Run the bot with the given configuration.
pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    run_with_shutdown(config, std::future::pending()).await
}

/// Run the bot until `shutdown` resolves or polling fails.
///
/// The Telegram token and the backend credential are both checked before
/// any update is consumed.
pub async fn run_with_shutdown<F>(config: BotConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BotConfig { relay, telegram } = config;

    let bot = Arc::new(TelegramBot::new(telegram).context("creating Telegram client")?);
    let me = bot.get_me().await.context("checking Telegram token")?;
    let bot_username = me.username.clone();

    let dispatcher = Arc::new(TurnDispatcher::from_config(&relay)?);
    dispatcher
        .ensure_auth()
        .await
        .context("checking backend session")?;

    let handler = Arc::new(RelayBot::new(RelayContext {
        bot: bot.clone(),
        dispatcher,
        presenter: LiveOutputPresenter::from_config(&relay),
        retry: relay.retry,
        bot_username,
    }));

    info!(
        username = me.username.as_deref().unwrap_or_default(),
        "Started Telegram bot"
    );

    tokio::select! {
        result = bot.run(handler) => result.context("polling Telegram")?,
        () = shutdown => {
            info!("Shutdown signal received");
            bot.shutdown();
        }
    }

    info!("Bot stopped");
    Ok(())
}
