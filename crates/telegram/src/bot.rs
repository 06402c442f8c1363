use {
    secrecy::ExposeSecret,
    teloxide::prelude::*,
    tracing::{debug, info},
};

use crate::{config::TelegramBotConfig, error::Result, outbound::TelegramTransport};

/// Build a bot client and check the token with `getMe`.
///
/// The returned transport knows the bot's own user id so callers can keep
/// the bot out of broadcast recipients.
pub async fn connect(config: TelegramBotConfig) -> Result<TelegramTransport> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.request_timeout)
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    debug!("verifying telegram bot token");
    let me = bot.get_me().await?;
    let bot_id = me.id.0;

    info!(
        bot_id,
        username = ?me.username,
        "telegram bot connected"
    );

    Ok(TelegramTransport::new(
        bot,
        bot_id,
        config.retry_after_max_retries,
    ))
}
