use std::{future::Future, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{ChatId, ParseMode, Recipient},
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use fontbot_metrics::{counter, telegram as tg_metrics};

use fontbot_outbox::MessageTransport;

use crate::error::Error;

/// Sends queued and broadcast messages through the Bot API.
pub struct TelegramTransport {
    bot: Bot,
    bot_id: u64,
    retry_after_max_retries: usize,
}

impl TelegramTransport {
    pub(crate) fn new(bot: Bot, bot_id: u64, retry_after_max_retries: usize) -> Self {
        Self {
            bot,
            bot_id,
            retry_after_max_retries,
        }
    }

    /// The bot's own user id, as reported by `getMe`.
    pub fn bot_id(&self) -> u64 {
        self.bot_id
    }

    async fn send_with_fallback(
        &self,
        chat_id: &str,
        recipient: Recipient,
        text: &str,
    ) -> std::result::Result<(), RequestError> {
        let html = run_with_retry(self.retry_after_max_retries, chat_id, "send (html)", || {
            let req = self
                .bot
                .send_message(recipient.clone(), text)
                .parse_mode(ParseMode::Html);
            async move { req.await }
        })
        .await;

        match html {
            Ok(_) => Ok(()),
            Err(e) if is_markup_error(&e) => {
                debug!(chat_id, error = %e, "telegram rejected HTML, resending as plain text");
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::PLAIN_FALLBACK_TOTAL).increment(1);
                run_with_retry(self.retry_after_max_retries, chat_id, "send (plain)", || {
                    let req = self.bot.send_message(recipient.clone(), text);
                    async move { req.await }
                })
                .await
                .map(|_| ())
            },
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let recipient = parse_recipient(chat_id)?;
        self.send_with_fallback(chat_id, recipient, text).await?;
        Ok(())
    }
}

/// Numeric ids address users and groups; `@name` addresses public channels.
pub fn parse_recipient(chat_id: &str) -> std::result::Result<Recipient, Error> {
    let chat_id = chat_id.trim();
    if let Some(name) = chat_id.strip_prefix('@')
        && !name.is_empty()
    {
        return Ok(Recipient::ChannelUsername(chat_id.to_string()));
    }
    chat_id
        .parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| Error::invalid_chat_id(chat_id))
}

/// Run `request`, sleeping through up to `max_retries` `RetryAfter` replies.
async fn run_with_retry<T, F, Fut>(
    max_retries: usize,
    chat_id: &str,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(wait) = retry_after_duration(&err) else {
            return Err(err);
        };

        if retries >= max_retries {
            warn!(
                chat_id,
                operation,
                retries,
                retry_after_secs = wait.as_secs(),
                "telegram rate limit persisted after retries"
            );
            return Err(err);
        }

        retries += 1;
        #[cfg(feature = "metrics")]
        counter!(tg_metrics::RETRY_AFTER_TOTAL).increment(1);
        warn!(
            chat_id,
            operation,
            retries,
            max_retries,
            retry_after_secs = wait.as_secs(),
            "telegram rate limited, waiting before retry"
        );
        tokio::time::sleep(wait).await;
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_markup_error(error: &RequestError) -> bool {
    match error {
        RequestError::Api(api) => api
            .to_string()
            .to_ascii_lowercase()
            .contains("can't parse entities"),
        _ => false,
    }
}
