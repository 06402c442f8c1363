use std::time::Duration;

use secrecy::Secret;

/// Connection settings for the bot.
#[derive(Clone)]
pub struct TelegramBotConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,
    /// HTTP timeout for a single Bot API request.
    pub request_timeout: Duration,
    /// How many `RetryAfter` responses to sit out before giving up on a send.
    pub retry_after_max_retries: usize,
}

impl TelegramBotConfig {
    pub fn new(token: Secret<String>) -> Self {
        Self {
            token,
            request_timeout: Duration::from_secs(30),
            retry_after_max_retries: 4,
        }
    }
}

impl std::fmt::Debug for TelegramBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBotConfig")
            .field("token", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("retry_after_max_retries", &self.retry_after_max_retries)
            .finish()
    }
}
