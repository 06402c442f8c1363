use {anyhow::Result, async_trait::async_trait};

/// Outbound messaging client. The Telegram bot implements this; tests use
/// stubs.
///
/// Errors carry the platform's message text. Callers only log and record it;
/// there is no retry classification at this level.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;
}
