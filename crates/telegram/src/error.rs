use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("invalid chat id {chat_id:?}: expected a numeric id or @username")]
    InvalidChatId { chat_id: String },
}

impl Error {
    #[must_use]
    pub fn invalid_chat_id(chat_id: impl Into<String>) -> Self {
        Self::InvalidChatId {
            chat_id: chat_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
