//! Telegram transport for fontbot.
//!
//! Wraps a teloxide `Bot` as a [`fontbot_outbox::MessageTransport`]. Update
//! handling lives elsewhere; this crate only sends.

pub mod bot;
pub mod config;
pub mod error;
pub mod outbound;

pub use {
    bot::connect,
    config::TelegramBotConfig,
    error::{Error, Result},
    outbound::TelegramTransport,
};
