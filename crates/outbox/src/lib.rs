//! Outbound delivery for fontbot.
//!
//! Messages are queued in the document store and sent by the [`QueueWorker`]
//! through a [`MessageTransport`], paced by a [`SendThrottle`].

pub mod broadcast;
pub mod throttle;
pub mod transport;
pub mod worker;

pub use {
    broadcast::BroadcastWorker,
    throttle::{FixedDelay, SendThrottle, SlidingWindow, Unthrottled},
    transport::MessageTransport,
    worker::{DrainReport, QueueWorker, QueueWorkerConfig},
};
