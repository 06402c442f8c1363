//! JSON document store for fontbot.
//!
//! One file holds every collection: users, bans, the outbound message queue,
//! the file-id cache and the current broadcast record. Writes are serialized
//! through a single FIFO lock and rewrite the whole file; reads are served
//! from the in-memory copy.

pub mod bans;
pub mod broadcast;
pub mod document;
pub mod error;
pub mod file_cache;
pub mod queue;
pub mod stats;
pub mod types;
pub mod users;

pub use {
    document::{DocumentStore, StoreLimits},
    error::{Error, Result},
    queue::EnqueueReport,
    stats::{FontCatalog, FontPopularity, StoreStats},
    types::{
        ActivityEntry, BanEntry, BanOutcome, BroadcastError, BroadcastRecord, DeliveryOutcome,
        Document, QueuedMessage, UserActivity, UserProfile, UserRecord,
    },
};
