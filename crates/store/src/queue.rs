//! Outbound message queue.
//!
//! Entries are appended by handlers and drained as one batch by the queue
//! worker. Draining is at-most-once: drained entries are removed from the
//! file before they are sent, so a crash between drain and send loses them.

use {
    chrono::Utc,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use fontbot_metrics::{counter, queue as queue_metrics};

use crate::{
    Result,
    document::{Change, DocumentStore},
    types::QueuedMessage,
};

/// What `enqueue_message` did with the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReport {
    pub queued: bool,
    pub truncated: bool,
    /// Oldest entries discarded to make room.
    pub dropped: usize,
}

impl DocumentStore {
    /// Append a message to the queue.
    ///
    /// Empty text or chat id is ignored. Text over the length bound is
    /// truncated. A full queue drops its oldest half before appending.
    pub async fn enqueue_message(
        &self,
        chat_id: &str,
        text: &str,
        is_broadcast: bool,
    ) -> Result<EnqueueReport> {
        if chat_id.trim().is_empty() || text.trim().is_empty() {
            warn!(chat_id, is_broadcast, "refusing to queue message with empty chat id or text");
            return Ok(EnqueueReport {
                queued: false,
                truncated: false,
                dropped: 0,
            });
        }

        let limits = self.limits();
        let (text, truncated) = truncate_chars(text, limits.max_text_len.max(1));
        let capacity = limits.queue_capacity.max(1);

        let dropped = self
            .mutate("enqueue_message", |doc| {
                let len = doc.message_queue.len();
                let mut dropped = 0;
                if len >= capacity {
                    dropped = (len / 2).max(len + 1 - capacity);
                    doc.message_queue.drain(..dropped);
                }
                doc.message_queue.push(QueuedMessage {
                    chat_id: chat_id.to_string(),
                    text,
                    is_broadcast,
                    timestamp: Utc::now(),
                });
                Change::Commit(dropped)
            })
            .await?;

        if dropped > 0 {
            warn!(dropped, capacity, "message queue full, dropped oldest entries");
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::DROPPED_TOTAL).increment(dropped as u64);
        }
        if truncated {
            debug!(chat_id, max_len = limits.max_text_len, "queued message truncated");
        }
        #[cfg(feature = "metrics")]
        counter!(queue_metrics::ENQUEUED_TOTAL).increment(1);

        Ok(EnqueueReport {
            queued: true,
            truncated,
            dropped,
        })
    }

    /// Take every queued message and leave the queue empty.
    ///
    /// Never fails: a persistence error is logged and an empty batch
    /// returned, with the queue left as it was.
    pub async fn drain_message_queue(&self) -> Vec<QueuedMessage> {
        let result = self
            .mutate("drain_message_queue", |doc| {
                if doc.message_queue.is_empty() {
                    return Change::Unchanged(Vec::new());
                }
                Change::Commit(std::mem::take(&mut doc.message_queue))
            })
            .await;

        match result {
            Ok(batch) => {
                if !batch.is_empty() {
                    debug!(count = batch.len(), "message queue drained");
                    #[cfg(feature = "metrics")]
                    counter!(queue_metrics::DRAINED_TOTAL).increment(batch.len() as u64);
                }
                batch
            },
            Err(e) => {
                error!(error = %e, "failed to drain message queue");
                Vec::new()
            },
        }
    }

    pub fn queue_len(&self) -> usize {
        self.read(|doc| doc.message_queue.len())
    }

    /// Queued messages without removing them.
    pub fn queued_messages(&self) -> Vec<QueuedMessage> {
        self.read(|doc| doc.message_queue.clone())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
