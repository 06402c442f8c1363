//! Metric names used across fontbot.

/// Document store metrics
pub mod store {
    /// Successful document writes, labelled by accessor (`op`)
    pub const WRITES_TOTAL: &str = "fontbot_store_writes_total";
    /// Failed document writes, labelled by accessor (`op`)
    pub const WRITE_ERRORS_TOTAL: &str = "fontbot_store_write_errors_total";
    /// Time spent serializing and writing the whole document
    pub const WRITE_DURATION_SECONDS: &str = "fontbot_store_write_duration_seconds";
}

/// Message queue metrics
pub mod queue {
    /// Messages appended to the queue
    pub const ENQUEUED_TOTAL: &str = "fontbot_queue_enqueued_total";
    /// Messages discarded because the queue was full
    pub const DROPPED_TOTAL: &str = "fontbot_queue_dropped_total";
    /// Messages taken off the queue by the worker
    pub const DRAINED_TOTAL: &str = "fontbot_queue_drained_total";
    /// Regular (non-broadcast) messages that failed to send
    pub const DELIVERY_ERRORS_TOTAL: &str = "fontbot_queue_delivery_errors_total";
}

/// Broadcast metrics
pub mod broadcast {
    /// Broadcasts started
    pub const STARTED_TOTAL: &str = "fontbot_broadcast_started_total";
    /// Broadcast deliveries that succeeded
    pub const SENT_TOTAL: &str = "fontbot_broadcast_sent_total";
    /// Broadcast deliveries that failed
    pub const FAILED_TOTAL: &str = "fontbot_broadcast_failed_total";
    /// Broadcasts aborted by a store error
    pub const ABORTED_TOTAL: &str = "fontbot_broadcast_aborted_total";
    /// Wall time of a whole broadcast
    pub const DURATION_SECONDS: &str = "fontbot_broadcast_duration_seconds";
}

/// Telegram transport metrics
pub mod telegram {
    /// Requests retried after a `RetryAfter` response
    pub const RETRY_AFTER_TOTAL: &str = "fontbot_telegram_retry_after_total";
    /// HTML sends rejected by Telegram and resent as plain text
    pub const PLAIN_FALLBACK_TOTAL: &str = "fontbot_telegram_plain_fallback_total";
}

/// Histogram bucket boundaries.
pub mod buckets {
    /// Document write duration, 100µs to 5s.
    pub const STORE_WRITE: &[f64] = &[
        0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
    ];

    /// Broadcast duration, 1s to 6h.
    pub const BROADCAST: &[f64] = &[
        1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0,
    ];
}
