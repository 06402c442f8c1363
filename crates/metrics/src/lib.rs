//! Metrics for fontbot.
//!
//! Crates record through the `metrics` facade using the names in
//! [`definitions`]. Nothing is exported unless a recorder is installed with
//! [`init_metrics`]; with the `prometheus` feature that recorder renders the
//! Prometheus text format.
//!
//! ```rust,ignore
//! use fontbot_metrics::{counter, broadcast};
//!
//! counter!(broadcast::SENT_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
