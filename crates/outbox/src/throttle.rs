//! Send pacing.
//!
//! The queue worker awaits [`SendThrottle::ready`] before every send, for
//! broadcast recipients and regular messages alike, so the transport never
//! sees more than the configured rate.

use std::{collections::VecDeque, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::Mutex, time::Instant},
};

#[async_trait]
pub trait SendThrottle: Send + Sync {
    /// Wait until the next send is allowed.
    async fn ready(&self);
}

/// Keeps at least `delay` between consecutive sends.
pub struct FixedDelay {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SendThrottle for FixedDelay {
    async fn ready(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.delay).await;
        }
        *last = Some(Instant::now());
    }
}

/// Allows at most `max_per_window` sends in any `window`.
pub struct SlidingWindow {
    max_per_window: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl SendThrottle for SlidingWindow {
    async fn ready(&self) {
        let mut sent = self.sent.lock().await;
        loop {
            let now = Instant::now();
            while sent
                .front()
                .is_some_and(|&at| now.duration_since(at) >= self.window)
            {
                sent.pop_front();
            }
            if sent.len() < self.max_per_window {
                sent.push_back(now);
                return;
            }
            if let Some(&oldest) = sent.front() {
                tokio::time::sleep_until(oldest + self.window).await;
            }
        }
    }
}

/// No pacing at all.
pub struct Unthrottled;

#[async_trait]
impl SendThrottle for Unthrottled {
    async fn ready(&self) {}
}
