//! Broadcast delivery: one message to every eligible user, with progress
//! written to the store after each recipient.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    fontbot_store::{BroadcastRecord, DeliveryOutcome, DocumentStore, UserRecord},
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use fontbot_metrics::{broadcast as broadcast_metrics, counter, histogram};

use crate::{throttle::SendThrottle, transport::MessageTransport};

pub struct BroadcastWorker {
    store: Arc<DocumentStore>,
    transport: Arc<dyn MessageTransport>,
    throttle: Arc<dyn SendThrottle>,
    excluded: Vec<String>,
}

impl BroadcastWorker {
    pub fn new(
        store: Arc<DocumentStore>,
        transport: Arc<dyn MessageTransport>,
        throttle: Arc<dyn SendThrottle>,
    ) -> Self {
        Self {
            store,
            transport,
            throttle,
            excluded: Vec::new(),
        }
    }

    /// Never deliver to these ids (the admin, the bot itself).
    #[must_use]
    pub fn with_excluded<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Deliver `message` to every recipient and return the closed record.
    ///
    /// Individual delivery failures are counted, not raised. A store error
    /// stops the broadcast; the record is still closed if possible and the
    /// store error is returned.
    pub async fn run(&self, message: &str) -> Result<BroadcastRecord> {
        let started = Instant::now();
        let recipients = self.store.broadcast_recipients(&self.excluded);
        info!(
            recipients = recipients.len(),
            excluded = self.excluded.len(),
            "starting broadcast"
        );
        #[cfg(feature = "metrics")]
        counter!(broadcast_metrics::STARTED_TOTAL).increment(1);

        if let Err(e) = self.deliver(message, &recipients).await {
            error!(error = %e, "broadcast aborted");
            #[cfg(feature = "metrics")]
            counter!(broadcast_metrics::ABORTED_TOTAL).increment(1);
            if let Err(close_err) = self.store.end_broadcast_log().await {
                warn!(error = %close_err, "failed to close aborted broadcast record");
            }
            return Err(e);
        }

        let record = self
            .store
            .end_broadcast_log()
            .await
            .context("closing broadcast record")?
            .context("broadcast record disappeared before it was closed")?;

        #[cfg(feature = "metrics")]
        histogram!(broadcast_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            total = record.total,
            sent = record.sent,
            failed = record.failed,
            elapsed_secs = started.elapsed().as_secs(),
            "broadcast delivered"
        );
        Ok(record)
    }

    async fn deliver(&self, message: &str, recipients: &[UserRecord]) -> Result<()> {
        self.store
            .start_broadcast_log(message, recipients.len())
            .await
            .context("starting broadcast record")?;

        for user in recipients {
            self.throttle.ready().await;
            let outcome = match self.transport.send_text(&user.id, message).await {
                Ok(()) => {
                    #[cfg(feature = "metrics")]
                    counter!(broadcast_metrics::SENT_TOTAL).increment(1);
                    DeliveryOutcome::Sent
                },
                Err(e) => {
                    debug!(user_id = %user.id, error = %e, "broadcast delivery failed");
                    #[cfg(feature = "metrics")]
                    counter!(broadcast_metrics::FAILED_TOTAL).increment(1);
                    DeliveryOutcome::Failed(e.to_string())
                },
            };
            self.store
                .log_broadcast_result(&user.id, outcome)
                .await
                .with_context(|| format!("recording broadcast result for {}", user.id))?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        path::PathBuf,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {
        super::*,
        crate::throttle::Unthrottled,
        async_trait::async_trait,
        fontbot_store::{StoreLimits, UserProfile},
        tempfile::TempDir,
    };

    /// Fails for the listed chat ids, succeeds for everyone else.
    struct StubTransport {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubTransport {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageTransport for StubTransport {
        async fn send_text(&self, chat_id: &str, _text: &str) -> Result<()> {
            self.calls.lock().unwrap().push(chat_id.to_string());
            if self.failing.contains(chat_id) {
                anyhow::bail!("Forbidden: bot was blocked by the user");
            }
            Ok(())
        }
    }

    async fn store_with_users(dir: &TempDir, count: usize, limits: StoreLimits) -> Arc<DocumentStore> {
        let store = DocumentStore::open(dir.path().join("db.json"), limits)
            .await
            .unwrap();
        for i in 0..count {
            store
                .add_or_update_user(UserProfile::new(format!("u{i:03}")))
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn counts_add_up_and_errors_are_capped() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_users(&tmp, 10, StoreLimits {
            broadcast_error_cap: 3,
            ..StoreLimits::default()
        })
        .await;
        let failing: Vec<String> = (0..5).map(|i| format!("u{i:03}")).collect();
        let failing_refs: Vec<&str> = failing.iter().map(String::as_str).collect();
        let transport = Arc::new(StubTransport::failing(&failing_refs));

        let worker = BroadcastWorker::new(Arc::clone(&store), transport.clone(), Arc::new(Unthrottled));
        let record = worker.run("news").await.unwrap();

        assert_eq!(record.total, 10);
        assert_eq!(record.sent + record.failed, 10);
        assert_eq!(record.failed, 5);
        assert_eq!(record.errors.len(), 3);
        assert!(record.completed_at.is_some());
        assert_eq!(transport.calls.lock().unwrap().len(), 10);
        assert_eq!(store.broadcast_status(), Some(record));
    }

    #[tokio::test]
    async fn excluded_ids_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_users(&tmp, 3, StoreLimits::default()).await;
        let transport = Arc::new(StubTransport::failing(&[]));

        let worker = BroadcastWorker::new(Arc::clone(&store), transport.clone(), Arc::new(Unthrottled))
            .with_excluded(["u001"]);
        let record = worker.run("hi").await.unwrap();

        assert_eq!(record.total, 2);
        assert_eq!(*transport.calls.lock().unwrap(), vec!["u000", "u002"]);
    }

    /// Checks that the record is still open while deliveries happen.
    struct ObservingTransport {
        store: Arc<DocumentStore>,
        seen_open: AtomicUsize,
    }

    #[async_trait]
    impl MessageTransport for ObservingTransport {
        async fn send_text(&self, _chat_id: &str, _text: &str) -> Result<()> {
            let record = self.store.broadcast_status().unwrap();
            if record.completed_at.is_none() {
                self.seen_open.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn completed_at_is_set_only_after_the_last_attempt() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_users(&tmp, 4, StoreLimits::default()).await;
        let transport = Arc::new(ObservingTransport {
            store: Arc::clone(&store),
            seen_open: AtomicUsize::new(0),
        });

        let worker = BroadcastWorker::new(Arc::clone(&store), transport.clone(), Arc::new(Unthrottled));
        let record = worker.run("hi").await.unwrap();

        assert_eq!(transport.seen_open.load(Ordering::SeqCst), 4);
        assert!(record.completed_at.is_some());
    }

    /// Breaks the store's file writes after the first delivery.
    struct SabotagingTransport {
        tmp_path: PathBuf,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageTransport for SabotagingTransport {
        async fn send_text(&self, _chat_id: &str, _text: &str) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                std::fs::create_dir(&self.tmp_path).unwrap();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_failure_aborts_the_broadcast() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_users(&tmp, 5, StoreLimits::default()).await;
        let transport = Arc::new(SabotagingTransport {
            tmp_path: tmp.path().join("db.json.tmp"),
            calls: AtomicUsize::new(0),
        });

        let worker = BroadcastWorker::new(Arc::clone(&store), transport.clone(), Arc::new(Unthrottled));
        assert!(worker.run("hi").await.is_err());

        // Stopped at the first unrecordable outcome.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let record = store.broadcast_status().unwrap();
        assert_eq!(record.sent, 1);
        assert!(record.completed_at.is_none());
    }
}
