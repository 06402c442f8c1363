//! Periodic queue drain.
//!
//! The timer loop pops the whole queue every `drain_interval` and hands each
//! entry to the transport. Broadcast entries are run inline by the
//! [`BroadcastWorker`], so two broadcasts never overlap.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    fontbot_store::{DocumentStore, QueuedMessage},
    serde::Serialize,
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use fontbot_metrics::{counter, queue as queue_metrics};

use crate::{broadcast::BroadcastWorker, throttle::SendThrottle, transport::MessageTransport};

#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    pub drain_interval: Duration,
    /// Ids never reached by a broadcast.
    pub excluded: Vec<String>,
    /// Send a summary to the chat that queued a broadcast once it finishes.
    pub report_to_requester: bool,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(5),
            excluded: Vec::new(),
            report_to_requester: true,
        }
    }
}

/// What one drain pass did.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub drained: usize,
    pub delivered: usize,
    pub failed: usize,
    pub broadcasts: usize,
    pub broadcasts_aborted: usize,
}

pub struct QueueWorker {
    store: Arc<DocumentStore>,
    transport: Arc<dyn MessageTransport>,
    throttle: Arc<dyn SendThrottle>,
    broadcaster: BroadcastWorker,
    config: QueueWorkerConfig,
    running: RwLock<bool>,
    wake_notify: Arc<Notify>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl QueueWorker {
    pub fn new(
        store: Arc<DocumentStore>,
        transport: Arc<dyn MessageTransport>,
        throttle: Arc<dyn SendThrottle>,
        config: QueueWorkerConfig,
    ) -> Arc<Self> {
        let broadcaster = BroadcastWorker::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&throttle),
        )
        .with_excluded(config.excluded.iter().cloned());

        Arc::new(Self {
            store,
            transport,
            throttle,
            broadcaster,
            config,
            running: RwLock::new(false),
            wake_notify: Arc::new(Notify::new()),
            timer_handle: Mutex::new(None),
        })
    }

    /// Start the drain loop.
    ///
    /// An unfinished broadcast record left by a previous run is reported but
    /// not resumed.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if let Some(record) = self.store.interrupted_broadcast() {
            warn!(
                total = record.total,
                sent = record.sent,
                failed = record.failed,
                started_at = %record.started_at,
                "previous broadcast did not finish and will not be resumed"
            );
        }

        {
            let mut running = self.running.write().await;
            if *running {
                anyhow::bail!("queue worker already running");
            }
            *running = true;
        }

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            worker.timer_loop().await;
        });
        *self.timer_handle.lock().await = Some(handle);

        info!(
            interval_ms = self.config.drain_interval.as_millis() as u64,
            queued = self.store.queue_len(),
            "queue worker started"
        );
        Ok(())
    }

    /// Stop the drain loop. A broadcast in progress is cut off and its record
    /// stays open.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        if let Some(handle) = self.timer_handle.lock().await.take() {
            handle.abort();
        }
        info!("queue worker stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Drain now instead of waiting for the next interval.
    pub fn wake(&self) {
        self.wake_notify.notify_one();
    }

    /// Drain the queue once and dispatch every entry.
    pub async fn tick(&self) -> DrainReport {
        let batch = self.store.drain_message_queue().await;
        let mut report = DrainReport {
            drained: batch.len(),
            ..DrainReport::default()
        };
        if batch.is_empty() {
            return report;
        }
        debug!(count = batch.len(), "dispatching queued messages");

        for entry in batch {
            if entry.is_broadcast {
                self.dispatch_broadcast(&entry, &mut report).await;
            } else {
                self.dispatch_message(&entry, &mut report).await;
            }
        }

        info!(
            drained = report.drained,
            delivered = report.delivered,
            failed = report.failed,
            broadcasts = report.broadcasts,
            "queue drained"
        );
        report
    }

    async fn dispatch_message(&self, entry: &QueuedMessage, report: &mut DrainReport) {
        self.throttle.ready().await;
        match self.transport.send_text(&entry.chat_id, &entry.text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                warn!(chat_id = %entry.chat_id, error = %e, "queued message not delivered");
                #[cfg(feature = "metrics")]
                counter!(queue_metrics::DELIVERY_ERRORS_TOTAL).increment(1);
            },
        }
    }

    async fn dispatch_broadcast(&self, entry: &QueuedMessage, report: &mut DrainReport) {
        let summary = match self.broadcaster.run(&entry.text).await {
            Ok(record) => {
                report.broadcasts += 1;
                format!(
                    "Broadcast finished: {} sent, {} failed, {} recipients.",
                    record.sent, record.failed, record.total
                )
            },
            Err(e) => {
                report.broadcasts_aborted += 1;
                format!("Broadcast aborted: {e}")
            },
        };

        if self.config.report_to_requester
            && let Err(e) = self.transport.send_text(&entry.chat_id, &summary).await
        {
            warn!(chat_id = %entry.chat_id, error = %e, "failed to report broadcast result");
        }
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let notify = Arc::clone(&self.wake_notify);
            tokio::select! {
                () = tokio::time::sleep(self.config.drain_interval) => {},
                () = notify.notified() => {
                    debug!("queue worker woken");
                },
            }

            if !*self.running.read().await {
                break;
            }

            self.tick().await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use {
        super::*,
        crate::throttle::Unthrottled,
        async_trait::async_trait,
        fontbot_store::{StoreLimits, UserProfile},
        tempfile::TempDir,
    };

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
            if chat_id == "unreachable" {
                anyhow::bail!("Bad Request: chat not found");
            }
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn setup(
        dir: &TempDir,
        config: QueueWorkerConfig,
    ) -> (Arc<DocumentStore>, Arc<RecordingTransport>, Arc<QueueWorker>) {
        let store = Arc::new(
            DocumentStore::open(dir.path().join("db.json"), StoreLimits::default())
                .await
                .unwrap(),
        );
        let transport = Arc::new(RecordingTransport::default());
        let worker = QueueWorker::new(
            Arc::clone(&store),
            transport.clone(),
            Arc::new(Unthrottled),
            config,
        );
        (store, transport, worker)
    }

    #[tokio::test]
    async fn tick_delivers_regular_messages_in_order() {
        let tmp = TempDir::new().unwrap();
        let (store, transport, worker) = setup(&tmp, QueueWorkerConfig::default()).await;

        store.enqueue_message("1", "first", false).await.unwrap();
        store
            .enqueue_message("unreachable", "lost", false)
            .await
            .unwrap();
        store.enqueue_message("2", "second", false).await.unwrap();

        let report = worker.tick().await;
        assert_eq!(report, DrainReport {
            drained: 3,
            delivered: 2,
            failed: 1,
            broadcasts: 0,
            broadcasts_aborted: 0,
        });
        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![
            ("1".to_string(), "first".to_string()),
            ("2".to_string(), "second".to_string()),
        ]);
        assert_eq!(store.queue_len(), 0);
        assert_eq!(worker.tick().await.drained, 0);
    }

    #[tokio::test]
    async fn broadcast_entry_runs_broadcast_and_reports_back() {
        let tmp = TempDir::new().unwrap();
        let (store, transport, worker) = setup(&tmp, QueueWorkerConfig {
            excluded: vec!["admin".into()],
            ..QueueWorkerConfig::default()
        })
        .await;
        for id in ["admin", "10", "11"] {
            store.add_or_update_user(UserProfile::new(id)).await.unwrap();
        }

        store.enqueue_message("admin", "Hello", true).await.unwrap();
        let report = worker.tick().await;
        assert_eq!(report.broadcasts, 1);

        let record = store.broadcast_status().unwrap();
        assert_eq!((record.total, record.sent, record.failed), (2, 2, 0));

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].0, "admin");
        assert!(sent[2].1.starts_with("Broadcast finished: 2 sent"));
    }

    #[tokio::test]
    async fn start_wake_and_stop() {
        let tmp = TempDir::new().unwrap();
        let (store, transport, worker) = setup(&tmp, QueueWorkerConfig {
            drain_interval: Duration::from_secs(3600),
            ..QueueWorkerConfig::default()
        })
        .await;

        worker.start().await.unwrap();
        assert!(worker.is_running().await);
        assert!(worker.start().await.is_err());

        store.enqueue_message("1", "ping", false).await.unwrap();
        worker.wake();

        let mut delivered = false;
        for _ in 0..100 {
            if !transport.sent.lock().unwrap().is_empty() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(delivered);

        worker.stop().await;
        assert!(!worker.is_running().await);
    }
}
