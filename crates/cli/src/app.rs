//! Wiring from loaded config to store, throttle, worker and transport.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, Result},
    fontbot_config::{FontbotConfig, ThrottleConfig},
    fontbot_metrics::MetricsRecorderConfig,
    fontbot_outbox::{
        FixedDelay, QueueWorkerConfig, SendThrottle, SlidingWindow, Unthrottled,
    },
    fontbot_store::{DocumentStore, StoreLimits},
    fontbot_telegram::{TelegramBotConfig, TelegramTransport},
    tracing::debug,
};

use crate::catalog::DirectoryCatalog;

pub struct AppContext {
    pub config: FontbotConfig,
    pub store_path: PathBuf,
}

impl AppContext {
    /// Discover the config file, apply `FONTBOT_*` overrides and resolve the
    /// store path.
    pub fn load(config_dir: Option<&Path>, data_dir: Option<&Path>) -> Self {
        let config = fontbot_config::apply_env_overrides(fontbot_config::discover_and_load(
            config_dir,
        ));
        Self::from_config(config, data_dir)
    }

    pub fn from_config(config: FontbotConfig, data_dir: Option<&Path>) -> Self {
        let store_path = fontbot_config::store_path(&config, data_dir);
        debug!(store = %store_path.display(), "resolved store path");
        Self { config, store_path }
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            activity_cap: self.config.store.activity_cap,
            queue_capacity: self.config.queue.capacity,
            max_text_len: self.config.queue.max_text_len,
            broadcast_error_cap: self.config.broadcast.error_cap,
            error_max_len: self.config.broadcast.error_max_len,
        }
    }

    pub async fn open_store(&self) -> Result<Arc<DocumentStore>> {
        let store = DocumentStore::open(&self.store_path, self.store_limits())
            .await
            .with_context(|| format!("opening store at {}", self.store_path.display()))?;
        Ok(Arc::new(store))
    }

    pub fn throttle(&self) -> Arc<dyn SendThrottle> {
        build_throttle(&self.config.broadcast.throttle)
    }

    pub fn catalog(&self) -> DirectoryCatalog {
        DirectoryCatalog::new(self.config.fonts.dir.clone())
    }

    pub fn admin_chat_id(&self) -> Option<String> {
        self.config.telegram.admin_id.map(|id| id.to_string())
    }

    /// Ids kept out of broadcasts: the admin and, once known, the bot itself.
    pub fn broadcast_excluded(&self, bot_id: Option<u64>) -> Vec<String> {
        self.admin_chat_id()
            .into_iter()
            .chain(bot_id.map(|id| id.to_string()))
            .collect()
    }

    pub fn worker_config(&self, bot_id: Option<u64>) -> QueueWorkerConfig {
        QueueWorkerConfig {
            drain_interval: Duration::from_millis(self.config.queue.drain_interval_ms.max(1)),
            excluded: self.broadcast_excluded(bot_id),
            report_to_requester: true,
        }
    }

    pub async fn connect_telegram(&self) -> Result<TelegramTransport> {
        let token = self.config.telegram.token.clone().context(
            "no telegram bot token configured (set telegram.token or FONTBOT_TELEGRAM_TOKEN)",
        )?;
        let transport = fontbot_telegram::connect(TelegramBotConfig::new(token))
            .await
            .context("connecting to telegram")?;
        Ok(transport)
    }

    pub fn metrics_config(&self) -> Result<MetricsRecorderConfig> {
        let metrics = &self.config.metrics;
        let listen = metrics
            .listen
            .parse()
            .with_context(|| format!("invalid metrics.listen address {:?}", metrics.listen))?;
        let mut global_labels: Vec<(String, String)> = metrics
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        global_labels.sort();
        Ok(MetricsRecorderConfig {
            enabled: metrics.enabled,
            listen,
            global_labels,
        })
    }
}

pub fn build_throttle(config: &ThrottleConfig) -> Arc<dyn SendThrottle> {
    match *config {
        ThrottleConfig::Fixed { delay_ms } => Arc::new(FixedDelay::new(Duration::from_millis(
            delay_ms,
        ))),
        ThrottleConfig::Window {
            max_per_window,
            window_ms,
        } => Arc::new(SlidingWindow::new(
            max_per_window,
            Duration::from_millis(window_ms),
        )),
        ThrottleConfig::None => Arc::new(Unthrottled),
    }
}
