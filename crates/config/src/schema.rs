//! Config schema.

use std::{collections::HashMap, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FontbotConfig {
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub broadcast: BroadcastConfig,
    pub fonts: FontsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    #[serde(serialize_with = "serialize_option_secret")]
    pub token: Option<Secret<String>>,
    /// Telegram user id of the operator. Receives broadcast reports and is
    /// never a broadcast recipient.
    pub admin_id: Option<i64>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("admin_id", &self.admin_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON document. Defaults to `db.json` in the data dir.
    pub path: Option<PathBuf>,
    /// Activity entries kept per user and kind.
    pub activity_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            activity_cap: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub drain_interval_ms: u64,
    pub capacity: usize,
    /// Longer texts are truncated to this many characters when queued.
    pub max_text_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 5000,
            capacity: 1000,
            max_text_len: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Error details kept in the broadcast record. Failures beyond this are
    /// still counted.
    pub error_cap: usize,
    pub error_max_len: usize,
    pub throttle: ThrottleConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            error_cap: 50,
            error_max_len: 200,
            throttle: ThrottleConfig::default(),
        }
    }
}

/// Pacing applied before every outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ThrottleConfig {
    Fixed {
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
    Window {
        #[serde(default = "default_max_per_window")]
        max_per_window: usize,
        #[serde(default = "default_window_ms")]
        window_ms: u64,
    },
    None,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_delay_ms() -> u64 {
    50
}

fn default_max_per_window() -> usize {
    25
}

fn default_window_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FontsConfig {
    /// Directory scanned for font files when reporting stats.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address of the Prometheus scrape endpoint.
    pub listen: String,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".into(),
            labels: HashMap::new(),
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: FontbotConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue.drain_interval_ms, 5000);
        assert_eq!(config.queue.capacity, 1000);
        assert_eq!(config.queue.max_text_len, 4096);
        assert_eq!(config.store.activity_cap, 20);
        assert_eq!(config.broadcast.error_cap, 50);
        assert_eq!(config.broadcast.throttle, ThrottleConfig::Fixed { delay_ms: 50 });
        assert!(config.telegram.token.is_none());
    }

    #[test]
    fn window_throttle_fills_missing_fields() {
        let config: FontbotConfig = toml::from_str(
            r#"
[broadcast.throttle]
kind = "window"
max_per_window = 10
"#,
        )
        .unwrap();
        assert_eq!(config.broadcast.throttle, ThrottleConfig::Window {
            max_per_window: 10,
            window_ms: 1000,
        });
    }

    #[test]
    fn debug_output_hides_token() {
        let config: FontbotConfig = toml::from_str(
            r#"
[telegram]
token = "123:secret"
admin_id = 42
"#,
        )
        .unwrap();
        let debug = format!("{:?}", config.telegram);
        assert!(!debug.contains("123:secret"));
        assert!(debug.contains("42"));
        assert_eq!(
            config.telegram.token.as_ref().unwrap().expose_secret(),
            "123:secret"
        );
    }
}
