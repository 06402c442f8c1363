//! Metrics recorder initialization.

use std::net::SocketAddr;

use {anyhow::Result, tracing::info};

/// Returned once a recorder is installed.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    listen: SocketAddr,
}

impl MetricsHandle {
    /// Address the Prometheus scrape endpoint listens on.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }
}

#[derive(Debug, Clone)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
    /// Labels added to every metric
    pub global_labels: Vec<(String, String)>,
}

impl Default for MetricsRecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: SocketAddr::from(([127, 0, 0, 1], 9464)),
            global_labels: Vec::new(),
        }
    }
}

/// Install the global recorder. Call once at startup.
///
/// Must run inside the tokio runtime: the scrape endpoint is spawned on it.
/// When disabled, or built without `prometheus`, no recorder is installed and
/// the facade macros are no-ops.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(None);
    }

    #[cfg(feature = "prometheus")]
    {
        let listen = config.listen;
        init_prometheus(config)?;
        info!(%listen, "prometheus metrics endpoint listening");
        Ok(Some(MetricsHandle { listen }))
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics requested but the prometheus feature is not compiled in");
        Ok(None)
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(config: MetricsRecorderConfig) -> Result<()> {
    use {
        crate::{broadcast, buckets, store},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .set_buckets_for_metric(
            Matcher::Full(store::WRITE_DURATION_SECONDS.to_string()),
            buckets::STORE_WRITE,
        )?
        .set_buckets_for_metric(
            Matcher::Full(broadcast::DURATION_SECONDS.to_string()),
            buckets::BROADCAST,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder.install()?;
    Ok(())
}
