//! Prometheus metrics exporter.

use crate::config::parse_bool;
use crate::{Error, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default exporter port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether the exporter is installed.
    pub enabled: bool,
    /// Address the HTTP scrape endpoint binds to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_METRICS_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from the process environment.
    ///
    /// Reads `ECOTAG_METRICS_ENABLED` and `ECOTAG_METRICS_PORT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds metrics configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(enabled) = lookup("ECOTAG_METRICS_ENABLED").and_then(|v| parse_bool(&v)) {
            config.enabled = enabled;
        }
        if let Some(port) = lookup("ECOTAG_METRICS_PORT").and_then(|v| v.trim().parse::<u16>().ok())
        {
            config.listen_addr.set_port(port);
        }
        config
    }
}

/// Installs the global Prometheus recorder and its HTTP scrape listener.
///
/// Does nothing when metrics are disabled; the `metrics` macros then record
/// into the no-op recorder. The exporter runs its listener on a background
/// thread of its own.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the listener cannot bind or a
/// global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_install".to_string(),
            cause: e.to_string(),
        })?;

    tracing::info!(listen_addr = %config.listen_addr, "Prometheus exporter listening");
    Ok(true)
}
