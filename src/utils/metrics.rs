use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;

use crate::config::Settings;

/// Install the Prometheus recorder and serve /metrics.
///
/// Must be called from within a tokio runtime. When no metrics port is
/// configured the recorder is installed without an HTTP listener so the
/// counter/histogram macros still work.
pub fn init_metrics(config: &Settings) -> Result<()> {
    let builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("session_processing_duration_seconds".to_string()),
        &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
    )?;

    match config.metrics_port {
        Some(port) => {
            let addr = format!("0.0.0.0:{}", port).parse::<SocketAddr>()?;
            builder.with_http_listener(addr).install()?;
        }
        None => {
            builder.install_recorder()?;
        }
    }

    Ok(())
}
