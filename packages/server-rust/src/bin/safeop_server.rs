//! `safeop-server` -- serves the safety layer's health surface and drains it
//! on SIGINT/SIGTERM.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use safeop_server::service::{parse_component_timeout, LayerConfig, SafetyLayer};
use safeop_server::NetworkModule;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "safeop-server", version, about)]
struct Args {
    /// Address to bind the HTTP surface to.
    #[arg(long, env = "SAFEOP_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SAFEOP_PORT", default_value_t = 8080)]
    port: u16,

    /// Per-request limit for the health surface, in milliseconds.
    #[arg(long, env = "SAFEOP_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Deadline for components without an override, in milliseconds.
    #[arg(long, env = "SAFEOP_DEFAULT_TIMEOUT_MS")]
    default_timeout_ms: Option<u64>,

    /// Per-component deadline as `name=milliseconds`. Repeatable.
    #[arg(long = "component-timeout", value_parser = parse_component_timeout)]
    component_timeouts: Vec<(String, u64)>,

    #[arg(long, env = "SAFEOP_BATCH_SIZE")]
    batch_size: Option<usize>,

    #[arg(long, env = "SAFEOP_DRAIN_POLL_MS")]
    drain_poll_ms: Option<u64>,

    /// Longest shutdown waits for in-flight operations, in milliseconds.
    #[arg(long, env = "SAFEOP_MAX_DRAIN_WAIT_MS")]
    max_drain_wait_ms: Option<u64>,

    #[arg(long, env = "SAFEOP_BYTES_PER_OPERATION")]
    bytes_per_operation: Option<u64>,

    /// Failover order for cross-region coordination, primary first.
    #[arg(long, env = "SAFEOP_REGIONS", value_delimiter = ',')]
    regions: Vec<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SAFEOP_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn layer_config(&self) -> LayerConfig {
        let defaults = LayerConfig::default();
        let mut component_timeouts: HashMap<String, u64> = defaults.component_timeouts;
        component_timeouts.extend(self.component_timeouts.iter().cloned());

        LayerConfig {
            default_timeout_ms: self.default_timeout_ms.unwrap_or(defaults.default_timeout_ms),
            component_timeouts,
            default_batch_size: self.batch_size.unwrap_or(defaults.default_batch_size),
            drain_poll_interval_ms: self
                .drain_poll_ms
                .unwrap_or(defaults.drain_poll_interval_ms),
            max_drain_wait_ms: self.max_drain_wait_ms.unwrap_or(defaults.max_drain_wait_ms),
            bytes_per_operation_estimate: self
                .bytes_per_operation
                .unwrap_or(defaults.bytes_per_operation_estimate),
            default_regions: if self.regions.is_empty() {
                defaults.default_regions
            } else {
                self.regions.clone()
            },
            health_request_timeout_ms: self
                .request_timeout_ms
                .unwrap_or(defaults.health_request_timeout_ms),
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let metrics = PrometheusBuilder::new().install_recorder()?;
    let layer = Arc::new(SafetyLayer::new(args.layer_config()));

    let mut module = NetworkModule::new(args.host.clone(), args.port, layer)
        .with_metrics(metrics);
    let port = module.start().await?;
    info!(port, "safeop-server started");

    let report = module.serve(shutdown_signal()).await?;
    info!(
        drained = report.drained,
        remaining = report.remaining,
        "safeop-server stopped"
    );
    Ok(())
}
