//! zabbix_internal_checks_exporter: serves Zabbix internal checks as
//! Prometheus metrics.
//!
//! # Usage
//!
//! ```text
//! zabbix_internal_checks_exporter --port 9224 \
//!     --zabbix-url http://zabbix.local --zabbix-user Admin --zabbix-password zabbix
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zic_metrics::{CollectorError, GaugeRegistry};
use zicd::config::{ExporterConfig, PartialConfig};

const DEFAULT_LOG_FILTER: &str = "info,zicd=debug,zic_metrics=debug";

#[derive(Parser)]
#[command(
    name = "zabbix_internal_checks_exporter",
    version,
    about = "Export Zabbix internal checks as Prometheus metrics"
)]
struct Cli {
    /// TOML config file. Flags and environment variables override it.
    #[arg(long, env = "ZIC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to serve /metrics on.
    #[arg(long, env = "ZIC_PORT")]
    port: Option<u16>,

    /// Zabbix frontend base URL, e.g. http://zabbix.local
    #[arg(long, env = "ZABBIX_URL")]
    zabbix_url: Option<String>,

    #[arg(long, env = "ZABBIX_USER")]
    zabbix_user: Option<String>,

    #[arg(long, env = "ZABBIX_PASSWORD", hide_env_values = true)]
    zabbix_password: Option<String>,

    /// Collection interval in seconds [default: 30]
    #[arg(long, env = "ZIC_INTERVAL_SECS")]
    interval_sec: Option<u64>,

    /// Zabbix API request timeout in seconds [default: 3]
    #[arg(long, env = "ZIC_REQUEST_TIMEOUT_SECS")]
    request_timeout_sec: Option<u64>,

    /// Metric name prefix [default: zabbix_internal_checks]
    #[arg(long, env = "ZIC_NAMESPACE")]
    namespace: Option<String>,

    /// item.get key search pattern [default: zabbix[*]]
    #[arg(long, env = "ZIC_ITEM_KEY_PATTERN")]
    item_key_pattern: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn overrides(&self) -> PartialConfig {
        PartialConfig {
            port: self.port,
            zabbix_url: self.zabbix_url.clone(),
            zabbix_user: self.zabbix_user.clone(),
            zabbix_password: self.zabbix_password.clone(),
            interval_secs: self.interval_sec,
            request_timeout_secs: self.request_timeout_sec,
            namespace: self.namespace.clone(),
            item_key_pattern: self.item_key_pattern.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = ExporterConfig::load(cli.config.as_deref(), cli.overrides())
        .inspect_err(|e| error!(error = %e, "invalid configuration"))?;

    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), ?config, "exporter starting");

    let registry = GaugeRegistry::new();
    let collector = zicd::build_collector(&config, registry.clone())
        .context("cannot build zabbix api client")?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut collector_handle = collector.start(shutdown_rx);

    // ── Start metrics server ───────────────────────────────────

    let router = zic_api::build_router(registry);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(%addr, "metrics server listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    tokio::select! {
        served = server.into_future() => {
            served.context("metrics server failed")?;
            collector_exit(collector_handle.await)?;
        }
        joined = &mut collector_handle => {
            collector_exit(joined)?;
        }
    }

    info!("exporter stopped");
    Ok(())
}

fn collector_exit(joined: Result<Result<(), CollectorError>, JoinError>) -> anyhow::Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "metrics collector stopped");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "metrics collector task failed");
            Err(CollectorError::TaskFailed(e.to_string()).into())
        }
    }
}
