//! zicd: the Zabbix internal checks exporter daemon.
//!
//! Wires the JSON-RPC client, the collector and the HTTP surface together:
//!
//! ```text
//! ExporterConfig ──► JsonRpcClient ──► MetricsCollector ──► GaugeRegistry
//!                                                              │
//!                                      GET /metrics ◄── zic_api::build_router
//! ```

pub mod config;

use zic_metrics::{CollectorSettings, Credentials, GaugeRegistry, MetricsCollector};
use zic_rpc::{JsonRpcClient, RpcResult};

use crate::config::ExporterConfig;

/// Build a collector for `config` that publishes into `registry`.
pub fn build_collector(
    config: &ExporterConfig,
    registry: GaugeRegistry,
) -> RpcResult<MetricsCollector<JsonRpcClient>> {
    let api = JsonRpcClient::with_timeout(&config.zabbix_url, config.request_timeout())?;
    let settings = CollectorSettings {
        namespace: config.namespace.clone(),
        item_key_pattern: config.item_key_pattern.clone(),
        interval: config.interval(),
    };
    let credentials = Credentials::new(&config.zabbix_user, &config.zabbix_password);

    Ok(MetricsCollector::new(api, credentials, settings, registry))
}
