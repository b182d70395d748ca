//! zic-metrics: Zabbix internal checks as Prometheus gauges.
//!
//! Polls a Zabbix server for its internal (self-monitoring) items on a
//! fixed interval and publishes each enabled, numeric item as a gauge.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── init: register metrics_collected_at (-1), user.login
//!   ├── run() → one tick per interval, skipped while a cycle is in flight
//!   └── cycle: item.get → filter/parse → GaugeRegistry → collected_at
//!
//! GaugeRegistry
//!   └── prometheus::Registry of Gauges, gathered by the /metrics handler
//! ```
//!
//! # Failure handling
//!
//! A request-level `item.get` failure triggers one re-login and ends the
//! cycle without publishing. An unexpected failure, or a failed login at
//! startup, ends the collector with a [`CollectorError`].

pub mod collector;
pub mod registry;
pub mod sanitize;

pub use collector::{
    AuthState, CollectorError, CollectorSettings, Credentials, CycleGate, CycleOutcome,
    CycleStats, MetricsCollector,
};
pub use registry::{Gauge, GaugeRegistry, RegistryError};
pub use sanitize::sanitize_metric_name;
