//! Gauge registry shared between the collector and the exposition
//! endpoint.
//!
//! Backed by a [`prometheus::Registry`]: gauge values live in the crate's
//! atomic `f64` slots, so a scrape never observes a torn value. A name
//! index on the side gives the collector and tests lookups by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{Opts, Registry};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors returned by [`GaugeRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("cannot register {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("metric {0:?} is already registered")]
    AlreadyRegistered(String),
}

/// Settable handle to a registered gauge. Cloning shares the slot.
#[derive(Clone)]
pub struct Gauge {
    inner: prometheus::Gauge,
    name: Arc<str>,
    help: Arc<str>,
}

impl Gauge {
    /// Fully qualified metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Overwrite the current value.
    pub fn set(&self, value: f64) {
        self.inner.set(value);
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

/// Registry of gauges keyed by fully qualified name. Grows only.
#[derive(Clone, Default)]
pub struct GaugeRegistry {
    registry: Registry,
    index: Arc<RwLock<BTreeMap<String, Gauge>>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `<namespace>_<name>` holding `initial` and return its handle.
    ///
    /// The value is set before the gauge becomes scrapeable. The first
    /// registrant of a name wins; a second registration of the same name is
    /// rejected rather than sharing or replacing the gauge.
    pub async fn register(
        &self,
        namespace: &str,
        name: &str,
        help: &str,
        initial: f64,
    ) -> Result<Gauge, RegistryError> {
        let full_name = qualified_name(namespace, name);
        if name.is_empty() {
            return Err(RegistryError::InvalidName {
                name: full_name,
                reason: "empty metric name".to_string(),
            });
        }
        // The exposition format requires HELP text; fall back to the name.
        let help = if help.is_empty() { full_name.as_str() } else { help };

        let inner = prometheus::Gauge::with_opts(Opts::new(name, help).namespace(namespace))
            .map_err(|e| RegistryError::InvalidName {
                name: full_name.clone(),
                reason: e.to_string(),
            })?;
        inner.set(initial);

        let mut index = self.index.write().await;
        match self.registry.register(Box::new(inner.clone())) {
            Ok(()) => {}
            Err(prometheus::Error::AlreadyReg) => {
                return Err(RegistryError::AlreadyRegistered(full_name));
            }
            Err(e) => {
                return Err(RegistryError::InvalidName {
                    name: full_name,
                    reason: e.to_string(),
                });
            }
        }

        let gauge = Gauge {
            inner,
            name: Arc::from(full_name.as_str()),
            help: Arc::from(help),
        };
        index.insert(full_name, gauge.clone());
        debug!(name = %gauge.name(), "gauge registered");
        Ok(gauge)
    }

    /// Look up a gauge by fully qualified name.
    pub async fn get(&self, full_name: &str) -> Option<Gauge> {
        self.index.read().await.get(full_name).cloned()
    }

    /// Registered names in order.
    pub async fn names(&self) -> Vec<String> {
        self.index.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Current state of every gauge, for a text encoder.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}

/// Whether `namespace` can prefix metric names.
pub fn is_valid_namespace(namespace: &str) -> bool {
    prometheus::Gauge::with_opts(Opts::new("up", "up").namespace(namespace)).is_ok()
}
