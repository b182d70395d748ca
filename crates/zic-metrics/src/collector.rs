//! Metrics collector: polls Zabbix internal items and publishes them as
//! gauges.
//!
//! One background task owns the schedule. Every tick tries to enter the
//! [`CycleGate`]; a tick that finds the previous cycle still running is
//! dropped, so at most one cycle is ever in flight.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use zic_rpc::{AuthToken, Item, RpcError, RpcErrorKind, ZabbixApi};

use crate::registry::{Gauge, GaugeRegistry, RegistryError};
use crate::sanitize::sanitize_metric_name;

pub const DEFAULT_NAMESPACE: &str = "zabbix_internal_checks";
/// Matches every internal item.
pub const DEFAULT_ITEM_KEY_PATTERN: &str = "zabbix[*]";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

const COLLECTED_AT_NAME: &str = "metrics_collected_at";
const COLLECTED_AT_HELP: &str = "Epoch milliseconds at Zabbix internal checks metrics were collected";
/// Collected-at value until the first cycle publishes.
const NEVER_COLLECTED: f64 = -1.0;
const ENABLED_ITEM_STATUS: i64 = 0;

/// Zabbix API user credentials.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Static collector settings.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Prefix of every published metric name.
    pub namespace: String,
    /// `item.get` key search pattern.
    pub item_key_pattern: String,
    /// Time between ticks. Must be non-zero.
    pub interval: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            item_key_pattern: DEFAULT_ITEM_KEY_PATTERN.to_string(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl CollectorSettings {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Session state between cycles.
///
/// ```text
/// Authenticated ──request-level failure──► re-login ok ──► Authenticated
///                                          re-login err ─► ReAuthenticating
/// ReAuthenticating ──next tick──► fetch with the stale token
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Holding a token obtained by the last successful login.
    Authenticated(AuthToken),
    /// Re-login failed; the stale token is kept for the next attempt.
    ReAuthenticating(AuthToken),
}

impl AuthState {
    pub fn token(&self) -> &AuthToken {
        match self {
            AuthState::Authenticated(token) | AuthState::ReAuthenticating(token) => token,
        }
    }

    #[cfg(test)]
    fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    fn mark_stale(&mut self) {
        if let AuthState::Authenticated(token) = self {
            let token = token.clone();
            *self = AuthState::ReAuthenticating(token);
        }
    }

    /// A fetch succeeded with the current token.
    fn confirm(&mut self) {
        if let AuthState::ReAuthenticating(token) = self {
            let token = token.clone();
            *self = AuthState::Authenticated(token);
        }
    }
}

/// Per-cycle item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub seen: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// How a non-fatal cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Items were processed and the collected-at gauge advanced.
    Published(CycleStats),
    /// The fetch failed and a fresh token was obtained. Nothing published.
    ReAuthenticated,
    /// The fetch failed and so did re-login. Nothing published.
    ReAuthFailed,
}

/// Conditions that end the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed user.login request on init: {0}")]
    StartupLogin(RpcError),

    #[error("failed item.get request: {0}")]
    Fetch(RpcError),

    #[error("cannot register collection timestamp gauge: {0}")]
    Registry(RegistryError),

    #[error("collection interval {0:?} is out of range")]
    InvalidInterval(Duration),

    #[error("collection cycle task failed: {0}")]
    TaskFailed(String),
}

/// Single-slot admission gate for collection cycles.
#[derive(Debug, Clone)]
pub struct CycleGate {
    slot: Arc<Semaphore>,
}

/// Proof of holding the gate. Released on drop.
#[must_use]
#[derive(Debug)]
pub struct CyclePermit {
    _permit: OwnedSemaphorePermit,
}

impl CycleGate {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Enter without waiting. `None` while another holder is inside.
    pub fn try_enter(&self) -> Option<CyclePermit> {
        Arc::clone(&self.slot)
            .try_acquire_owned()
            .ok()
            .map(|permit| CyclePermit { _permit: permit })
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for CycleGate {
    fn default() -> Self {
        Self::new()
    }
}

/// State carried from one cycle to the next. Only touched under the gate.
struct Session {
    auth: AuthState,
    /// Raw item key → gauge.
    gauges: HashMap<String, Gauge>,
    collected_at: Gauge,
}

/// Collects "Zabbix internal checks" into a [`GaugeRegistry`].
pub struct MetricsCollector<A> {
    api: Arc<A>,
    credentials: Arc<Credentials>,
    settings: CollectorSettings,
    registry: GaugeRegistry,
    gate: CycleGate,
}

impl<A> Clone for MetricsCollector<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            credentials: Arc::clone(&self.credentials),
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<A: ZabbixApi + 'static> MetricsCollector<A> {
    pub fn new(
        api: A,
        credentials: Credentials,
        settings: CollectorSettings,
        registry: GaugeRegistry,
    ) -> Self {
        Self {
            api: Arc::new(api),
            credentials: Arc::new(credentials),
            settings,
            registry,
            gate: CycleGate::new(),
        }
    }

    /// The registry gauges are published into.
    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    /// Spawn [`run`](Self::run) in the background and return immediately.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), CollectorError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Log in, then collect once per interval until shutdown.
    ///
    /// The first tick fires one interval after login. Returns `Err` on a
    /// failed startup login or an unexpected `item.get` failure; an
    /// in-flight cycle is awaited on shutdown, never cancelled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), CollectorError> {
        let period = self.settings.interval;
        let first_tick = Instant::now()
            .checked_add(period)
            .filter(|_| !period.is_zero())
            .ok_or(CollectorError::InvalidInterval(period))?;

        let session = Arc::new(Mutex::new(self.init().await?));
        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            namespace = %self.settings.namespace,
            "metrics collector started"
        );

        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.gate.try_enter() {
                    Some(permit) => {
                        let collector = self.clone();
                        let session = Arc::clone(&session);
                        cycles.spawn(async move {
                            let _permit = permit;
                            let mut session = session.lock().await;
                            collector.cycle(&mut session).await
                        });
                    }
                    None => debug!("previous collection cycle still running; tick skipped"),
                },
                Some(joined) = cycles.join_next() => {
                    settle(joined)?;
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    while let Some(joined) = cycles.join_next().await {
                        settle(joined)?;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn init(&self) -> Result<Session, CollectorError> {
        let collected_at = self
            .registry
            .register(
                &self.settings.namespace,
                COLLECTED_AT_NAME,
                COLLECTED_AT_HELP,
                NEVER_COLLECTED,
            )
            .await
            .map_err(CollectorError::Registry)?;

        let token = self
            .api
            .login(&self.credentials.user, &self.credentials.password)
            .await
            .map_err(CollectorError::StartupLogin)?;
        info!(user = %self.credentials.user, "authenticated with zabbix");

        Ok(Session {
            auth: AuthState::Authenticated(token),
            gauges: HashMap::new(),
            collected_at,
        })
    }

    async fn cycle(&self, session: &mut Session) -> Result<CycleOutcome, CollectorError> {
        let fetched = self
            .api
            .fetch_items(session.auth.token(), &self.settings.item_key_pattern)
            .await;

        let items = match fetched {
            Ok(items) => items,
            Err(e) if e.kind() == RpcErrorKind::Request => {
                return Ok(self.reauthenticate(session, &e).await);
            }
            Err(e) => return Err(CollectorError::Fetch(e)),
        };
        session.auth.confirm();

        let mut stats = CycleStats {
            seen: items.len(),
            ..CycleStats::default()
        };
        for item in &items {
            if self.publish(session, item).await {
                stats.updated += 1;
            } else {
                stats.skipped += 1;
            }
        }

        session.collected_at.set(epoch_millis());
        debug!(
            seen = stats.seen,
            updated = stats.updated,
            skipped = stats.skipped,
            "internal items published"
        );
        Ok(CycleOutcome::Published(stats))
    }

    /// The fetch failed at request level: either the token expired or the
    /// server was unreachable. Log in again; the fetch is not retried.
    async fn reauthenticate(&self, session: &mut Session, cause: &RpcError) -> CycleOutcome {
        warn!(error = %cause, "item.get request failed; re-authenticating");

        match self
            .api
            .login(&self.credentials.user, &self.credentials.password)
            .await
        {
            Ok(token) => {
                info!("re-authenticated with zabbix");
                session.auth = AuthState::Authenticated(token);
                CycleOutcome::ReAuthenticated
            }
            Err(e) => {
                error!(error = %e, "failed user.login request on re-authentication; continue");
                session.auth.mark_stale();
                CycleOutcome::ReAuthFailed
            }
        }
    }

    /// Set the item's gauge, creating it on first sight. Returns whether a
    /// gauge was updated.
    async fn publish(&self, session: &mut Session, item: &Item) -> bool {
        let Some(value) = collectible_value(item) else {
            return false;
        };

        if let Some(gauge) = session.gauges.get(&item.key) {
            gauge.set(value);
            return true;
        }

        let name = sanitize_metric_name(&item.key);
        match self
            .registry
            .register(&self.settings.namespace, &name, &item.name, value)
            .await
        {
            Ok(gauge) => {
                session.gauges.insert(item.key.clone(), gauge);
                true
            }
            Err(e) => {
                warn!(key = %item.key, error = %e, "cannot publish item; skip");
                false
            }
        }
    }
}

/// The value an item publishes this cycle, if any.
///
/// Only enabled items (status `0`) whose last value is a numeric string
/// qualify.
fn collectible_value(item: &Item) -> Option<f64> {
    let status: i64 = match item.status.parse() {
        Ok(status) => status,
        Err(e) => {
            warn!(key = %item.key, status = %item.status, error = %e, "failed to parse a `status` of item; skip");
            return None;
        }
    };
    if status != ENABLED_ITEM_STATUS {
        return None;
    }

    item.last_value.as_ref()?.as_text()?.parse::<f64>().ok()
}

fn settle(
    joined: Result<Result<CycleOutcome, CollectorError>, JoinError>,
) -> Result<(), CollectorError> {
    match joined {
        Ok(Ok(outcome)) => {
            debug!(?outcome, "collection cycle finished");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(CollectorError::TaskFailed(e.to_string())),
    }
}

fn epoch_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}
