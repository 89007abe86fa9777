//! Probe Orchestration
//!
//! One probe is one scrape of one appliance:
//!
//! ```text
//! Idle ──▶ TokenAcquired ──▶ StatsCollected ──▶ SyncCollected ──▶ Rendered
//!   │            │                 │                  │
//!   └────────────┴─────────────────┴──────────────────┴──▶ Aborted(error)
//! ```
//!
//! # Session modes
//!
//! - [`SessionMode::Cached`]: one [`F5Client`] per target is kept in a
//!   [`SessionRegistry`] for the life of the process. Tokens are renewed lazily
//!   and never deleted, so the appliance holds one session per exporter and target.
//! - [`SessionMode::Ephemeral`]: every probe logs in and deletes its token on the
//!   way out, whether it succeeded or not. No session is left behind, at the
//!   price of two extra round trips per scrape.
//!
//! # Deadlines
//!
//! A probe deadline fires a [`CancellationToken`] that every outbound call and
//! every retry backoff listens to.

use crate::collectors;
use crate::config::{F5Config, ProbeConfig, SessionMode};
use crate::error::{ExporterError, Result};
use crate::f5::{Endpoint, F5Client, Token, TokenSource};
use crate::metrics::{ExporterMetrics, ProbeMetrics};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    TokenAcquired,
    StatsCollected,
    SyncCollected,
    Rendered,
}

/// Appliance address taken from the `target` query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    pub fn endpoint(&self, config: &F5Config) -> Endpoint {
        Endpoint::new(
            config.scheme(),
            self.host.clone(),
            self.port.unwrap_or(config.port),
        )
    }
}

fn invalid_target(raw: &str) -> ExporterError {
    ExporterError::BadRequest(format!("Invalid target parameter: {:?}", raw))
}

fn parse_port(raw: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid_target(raw)),
    }
}

impl FromStr for Target {
    type Err = ExporterError;

    /// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExporterError::BadRequest(
                "Target parameter is missing".to_string(),
            ));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | '\\'))
        {
            return Err(invalid_target(raw));
        }

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid_target(raw))?;
            let port = match tail {
                "" => None,
                tail => {
                    let port = tail.strip_prefix(':').ok_or_else(|| invalid_target(raw))?;
                    Some(parse_port(raw, port)?)
                }
            };
            (host, port)
        } else {
            match trimmed.matches(':').count() {
                0 => (trimmed, None),
                1 => {
                    let (host, port) = trimmed.split_once(':').ok_or_else(|| invalid_target(raw))?;
                    (host, Some(parse_port(raw, port)?))
                }
                // bare IPv6 literal
                _ => (trimmed, None),
            }
        };

        if host.is_empty() || host.contains('[') || host.contains(']') {
            return Err(invalid_target(raw));
        }

        Ok(Target {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host.contains(':'), self.port) {
            (true, Some(port)) => write!(f, "[{}]:{}", self.host, port),
            (false, Some(port)) => write!(f, "{}:{}", self.host, port),
            (_, None) => f.write_str(&self.host),
        }
    }
}

/// Long-lived clients, one per appliance endpoint
#[derive(Debug, Default)]
pub struct SessionRegistry {
    clients: Mutex<HashMap<Endpoint, Arc<F5Client>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn client_for(&self, endpoint: Endpoint, config: &F5Config) -> Result<Arc<F5Client>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&endpoint) {
            return Ok(client.clone());
        }

        debug!(host = %endpoint, "creating session for new target");
        let client = Arc::new(F5Client::new(endpoint.clone(), config)?);
        clients.insert(endpoint, client.clone());
        Ok(client)
    }

    /// Drop `client` if it is still the one held for its endpoint.
    pub async fn evict(&self, client: &Arc<F5Client>) {
        let mut clients = self.clients.lock().await;
        if clients
            .get(client.endpoint())
            .is_some_and(|held| Arc::ptr_eq(held, client))
        {
            clients.remove(client.endpoint());
            debug!(host = %client.endpoint(), "session dropped from registry");
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

/// Cancels a token once a deadline passes; disarmed on drop
struct DeadlineGuard(JoinHandle<()>);

impl DeadlineGuard {
    fn arm(cancel: CancellationToken, deadline: Duration) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        }))
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Prober {
    config: F5Config,
    settings: ProbeConfig,
    registry: SessionRegistry,
    metrics: ExporterMetrics,
}

impl Prober {
    pub fn new(config: F5Config, settings: ProbeConfig, metrics: ExporterMetrics) -> Self {
        Self {
            config,
            settings,
            registry: SessionRegistry::new(),
            metrics,
        }
    }

    pub fn session_mode(&self) -> SessionMode {
        self.settings.session_mode
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Deadline applied when the caller supplies none
    pub fn default_deadline(&self) -> Option<Duration> {
        self.settings.timeout_seconds.map(Duration::from_secs_f64)
    }

    /// Probe `target` and return the rendered metric set.
    ///
    /// Records the outcome in the exporter metrics and logs one event per probe.
    pub async fn run(&self, target: Option<&str>, deadline: Option<Duration>) -> Result<String> {
        let start = Instant::now();
        let raw_target = target.unwrap_or_default();

        let result = match raw_target.parse::<Target>() {
            Ok(target) => {
                let cancel = CancellationToken::new();
                let _deadline = deadline
                    .or_else(|| self.default_deadline())
                    .map(|d| DeadlineGuard::arm(cancel.clone(), d));
                self.probe(&target, &cancel).await
            }
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(_) => {
                self.metrics.observe_probe("success", elapsed);
                info!(
                    appliance = raw_target,
                    duration_seconds = elapsed.as_secs_f64(),
                    "F5 device scrape"
                );
            }
            Err(e) => {
                self.metrics.observe_probe(e.outcome(), elapsed);
                error!(
                    appliance = raw_target,
                    duration_seconds = elapsed.as_secs_f64(),
                    error = %e,
                    "F5 device scrape failed"
                );
            }
        }

        result
    }

    /// Run the state machine for an already-parsed target.
    pub async fn probe(&self, target: &Target, cancel: &CancellationToken) -> Result<String> {
        let endpoint = target.endpoint(&self.config);
        debug!(host = %endpoint, state = ?ProbeState::Idle, "probe started");

        let client = match self.settings.session_mode {
            SessionMode::Cached => self.registry.client_for(endpoint, &self.config).await?,
            SessionMode::Ephemeral => Arc::new(F5Client::new(endpoint, &self.config)?),
        };

        // A cached token never fails, so an error here means the client holds no
        // usable session.
        let acquired = match client.session().acquire_token(cancel).await {
            Ok(acquired) => acquired,
            Err(e) => {
                if self.settings.session_mode == SessionMode::Cached {
                    self.registry.evict(&client).await;
                }
                return Err(e);
            }
        };
        if acquired.source == TokenSource::Login {
            self.metrics.logins_total.inc();
        }
        debug!(host = %client.endpoint(), state = ?ProbeState::TokenAcquired, source = ?acquired.source);

        let result = collect(&client, &acquired.token, cancel).await;

        if self.settings.session_mode == SessionMode::Ephemeral {
            close_session(client, acquired.token, cancel).await;
        }

        result
    }
}

async fn collect(client: &F5Client, token: &Token, cancel: &CancellationToken) -> Result<String> {
    let metrics = ProbeMetrics::new()?;

    let stats = client.fetch_pool_stats(token, cancel).await?;
    let summary = collectors::populate_pool_metrics(&metrics, &stats);
    debug!(
        host = %client.endpoint(),
        state = ?ProbeState::StatsCollected,
        pools = summary.translated,
        skipped = summary.skipped
    );

    let in_sync = client.fetch_sync_status(token, cancel).await?;
    collectors::populate_sync_metric(&metrics, in_sync);
    debug!(host = %client.endpoint(), state = ?ProbeState::SyncCollected, in_sync);

    let rendered = metrics.render()?;
    debug!(host = %client.endpoint(), state = ?ProbeState::Rendered);
    Ok(rendered)
}

/// Best-effort logout for ephemeral sessions.
///
/// After a deadline the probe's own token is already cancelled, so the logout
/// runs detached with a fresh one instead of holding up the response.
async fn close_session(client: Arc<F5Client>, token: Token, cancel: &CancellationToken) {
    if cancel.is_cancelled() {
        tokio::spawn(async move {
            client
                .session()
                .logout(&token, &CancellationToken::new())
                .await;
        });
    } else {
        client.session().logout(&token, cancel).await;
    }
}
