//! Prometheus Metrics Definitions
//!
//! Two registries live here.
//!
//! ## Probe metrics ([`ProbeMetrics`])
//!
//! Built fresh for every `/probe` request and rendered once. Nothing is carried
//! from one probe to the next, so pools that disappear from an appliance vanish
//! from the next scrape.
//!
//! - `f5ltm_pool_state` - 1 if the pool is available, 0 otherwise
//! - `f5ltm_pool_members_active_total` - Active members
//! - `f5ltm_pool_members_available_total` - Available members
//! - `f5ltm_pool_members_configured_total` - Configured members
//! - `f5ltm_pool_connections_current` - Current server-side connections
//! - `f5ltm_pool_connections_total` - Total server-side connections
//! - `f5ltm_sync_status` - 1 if the device group is in sync
//!
//! Pool metrics carry `partition_name` and `pool_name` labels.
//!
//! ## Exporter metrics ([`ExporterMetrics`])
//!
//! Process-wide counters about the exporter itself, served on `/metrics`.

use crate::error::Result;
use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "f5ltm";

pub const POOL_LABELS: [&str; 2] = ["partition_name", "pool_name"];

fn encode(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&registry.gather())?)
}

/// Metric set of a single probe
pub struct ProbeMetrics {
    registry: Registry,

    pub pool_state: GaugeVec,
    pub pool_members_active: GaugeVec,
    pub pool_members_available: GaugeVec,
    pub pool_members_configured: GaugeVec,
    pub pool_connections_current: GaugeVec,
    pub pool_connections_total: GaugeVec,
    pub sync_status: Gauge,
}

impl ProbeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pool_gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &POOL_LABELS)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let pool_state = pool_gauge("pool_state", "F5 LTM pool availability (1=available)")?;
        let pool_members_active =
            pool_gauge("pool_members_active_total", "F5 LTM pool active members count")?;
        let pool_members_available = pool_gauge(
            "pool_members_available_total",
            "F5 LTM pool available members count",
        )?;
        let pool_members_configured = pool_gauge(
            "pool_members_configured_total",
            "F5 LTM pool configured members count",
        )?;
        let pool_connections_current = pool_gauge(
            "pool_connections_current",
            "F5 LTM pool current server-side connections",
        )?;
        let pool_connections_total = pool_gauge(
            "pool_connections_total",
            "F5 LTM pool total server-side connections",
        )?;

        let sync_status = Gauge::with_opts(
            Opts::new("sync_status", "F5 config sync status (1=In Sync)").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(sync_status.clone()))?;

        Ok(Self {
            registry,
            pool_state,
            pool_members_active,
            pool_members_available,
            pool_members_configured,
            pool_connections_current,
            pool_connections_total,
            sync_status,
        })
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        encode(&self.registry)
    }
}

/// Exporter self-metrics
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Arc<Registry>,

    pub probes_total: Arc<IntCounterVec>,
    pub probe_duration_seconds: Arc<HistogramVec>,
    pub logins_total: Arc<IntCounter>,
    pub build_info: Arc<IntGaugeVec>,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let probes_total = IntCounterVec::new(
            Opts::new("probes_total", "Probes handled, by outcome")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
            &["outcome"],
        )?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("probe_duration_seconds", "Probe duration in seconds")
                .namespace(NAMESPACE)
                .subsystem("exporter")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["outcome"],
        )?;

        let logins_total = IntCounter::with_opts(
            Opts::new("logins_total", "Logins performed against probed appliances")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
        )?;

        let build_info = IntGaugeVec::new(
            Opts::new("build_info", "Exporter build information (value is always 1)")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;
        registry.register(Box::new(logins_total.clone()))?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            probes_total: Arc::new(probes_total),
            probe_duration_seconds: Arc::new(probe_duration_seconds),
            logins_total: Arc::new(logins_total),
            build_info: Arc::new(build_info),
        })
    }

    pub fn observe_probe(&self, outcome: &str, elapsed: Duration) {
        self.probes_total.with_label_values(&[outcome]).inc();
        self.probe_duration_seconds
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        encode(&self.registry)
    }
}
