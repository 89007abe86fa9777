//! Pool Metrics Translator
//!
//! Translates `/mgmt/tm/ltm/pool/stats` into per-pool gauges.
//!
//! # Metrics Produced
//! - `f5ltm_pool_state` - 1 when `status.availabilityState` is exactly `available`
//! - `f5ltm_pool_members_active_total` - `activeMemberCnt`
//! - `f5ltm_pool_members_available_total` - `availableMemberCnt`
//! - `f5ltm_pool_members_configured_total` - `memberCnt`
//! - `f5ltm_pool_connections_current` - `serverside.curConns`
//! - `f5ltm_pool_connections_total` - `serverside.totConns`
//!
//! All labelled by `partition_name` and `pool_name`, taken from `tmName`.

use crate::f5::types::{PoolStats, PoolStatsResponse, AVAILABLE};
use crate::metrics::ProbeMetrics;
use thiserror::Error;
use tracing::{debug, warn};

/// Partition and pool segments of a `/<partition>/<pool>` name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolName<'a> {
    pub partition: &'a str,
    pub pool: &'a str,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("pool name {0:?} is not of the form /<partition>/<pool>")]
pub struct MalformedName(pub String);

/// Split a full pool path into its partition and pool name.
///
/// Requires a leading `/` followed by exactly two non-empty segments.
///
/// ```
/// use f5ltm_exporter::collectors::parse_pool_name;
///
/// let name = parse_pool_name("/Common/pool_web").unwrap();
/// assert_eq!((name.partition, name.pool), ("Common", "pool_web"));
/// assert!(parse_pool_name("malformed").is_err());
/// ```
pub fn parse_pool_name(raw: &str) -> Result<PoolName<'_>, MalformedName> {
    let malformed = || MalformedName(raw.to_string());

    let path = raw.strip_prefix('/').ok_or_else(malformed)?;
    let mut segments = path.split('/');

    match (segments.next(), segments.next(), segments.next()) {
        (Some(partition), Some(pool), None) if !partition.is_empty() && !pool.is_empty() => {
            Ok(PoolName { partition, pool })
        }
        _ => Err(malformed()),
    }
}

/// 1.0 for `available`, 0.0 for every other availability description
pub fn availability_value(description: &str) -> f64 {
    if description == AVAILABLE {
        1.0
    } else {
        0.0
    }
}

/// Outcome of translating one pool stats response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub translated: usize,
    pub skipped: usize,
}

fn set_pool(metrics: &ProbeMetrics, name: PoolName<'_>, stats: &PoolStats) {
    let labels = [name.partition, name.pool];

    metrics
        .pool_state
        .with_label_values(&labels)
        .set(availability_value(&stats.availability_state.description));
    metrics
        .pool_members_active
        .with_label_values(&labels)
        .set(stats.active_member_cnt.value as f64);
    metrics
        .pool_members_available
        .with_label_values(&labels)
        .set(stats.available_member_cnt.value as f64);
    metrics
        .pool_members_configured
        .with_label_values(&labels)
        .set(stats.member_cnt.value as f64);
    metrics
        .pool_connections_current
        .with_label_values(&labels)
        .set(stats.serverside_cur_conns.value as f64);
    metrics
        .pool_connections_total
        .with_label_values(&labels)
        .set(stats.serverside_tot_conns.value as f64);
}

/// Set every pool gauge from `response`, skipping entries with a malformed name.
pub fn populate_pool_metrics(metrics: &ProbeMetrics, response: &PoolStatsResponse) -> PoolSummary {
    let mut summary = PoolSummary::default();

    for stats in response.pools() {
        match parse_pool_name(&stats.tm_name.description) {
            Ok(name) => {
                set_pool(metrics, name, stats);
                summary.translated += 1;
            }
            Err(e) => {
                warn!(tm_name = %stats.tm_name.description, "skipping pool: {}", e);
                summary.skipped += 1;
            }
        }
    }

    debug!(
        translated = summary.translated,
        skipped = summary.skipped,
        "pool stats translated"
    );
    summary
}
