//! Metric Translators
//!
//! Turn decoded iControl REST responses into the gauges of a [`ProbeMetrics`] set.
//!
//! # Architecture
//!
//! Translators are plain functions over already-fetched data:
//! - Accept a `&ProbeMetrics` and a decoded response
//! - Set one series per pool and metric name
//! - Never fail: malformed entries are skipped with a warning
//!
//! Fetching lives in [`crate::f5::F5Client`]; sequencing lives in [`crate::prober`].
//!
//! [`ProbeMetrics`]: crate::metrics::ProbeMetrics

pub mod pool;
pub mod sync;

pub use pool::{availability_value, parse_pool_name, populate_pool_metrics, PoolName, PoolSummary};
pub use sync::{populate_sync_metric, sync_value};
