//! Sync Status Translator
//!
//! - `f5ltm_sync_status` - 1 when the device group reports "In Sync", 0 otherwise

use crate::metrics::ProbeMetrics;

pub fn sync_value(in_sync: bool) -> f64 {
    if in_sync {
        1.0
    } else {
        0.0
    }
}

pub fn populate_sync_metric(metrics: &ProbeMetrics, in_sync: bool) {
    metrics.sync_status.set(sync_value(in_sync));
}
