//! Translator tests focusing on critical behavior

use f5ltm_exporter::collectors::{populate_pool_metrics, populate_sync_metric, PoolSummary};
use f5ltm_exporter::f5::types::PoolStatsResponse;
use f5ltm_exporter::metrics::ProbeMetrics;
use serde_json::json;

fn create_test_metrics() -> ProbeMetrics {
    ProbeMetrics::new().expect("Failed to create test metrics")
}

fn stats(pools: &[(&str, &str)]) -> PoolStatsResponse {
    let entries: serde_json::Map<String, serde_json::Value> = pools
        .iter()
        .enumerate()
        .map(|(i, (name, availability))| {
            (
                format!("entry{}", i),
                json!({"nestedStats": {"entries": {
                    "activeMemberCnt": {"value": i + 1},
                    "availableMemberCnt": {"value": i + 2},
                    "memberCnt": {"value": i + 3},
                    "serverside.curConns": {"value": 10},
                    "serverside.totConns": {"value": 20},
                    "status.availabilityState": {"description": availability},
                    "tmName": {"description": name}
                }}}),
            )
        })
        .collect();

    serde_json::from_value(json!({ "entries": entries })).expect("Failed to parse stats")
}

#[test]
fn test_populate_pool_metrics_sets_every_gauge() {
    // Given: A single available pool
    let metrics = create_test_metrics();
    let response = stats(&[("/Common/app-pool", "available")]);

    // When: Translating it
    let summary = populate_pool_metrics(&metrics, &response);

    // Then: All six gauges carry the split name as labels
    assert_eq!(
        summary,
        PoolSummary {
            translated: 1,
            skipped: 0
        }
    );
    let labels = ["Common", "app-pool"];
    assert_eq!(metrics.pool_state.with_label_values(&labels).get(), 1.0);
    assert_eq!(metrics.pool_members_active.with_label_values(&labels).get(), 1.0);
    assert_eq!(metrics.pool_members_available.with_label_values(&labels).get(), 2.0);
    assert_eq!(metrics.pool_members_configured.with_label_values(&labels).get(), 3.0);
    assert_eq!(metrics.pool_connections_current.with_label_values(&labels).get(), 10.0);
    assert_eq!(metrics.pool_connections_total.with_label_values(&labels).get(), 20.0);
}

#[test]
fn test_populate_pool_metrics_skips_malformed_names() {
    // Given: A mix of valid and malformed pool names
    let metrics = create_test_metrics();
    let response = stats(&[
        ("/Common/web", "available"),
        ("malformed", "available"),
        ("/Common/app.app/pool", "available"),
        ("/Tenant/api", "offline"),
    ]);

    // When: Translating
    let summary = populate_pool_metrics(&metrics, &response);

    // Then: Valid pools are kept, the rest are counted as skipped
    assert_eq!(summary.translated, 2);
    assert_eq!(summary.skipped, 2);

    let rendered = metrics.render().expect("Failed to render");
    assert!(rendered.contains(r#"f5ltm_pool_state{partition_name="Common",pool_name="web"} 1"#));
    assert!(rendered.contains(r#"f5ltm_pool_state{partition_name="Tenant",pool_name="api"} 0"#));
    assert!(!rendered.contains("malformed"));
    assert!(!rendered.contains("app.app"));
}

#[test]
fn test_populate_pool_metrics_with_no_pools() {
    let metrics = create_test_metrics();

    let summary = populate_pool_metrics(&metrics, &PoolStatsResponse::default());

    assert_eq!(summary, PoolSummary::default());
    let rendered = metrics.render().expect("Failed to render");
    assert!(!rendered.contains("f5ltm_pool_state"));
}

#[test]
fn test_populate_sync_metric() {
    let metrics = create_test_metrics();

    populate_sync_metric(&metrics, true);
    assert_eq!(metrics.sync_status.get(), 1.0);

    populate_sync_metric(&metrics, false);
    assert_eq!(metrics.sync_status.get(), 0.0);
}
