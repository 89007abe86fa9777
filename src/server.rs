//! HTTP Server
//!
//! This module implements the exporter's HTTP surface. Unlike a single-target
//! exporter there is no background collection loop: every `/probe` request runs
//! one probe against the appliance named in its `target` parameter.
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to the other endpoints
//! - `GET /probe?target=<host>[:port]` - Probe one appliance and return its metrics
//! - `GET /metrics` - Exporter self-metrics
//! - `GET /healthz` - Liveness, always 200 while the process serves requests
//!
//! # Error Handling
//!
//! A failed probe is answered with the status from
//! [`ExporterError::status_code`](crate::error::ExporterError::status_code) and a
//! plain-text reason. It never affects other probes or the process.

use crate::config::Config;
use crate::metrics::ExporterMetrics;
use crate::prober::Prober;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Header Prometheus sets to the scrape timeout of the calling job
pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

/// Headroom left between the probe deadline and the scrape timeout
const SCRAPE_TIMEOUT_OFFSET: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct AppState {
    pub prober: Arc<Prober>,
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let metrics = ExporterMetrics::new()?;
        let prober = Arc::new(Prober::new(
            config.f5.clone(),
            config.probe.clone(),
            metrics.clone(),
        ));
        Ok(Self { prober, metrics })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    target: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Exporter listening on {}", addr);
    info!("Probe endpoint at http://{}/probe?target=<host>", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Exporter shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, waiting for ongoing probes to complete");
}

/// Probe deadline derived from the Prometheus scrape timeout header
pub fn scrape_deadline(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers
        .get(SCRAPE_TIMEOUT_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s > 0.0)?;

    let timeout = Duration::from_secs_f64(seconds);
    Some(
        timeout
            .checked_sub(SCRAPE_TIMEOUT_OFFSET)
            .filter(|d| !d.is_zero())
            .unwrap_or(timeout),
    )
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>F5 LTM Exporter</title></head>
<body>
<h1>F5 LTM Exporter</h1>
<form action="/probe">
<label>Target:</label> <input type="text" name="target" placeholder="bigip.example.net">
<input type="submit" value="Probe">
</form>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/healthz">Health</a></p>
</body>
</html>"#,
    )
}

async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
    headers: HeaderMap,
) -> Response {
    let deadline = scrape_deadline(&headers);

    match state.prober.run(params.target.as_deref(), deadline).await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => (e.status_code(), e.to_string()).into_response(),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(metrics) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], metrics).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
