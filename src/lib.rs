//! F5 BIG-IP LTM Prometheus Exporter
//!
//! A multi-target Prometheus exporter for F5 BIG-IP Local Traffic Manager appliances.
//!
//! # Overview
//!
//! Each scrape of `/probe?target=<host>` logs in to the named appliance over the
//! iControl REST API, reads pool statistics and device-group sync status, and
//! answers with a fresh Prometheus text exposition. Nothing is shared between
//! probes except the per-target session tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   GET /probe?target=x   ┌──────────────────────────┐
//! │ Prometheus │ ──────────────────────► │         Exporter         │
//! └────────────┘ ◄────────────────────── │  ┌────────┐  ┌────────┐  │   iControl REST   ┌─────────┐
//!                     text exposition    │  │ Prober │─►│F5Client│──┼─────────────────► │ BIG-IP  │
//!                                        │  └────────┘  └────────┘  │   HTTPS + token   └─────────┘
//!                                        │  ┌──────────────────┐    │
//!                                        │  │ Metric translators│   │
//!                                        │  └──────────────────┘    │
//!                                        └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`f5`] - iControl REST transport, session tokens and API types
//! - [`collectors`] - Translation of API responses into gauges
//! - [`metrics`] - Per-probe metric sets and exporter self-metrics
//! - [`prober`] - Probe sequencing, deadlines and session reuse
//! - [`server`] - HTTP endpoints
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use f5ltm_exporter::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     config.validate()?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod f5;
pub mod metrics;
pub mod prober;
pub mod server;
