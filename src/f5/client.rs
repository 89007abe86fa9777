//! F5 iControl REST Client
//!
//! This module provides the read side of the exporter: the two telemetry calls a
//! probe makes once it holds a session token.
//!
//! # Example
//!
//! ```no_run
//! use f5ltm_exporter::config::F5Config;
//! use f5ltm_exporter::f5::{Endpoint, F5Client};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> f5ltm_exporter::error::Result<()> {
//! let config = F5Config::new("monitor", "secret");
//! let client = F5Client::new(Endpoint::new("https", "bigip.example.net", 443), &config)?;
//!
//! let cancel = CancellationToken::new();
//! let acquired = client.session().acquire_token(&cancel).await?;
//! let stats = client.fetch_pool_stats(&acquired.token, &cancel).await?;
//! let in_sync = client.fetch_sync_status(&acquired.token, &cancel).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::F5Config;
use crate::error::{ExporterError, Result};
use crate::f5::session::{Endpoint, SessionManager, Token};
use crate::f5::transport::{Auth, Transport};
use crate::f5::types::{PoolStatsResponse, SyncStatusResponse};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const POOL_STATS_PATH: &str = "/mgmt/tm/ltm/pool/stats";
pub const SYNC_STATUS_PATH: &str = "/mgmt/tm/cm/sync-status";

/// Client for one appliance
///
/// Wraps the [`SessionManager`] that owns the appliance's token, so the client can
/// drop a token the appliance no longer accepts.
#[derive(Debug)]
pub struct F5Client {
    session: SessionManager,
}

impl F5Client {
    pub fn new(endpoint: Endpoint, config: &F5Config) -> Result<Self> {
        Ok(Self {
            session: SessionManager::new(endpoint, config)?,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.session.endpoint()
    }

    /// Query pool statistics
    pub async fn fetch_pool_stats(
        &self,
        token: &Token,
        cancel: &CancellationToken,
    ) -> Result<PoolStatsResponse> {
        let stats: PoolStatsResponse = self
            .get_json(POOL_STATS_PATH, "pool stats", token, cancel)
            .await?;
        debug!(host = %self.endpoint(), pools = stats.entries.len(), "pool stats received");
        Ok(stats)
    }

    /// Query the config-sync state; `true` iff the first entry reads "In Sync"
    pub async fn fetch_sync_status(
        &self,
        token: &Token,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let response: SyncStatusResponse = self
            .get_json(SYNC_STATUS_PATH, "sync status", token, cancel)
            .await?;

        if response.entries.len() > 1 {
            debug!(
                host = %self.endpoint(),
                entries = response.entries.len(),
                "sync status has several entries, using the first"
            );
        }

        Ok(response.is_in_sync())
    }

    /// GET `path` with the session token and decode a 200 answer as `T`.
    ///
    /// A 401 means the appliance dropped the session early, so the cached token is
    /// invalidated before the error is returned.
    async fn get_json<T>(
        &self,
        path: &str,
        what: &'static str,
        token: &Token,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let auth = Auth::token(token.value());
        let response = self
            .session
            .transport()
            .execute(
                Method::GET,
                &self.endpoint().url(path),
                None,
                None,
                Some(&auth),
                cancel,
            )
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(host = %self.endpoint(), what, "session token rejected");
            self.session.invalidate(token).await;
        }
        if status != StatusCode::OK {
            return Err(ExporterError::UpstreamFailed(format!(
                "failed to get {}: HTTP {}",
                what,
                status.as_u16()
            )));
        }

        let body = Transport::read_body(response, cancel).await?;
        serde_json::from_slice(&body).map_err(|source| ExporterError::DecodeFailed { what, source })
    }
}
