//! Session token lifecycle
//!
//! A [`SessionManager`] owns the credentials for one appliance and hands out
//! session tokens. Tokens are cached and reused until they come within
//! [`TOKEN_GRACE`] of their expiry, at which point the next caller logs in again.
//!
//! # Concurrency
//!
//! The cached token lives behind a mutex that is never held across an HTTP call.
//! Two probes that both find the cache stale will both log in; the second login
//! simply replaces the cached token with another valid one. Logins are therefore
//! at-least-once rather than single-flight.

use crate::config::F5Config;
use crate::error::{ExporterError, Result};
use crate::f5::transport::{Auth, Transport};
use crate::f5::types::{AuthResponse, LoginRequest};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const LOGIN_PATH: &str = "/mgmt/shared/authn/login";
pub const TOKENS_PATH: &str = "/mgmt/shared/authz/tokens/";

/// Safety margin subtracted from a token's expiry before it is considered stale
pub const TOKEN_GRACE: Duration = Duration::from_secs(2 * 60);

/// Validity assumed when the login response carries no usable expiry
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(9 * 60 * 60);

/// Scheme, host and port of one appliance's management interface
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: &'static str,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(scheme: &'static str, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Session token and the instant the appliance stops accepting it
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: SystemTime,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// `now < expires_at - TOKEN_GRACE`
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match self.expires_at.checked_sub(TOKEN_GRACE) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }

    fn expires_in(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or_default()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where an acquired token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cached,
    Login,
}

#[derive(Debug, Clone)]
pub struct Acquired {
    pub token: Token,
    pub source: TokenSource,
}

/// Expiry of a freshly issued token.
///
/// A missing or non-positive `expirationMicros` falls back to
/// `now + DEFAULT_TOKEN_LIFETIME`.
pub fn expiry_from_micros(expiration_micros: Option<i64>, now: SystemTime) -> SystemTime {
    match expiration_micros {
        Some(micros) if micros > 0 => UNIX_EPOCH + Duration::from_micros(micros as u64),
        _ => now + DEFAULT_TOKEN_LIFETIME,
    }
}

pub struct SessionManager {
    endpoint: Endpoint,
    username: String,
    password: SecretString,
    login_provider: String,
    transport: Transport,
    cached: Mutex<Option<Token>>,
}

impl SessionManager {
    pub fn new(endpoint: Endpoint, config: &F5Config) -> Result<Self> {
        Ok(Self {
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            login_provider: config.login_provider.clone(),
            transport: Transport::new(config)?,
            cached: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Return a token that stays valid for at least [`TOKEN_GRACE`], logging in
    /// only when the cached one is missing or stale.
    ///
    /// # Errors
    ///
    /// [`ExporterError::AuthFailed`] when the login is rejected, cannot be sent or
    /// returns an unreadable body; [`ExporterError::Cancelled`] when `cancel` fires.
    pub async fn acquire_token(&self, cancel: &CancellationToken) -> Result<Acquired> {
        let now = SystemTime::now();
        let cached = {
            let guard = self.cached.lock().await;
            guard.as_ref().filter(|token| token.is_valid_at(now)).cloned()
        };

        if let Some(token) = cached {
            debug!(
                host = %self.endpoint,
                expires_in_secs = token.expires_in(now).as_secs(),
                "reusing cached token"
            );
            return Ok(Acquired {
                token,
                source: TokenSource::Cached,
            });
        }

        let token = self.login(cancel).await?;
        *self.cached.lock().await = Some(token.clone());

        Ok(Acquired {
            token,
            source: TokenSource::Login,
        })
    }

    async fn login(&self, cancel: &CancellationToken) -> Result<Token> {
        info!(host = %self.endpoint, provider = %self.login_provider, "performing new login");

        let payload = serde_json::to_vec(&LoginRequest {
            username: &self.username,
            password: self.password.expose_secret(),
            login_provider_name: &self.login_provider,
        })?;

        let response = self
            .transport
            .execute(
                Method::POST,
                &self.endpoint.url(LOGIN_PATH),
                Some("application/json"),
                Some(payload),
                None,
                cancel,
            )
            .await
            .map_err(|e| match e {
                ExporterError::Cancelled => e,
                other => {
                    error!(host = %self.endpoint, error = %other, "authentication request failed");
                    ExporterError::auth(other)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(host = %self.endpoint, status_code = status.as_u16(), "authentication failed");
            return Err(ExporterError::auth_rejected(status));
        }

        let body = Transport::read_body(response, cancel)
            .await
            .map_err(|e| match e {
                ExporterError::Cancelled => e,
                other => ExporterError::auth(other),
            })?;
        let auth: AuthResponse = serde_json::from_slice(&body).map_err(|source| {
            error!(host = %self.endpoint, error = %source, "failed to parse auth response");
            ExporterError::auth(ExporterError::DecodeFailed {
                what: "login response",
                source,
            })
        })?;

        if auth.token.token.is_empty() {
            return Err(ExporterError::auth(ExporterError::UpstreamFailed(
                "login response carried an empty token".to_string(),
            )));
        }

        let now = SystemTime::now();
        let token = Token::new(
            auth.token.token,
            expiry_from_micros(auth.token.expiration_micros, now),
        );

        debug!(
            host = %self.endpoint,
            expires_in_secs = token.expires_in(now).as_secs(),
            "new token acquired"
        );

        Ok(token)
    }

    /// Forget `token` if it is still the cached one.
    ///
    /// Called when the appliance rejects a token before its recorded expiry, e.g.
    /// after a failover or an administrator clearing sessions.
    pub async fn invalidate(&self, token: &Token) {
        let mut guard = self.cached.lock().await;
        if guard.as_ref().is_some_and(|cached| cached.value == token.value) {
            *guard = None;
            info!(host = %self.endpoint, "cached token invalidated");
        }
    }

    /// Delete `token` on the appliance. Best effort: failures are logged, never returned.
    ///
    /// Authenticates with basic credentials since the token itself may already be
    /// unusable.
    pub async fn logout(&self, token: &Token, cancel: &CancellationToken) {
        let url = self
            .endpoint
            .url(&format!("{}{}", TOKENS_PATH, token.value()));
        let auth = Auth::basic(&self.username, self.password.expose_secret());

        match self
            .transport
            .execute(Method::DELETE, &url, None, None, Some(&auth), cancel)
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(host = %self.endpoint, "session closed");
            }
            Ok(response) => {
                warn!(
                    host = %self.endpoint,
                    status_code = response.status().as_u16(),
                    "logout rejected"
                );
            }
            Err(e) => {
                warn!(host = %self.endpoint, error = %e, "logout failed");
            }
        }

        self.invalidate(token).await;
    }

    #[cfg(test)]
    async fn seed(&self, token: Token) {
        *self.cached.lock().await = Some(token);
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("login_provider", &self.login_provider)
            .finish_non_exhaustive()
    }
}
