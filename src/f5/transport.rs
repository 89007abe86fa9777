//! Resilient request execution against the iControl REST API
//!
//! Every outbound call goes through [`Transport::execute`], which owns the retry
//! policy: up to `max_retries + 1` attempts, exponential backoff starting at
//! `retry_delay`, each sleep scaled by a random factor in `[0.5, 1.0)`.
//!
//! An attempt is accepted when the request completed and the appliance answered
//! with a status below 500. Anything else is retried.
//!
//! Every wait on the appliance races the caller's [`CancellationToken`],
//! including the body read in [`Transport::read_body`], so a probe deadline
//! stops the exchange immediately.

use crate::config::F5Config;
use crate::error::{AttemptError, ExporterError, Result};
use axum::body::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use std::fmt;
use std::ops::Range;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Header the appliance reads session tokens from
pub const TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Range of the random factor applied to every backoff sleep
pub const JITTER_RANGE: Range<f64> = 0.5..1.0;

/// Credential attached to a request.
///
/// Basic credentials travel in the standard `Authorization` header. Session
/// tokens travel in the appliance's own [`TOKEN_HEADER`].
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Full header value, including the `Basic ` prefix
    Basic(String),
    Token(String),
}

impl Auth {
    pub fn basic(username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        Auth::Basic(format!("Basic {}", encoded))
    }

    pub fn token(token: impl Into<String>) -> Self {
        Auth::Token(token.into())
    }

    /// Name of the header this credential is sent in
    pub fn header_name(&self) -> &'static str {
        match self {
            Auth::Basic(_) => "Authorization",
            Auth::Token(_) => TOKEN_HEADER,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Basic(value) => request.header(AUTHORIZATION, value),
            Auth::Token(value) => request.header(TOKEN_HEADER, value),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic(_) => f.write_str("Auth::Basic([REDACTED])"),
            Auth::Token(_) => f.write_str("Auth::Token([REDACTED])"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Scale `delay` by `factor`, which is expected to come from [`JITTER_RANGE`].
    pub fn jitter(delay: Duration, factor: f64) -> Duration {
        delay.mul_f64(factor.clamp(JITTER_RANGE.start, JITTER_RANGE.end))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// HTTP executor for one logical session
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(config: &F5Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());

        if !config.verify_ssl {
            // Lab appliances ship self-signed certificates
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        Ok(Self {
            http: builder.build()?,
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_delay(),
            },
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute one logical request, retrying 5xx answers and transport errors.
    ///
    /// The body is buffered by the caller and resent verbatim on every attempt.
    ///
    /// # Errors
    ///
    /// - [`ExporterError::Cancelled`] once `cancel` fires
    /// - [`ExporterError::RequestFailed`] when every attempt failed, carrying the
    ///   attempt count and the cause of the last failure
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
        auth: Option<&Auth>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self.http.request(method.clone(), url);
            if let Some(content_type) = content_type {
                request = request.header(CONTENT_TYPE, content_type);
            }
            if let Some(auth) = auth {
                request = auth.apply(request);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            debug!(%method, url, attempt, "sending request");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ExporterError::Cancelled),
                outcome = request.send() => outcome,
            };

            let last = match outcome {
                Ok(response) if response.status().as_u16() < 500 => return Ok(response),
                Ok(response) => AttemptError::Status(response.status()),
                Err(e) => AttemptError::Transport(e),
            };

            if attempt >= attempts {
                warn!(%method, url, attempts = attempt, error = %last, "giving up on request");
                return Err(ExporterError::RequestFailed {
                    attempts: attempt,
                    last,
                });
            }

            let delay = RetryPolicy::jitter(
                self.policy.backoff(attempt),
                rand::thread_rng().gen_range(JITTER_RANGE),
            );
            warn!(
                %method,
                url,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last,
                "request failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ExporterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Buffer the body of a response returned by [`Transport::execute`].
    ///
    /// An appliance can send headers and then stall, so the read races `cancel`
    /// just like the request did.
    pub async fn read_body(response: Response, cancel: &CancellationToken) -> Result<Bytes> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ExporterError::Cancelled),
            body = response.bytes() => Ok(body?),
        }
    }
}
