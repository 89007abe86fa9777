use axum::http::StatusCode;
use thiserror::Error;

/// Cause of the final failed attempt inside the retry loop.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("appliance answered HTTP {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication failed: {reason}")]
    AuthFailed {
        reason: String,
        /// HTTP status the login endpoint answered with, if it answered at all
        status: Option<StatusCode>,
        #[source]
        source: Option<Box<ExporterError>>,
    },

    #[error("Upstream error: {0}")]
    UpstreamFailed(String),

    #[error("Failed to decode {what}: {source}")]
    DecodeFailed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request failed after {attempts} attempts: {last}")]
    RequestFailed {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    #[error("Probe cancelled: deadline exceeded")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// Login failure caused by something other than the appliance rejecting it.
    pub fn auth(source: ExporterError) -> Self {
        ExporterError::AuthFailed {
            reason: source.to_string(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Login rejected by the appliance.
    pub fn auth_rejected(status: StatusCode) -> Self {
        ExporterError::AuthFailed {
            reason: format!("login rejected with HTTP {}", status.as_u16()),
            status: Some(status),
            source: None,
        }
    }

    /// Status code returned to the Prometheus server for a failed probe.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExporterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ExporterError::AuthFailed {
                status: Some(_), ..
            } => StatusCode::UNAUTHORIZED,
            ExporterError::AuthFailed { status: None, .. }
            | ExporterError::UpstreamFailed(_)
            | ExporterError::DecodeFailed { .. }
            | ExporterError::RequestFailed { .. } => StatusCode::BAD_GATEWAY,
            ExporterError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ExporterError::Config(_)
            | ExporterError::Http(_)
            | ExporterError::Json(_)
            | ExporterError::Metrics(_)
            | ExporterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the `outcome` dimension of the self-metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ExporterError::BadRequest(_) => "bad_request",
            ExporterError::AuthFailed { .. } => "auth_failed",
            ExporterError::UpstreamFailed(_)
            | ExporterError::DecodeFailed { .. }
            | ExporterError::RequestFailed { .. } => "upstream_failed",
            ExporterError::Cancelled => "timeout",
            _ => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
