use crate::error::ExporterError;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub f5: F5Config,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Credentials and transport settings shared by every probed appliance
#[derive(Debug, Deserialize, Clone)]
pub struct F5Config {
    /// Never shipped in a config file; supplied through the environment or flags
    #[serde(default)]
    pub username: String,
    #[serde(default = "empty_password")]
    pub password: SecretString,
    #[serde(default = "default_f5_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default = "default_login_provider")]
    pub login_provider: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProbeConfig {
    #[serde(default)]
    pub session_mode: SessionMode,
    /// Upper bound for a whole probe when Prometheus sends no scrape timeout
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

/// How appliance sessions are managed across probes.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One session per target, reused across probes and renewed lazily
    #[default]
    Cached,
    /// A fresh login per probe followed by a logout
    Ephemeral,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9143
}

fn empty_password() -> SecretString {
    SecretString::new(String::new().into_boxed_str())
}

fn default_f5_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_login_provider() -> String {
    "tmos".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> String {
    "info".to_string()
}

impl F5Config {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let password: String = password.into();
        Self {
            username: username.into(),
            password: SecretString::new(password.into_boxed_str()),
            port: default_f5_port(),
            use_tls: true,
            verify_ssl: true,
            login_provider: default_login_provider(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "https"
        } else {
            "http"
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("F5LTM_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject settings the exporter cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.f5.username.trim().is_empty() {
            return Err(ExporterError::Config("f5.username must not be empty".into()));
        }
        if self.f5.password.expose_secret().is_empty() {
            return Err(ExporterError::Config("f5.password must not be empty".into()));
        }
        if !matches!(self.f5.login_provider.as_str(), "tmos" | "local") {
            return Err(ExporterError::Config(format!(
                "f5.login_provider must be \"tmos\" or \"local\", got {:?}",
                self.f5.login_provider
            )));
        }
        if self.f5.timeout_seconds == 0 {
            return Err(ExporterError::Config(
                "f5.timeout_seconds must be greater than zero".into(),
            ));
        }
        if let Some(secs) = self.probe.timeout_seconds {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ExporterError::Config(
                    "probe.timeout_seconds must be a positive number".into(),
                ));
            }
        }
        Ok(())
    }
}
