use anyhow::Result;
use clap::Parser;
use f5ltm_exporter::{
    config::{Config, LogFormat},
    server,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// F5 username (overrides config)
    #[arg(long, env = "F5_USER")]
    f5_user: Option<String>,

    /// F5 password (overrides config)
    #[arg(long, env = "F5_PASS", hide_env_values = true)]
    f5_pass: Option<String>,

    /// Accept invalid appliance certificates
    #[arg(long, env = "F5_TLS_SKIP_VERIFY")]
    tls_skip_verify: bool,

    /// Port to listen on
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Override with CLI arguments if provided
    if let Some(user) = args.f5_user {
        config.f5.username = user;
    }
    if let Some(pass) = args.f5_pass {
        config.f5.password = secrecy::SecretString::new(pass.into());
    }
    if args.tls_skip_verify {
        config.f5.verify_ssl = false;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(config.logging.format, &config.logging.level);

    info!(
        "Starting F5 LTM Prometheus Exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    config.validate()?;

    info!("Configuration loaded successfully");
    info!(
        username = %config.f5.username,
        port = config.f5.port,
        verify_ssl = config.f5.verify_ssl,
        session_mode = ?config.probe.session_mode,
        "F5 settings"
    );
    info!(
        "Probe endpoint: http://{}:{}/probe",
        config.server.addr, config.server.port
    );

    // Start the probe server
    if let Err(e) = server::start(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
