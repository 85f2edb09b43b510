use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use http_governor::config::watcher::{apply_updates, ConfigWatcher};
use http_governor::config::validation::validate_config;
use http_governor::config::{load_config, AppConfig, ConfigError};
use http_governor::observability::{logging, metrics};
use http_governor::{HttpServer, PatternCostEstimator, Shutdown};

#[derive(Parser)]
#[command(name = "http-governor")]
#[command(about = "Reverse proxy that limits the cost of concurrent requests", long_about = None)]
struct Cli {
    /// TOML configuration file. Cost rules are reloaded when it changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the upstream address.
    #[arg(long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream.address = upstream;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!("http-governor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        cost_rules = config.costs.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let estimator = Arc::new(PatternCostEstimator::new());
    config.apply_costs(&estimator);

    let shutdown = Arc::new(Shutdown::new());

    // Held until exit; dropping it stops the watch.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => {
                    let current = config.clone();
                    let estimator = estimator.clone();
                    let mut stop = shutdown.subscribe();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = apply_updates(current, &estimator, updates) => {}
                            _ = stop.recv() => {}
                        }
                    });
                    Some(handle)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to watch config file, cost rules will not reload");
                    None
                }
            }
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, estimator)?;

    let signal = shutdown.clone();
    tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
