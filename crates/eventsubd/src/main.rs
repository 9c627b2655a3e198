#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use eventsubd::config::{Args, ServerConfig};
use eventsubd::metrics::start_metrics_server;
use eventsubd::secret::{SecretSource, StaticSecret};
use eventsubd::Server;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config: ServerConfig = args.clone().into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let secret: Arc<dyn SecretSource> = match (&args.secret_file, args.secret) {
        (Some(path), _) => Arc::new(StaticSecret::from_file(path)?),
        (None, Some(secret)) => Arc::new(StaticSecret::new(secret)?),
        (None, None) => anyhow::bail!("a signing secret is required (--secret-file or --secret)"),
    };

    let server = Server::new(config.clone(), secret);
    let addr = server.start().await?;
    info!(%addr, max_age = config.max_age, "eventsubd started");

    tokio::spawn({
        let health = server.health();
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    let mut states = server.subscribe_state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = states.wait_for(|state| state.is_terminal()) => {
            warn!(state = ?server.state(), "listener stopped");
        }
    }
    server.stop();

    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };

    if let Some(ref path) = args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("failed to open log file {path:?}: {e}"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
