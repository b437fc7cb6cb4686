//! apimocker - CLI entry point

use anyhow::Result;
use apimocker::admin_api::AdminApiServer;
use apimocker::config::Config;
use apimocker::host::{HostManager, HostSettings};
use apimocker::mock::Mock;
use apimocker::scripting::RhaiEngine;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "apimocker",
    about = "Dynamic HTTP mock server with per-port hosts",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "APIMOCKER_CONFIG")]
    config: Option<PathBuf>,

    /// Admin API port (overrides the configuration file)
    #[arg(short, long, env = "APIMOCKER_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'L', long)]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.admin.port = port;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.validate {
        println!(
            "Configuration is valid ({} preloaded mocks)",
            config.mocks.len()
        );
        return Ok(());
    }

    let engine = Arc::new(RhaiEngine::with_max_operations(
        config.scripting.max_operations,
    ));
    let manager = Arc::new(HostManager::new(
        HostSettings {
            bind_address: config.hosts.bind_address.clone(),
            shutdown_timeout: config.hosts.shutdown_timeout(),
        },
        engine,
    ));

    for preloaded in &config.mocks {
        let mock = Mock::from_spec(&preloaded.mock, manager.engine())?;
        let registration = manager.register_mock(preloaded.port, mock).await?;
        info!(
            port = preloaded.port,
            mock_id = %registration.mock.id,
            "Preloaded mock registered"
        );
    }

    let addr = SocketAddr::new(config.admin.host.parse::<IpAddr>()?, config.admin.port);
    let server = AdminApiServer::new(addr, Arc::clone(&manager));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    server.run_until(shutdown).await?;

    for err in manager.shutdown_all().await {
        warn!("{}", err);
    }
    info!("apimocker stopped");
    Ok(())
}
