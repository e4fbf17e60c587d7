//! Canner - CLI Entry Point

use anyhow::{Context, Result};
use canner::{MockConfig, MockServer};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "canner",
    about = "Configurable HTTP mock server - canned responses for integration testing",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CANNER_CONFIG", default_value = "conf/config.yml")]
    config: PathBuf,

    /// Interface to bind (overrides the configuration file)
    #[arg(long, env = "CANNER_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "CANNER_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print sample configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let sample_config = include_str!("../conf/config.yml");
        println!("{}", sample_config);
        return Ok(());
    }

    info!(path = ?args.config, "Loading configuration");
    let mut config = MockConfig::from_file(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;

    if args.validate {
        println!(
            "Configuration is valid ({} matchers defined)",
            config.matchers.len()
        );
        return Ok(());
    }

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let server = MockServer::new(config);
    let addr = server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server.run(listener).await?;

    Ok(())
}
