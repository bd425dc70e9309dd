//! Tailgate server binary.
//!
//! Wires the hub, rotating writer, and tracing pipeline together, then
//! serves the log stream until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tailgate_logs::{LogHub, LogPipeline, PipelineLayer, RotatingWriter, WriterConfig};
use tailgate_server::{ServerConfig, StreamServer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Real-time log streaming server.
#[derive(Debug, Parser)]
#[command(name = "tailgate", version, about = "Streams structured logs over WebSocket")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Directory receiving rotated log files.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Credential clients must present as the API_KEY query parameter.
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// Seconds between heartbeat sweeps.
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let hub = LogHub::new();
    let writer = RotatingWriter::new(&cli.log_dir, WriterConfig::new())
        .context("failed to prepare log directory")?;
    let pipeline = LogPipeline::new(hub.clone()).with_writer(Arc::new(writer));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(PipelineLayer::new(pipeline))
        .init();

    let mut config = ServerConfig::new(cli.addr)
        .with_log_dir(&cli.log_dir)
        .with_heartbeat_interval(Duration::from_secs(cli.heartbeat_secs));
    if let Some(api_key) = cli.api_key {
        config = config.with_api_key(api_key);
    }

    let mut server = StreamServer::bind(config, hub).await?;
    let stream = server.stream_info();
    info!(path = %stream.path, port = stream.port, "log stream ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    server.close().await;
    Ok(())
}
