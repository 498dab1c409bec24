//! Routing server binary.
//!
//! Usage: `routing_server [HOST [PORT]]`, defaults 0.0.0.0:5555. The FLX
//! engine must already be running: it owns the bus queues this process
//! attaches to.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use routing_server::{RoutingServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "routing_server")]
#[command(about = "Trunkline TCP routing front-end")]
#[command(version)]
struct Args {
    /// Bind address
    #[arg(default_value = "0.0.0.0")]
    host: String,

    /// TCP port
    #[arg(default_value_t = 5555)]
    port: u16,

    /// Worker-pool size (default: number of CPUs, at least 2)
    #[arg(long)]
    workers: Option<usize>,

    /// Pending-table ceiling before new lines get BUSY
    #[arg(long)]
    max_pending: Option<usize>,

    /// End-to-end request budget in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Bus-send retries before a request fails with mq_full
    #[arg(long)]
    send_retry_attempts: Option<u32>,

    /// Microseconds between bus-send retries
    #[arg(long)]
    send_retry_backoff_us: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig {
            host: self.host,
            port: self.port,
            ..ServerConfig::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max_pending) = self.max_pending {
            config.max_pending = max_pending;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.send_retry_attempts {
            config.send_retry_attempts = attempts;
        }
        if let Some(us) = self.send_retry_backoff_us {
            config.send_retry_backoff = Duration::from_micros(us);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Starting routing server");

    let server = RoutingServer::bind(args.into_config()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;

    info!("routing server stopped");
    Ok(())
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}
