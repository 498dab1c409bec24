//! Accept loop and per-connection read path.
//!
//! Readers parse lines and make exactly one cheap decision per line:
//! reject with BUSY at the backpressure ceiling, or arm a pending slot and
//! hand the rest to the worker pool. Everything slow (bus I/O, slot waits)
//! happens off the read path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use bus::{MqConfig, PosixQueue};
use types::wire::REASON_SHUTDOWN;
use types::StatusReply;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionRegistry};
use crate::dispatcher;
use crate::metrics::RouterMetrics;
use crate::pending::PendingTable;
use crate::worker::{Job, WorkerContext, WorkerPool};

const METRICS_PERIOD: Duration = Duration::from_secs(60);

/// The routing server: listener, bus endpoints, and all shared tables.
pub struct RoutingServer {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    local_addr: SocketAddr,
    pending: Arc<PendingTable>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<RouterMetrics>,
    requests: Arc<PosixQueue>,
    responses: Arc<PosixQueue>,
}

impl RoutingServer {
    /// Attach to both bus queues (the engine must have created them) and
    /// bind the TCP listener. Failure here is fatal to the process.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate();

        let requests = PosixQueue::open(
            MqConfig::new(config.request_queue.as_str())
                .capacity(config.queue_depth, config.message_size)
                .nonblocking(true),
        )
        .with_context(|| {
            format!(
                "attaching to request queue {} (is flx_engine running?)",
                config.request_queue
            )
        })?;

        let responses = PosixQueue::open(
            MqConfig::new(config.response_queue.as_str())
                .capacity(config.queue_depth, config.message_size)
                .nonblocking(true),
        )
        .with_context(|| {
            format!(
                "attaching to response queue {} (is flx_engine running?)",
                config.response_queue
            )
        })?;

        let listener = TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("binding {}", config.bind_addr()))?;
        let local_addr = listener.local_addr().context("listener local_addr")?;

        info!(addr = %local_addr, workers = config.workers, "🚀 routing server listening");

        Ok(Self {
            config: Arc::new(config),
            listener,
            local_addr,
            pending: Arc::new(PendingTable::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            metrics: Arc::new(RouterMetrics::new()),
            requests: Arc::new(requests),
            responses: Arc::new(responses),
        })
    }

    /// Actual bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle on the correlation table, for observing in-flight
    /// depth while the server runs.
    pub fn pending_handle(&self) -> Arc<PendingTable> {
        Arc::clone(&self.pending)
    }

    /// Serve until the shutdown flag flips, then drain in-flight slots.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let dispatcher = tokio::spawn(dispatcher::run(
            Arc::clone(&self.responses),
            Arc::clone(&self.pending),
            Arc::clone(&self.metrics),
            self.config.dispatcher_idle,
            shutdown.clone(),
        ));
        tokio::spawn(
            Arc::clone(&self.metrics).report_loop(METRICS_PERIOD, shutdown.clone()),
        );

        let pool = Arc::new(WorkerPool::spawn(WorkerContext {
            config: Arc::clone(&self.config),
            requests: Arc::clone(&self.requests),
            pending: Arc::clone(&self.pending),
            connections: Arc::clone(&self.connections),
            metrics: Arc::clone(&self.metrics),
        }));

        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.spawn_connection(stream, peer, Arc::clone(&pool), shutdown.clone())
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = shutdown_rx.changed() => break,
            }
        }

        info!("routing server shutting down");

        // Stop feeding workers, then answer every armed slot so waiting
        // workers (and their clients) unblock immediately instead of
        // riding out the request timeout.
        drop(pool);
        let drained = self
            .pending
            .drain(&StatusReply::error(REASON_SHUTDOWN).render());
        if drained > 0 {
            info!(drained, "completed in-flight slots with shutdown error");
        }

        let _ = dispatcher.await;
        info!("final router metrics: {}", self.metrics);
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        pool: Arc<WorkerPool>,
        shutdown: watch::Receiver<bool>,
    ) {
        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::channel(self.config.connection_queue_depth);
        let conn_id = self.connections.register(writer_tx);

        RouterMetrics::incr(&self.metrics.connections_opened);
        debug!(conn_id, %peer, "connection opened");

        tokio::spawn(connection::write_loop(writer_rx, write_half));
        tokio::spawn(read_loop(
            conn_id,
            read_half,
            Arc::clone(&self.config),
            Arc::clone(&self.pending),
            Arc::clone(&self.connections),
            Arc::clone(&self.metrics),
            pool,
            shutdown,
        ));
    }
}

/// Split the connection's byte stream into request lines and route each
/// through the request path. Exits on EOF or read error; either way the
/// connection is evicted from the registry.
async fn read_loop(
    conn_id: u64,
    read_half: OwnedReadHalf,
    config: Arc<ServerConfig>,
    pending: Arc<PendingTable>,
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<RouterMetrics>,
    pool: Arc<WorkerPool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let next = tokio::select! {
            next = lines.next_line() => next,
            _ = shutdown.changed() => break,
        };
        match next {
            Ok(Some(line)) => {
                // `lines()` strips the terminator, including a preceding
                // carriage return. Blank keep-alive lines carry nothing.
                if line.is_empty() {
                    continue;
                }
                handle_line(conn_id, line, &config, &pending, &connections, &metrics, &pool)
                    .await;
            }
            Ok(None) => break,
            Err(e) => {
                debug!(conn_id, error = %e, "connection read failed");
                break;
            }
        }
    }

    connections.deregister(conn_id);
    RouterMetrics::incr(&metrics.connections_closed);
    debug!(conn_id, "connection closed");
}

async fn handle_line(
    conn_id: u64,
    line: String,
    config: &ServerConfig,
    pending: &Arc<PendingTable>,
    connections: &Arc<ConnectionRegistry>,
    metrics: &Arc<RouterMetrics>,
    pool: &WorkerPool,
) {
    RouterMetrics::incr(&metrics.lines_accepted);

    // Backpressure: the ceiling check and the insert are one atomic step,
    // so readers racing on other connections cannot push the table past
    // the ceiling. A rejected line never enters the table; the client
    // hears BUSY right away.
    let Some((corr_id, slot)) = pending.try_insert(config.max_pending) else {
        RouterMetrics::incr(&metrics.busy_rejections);
        let mut reply = StatusReply::busy().render();
        reply.push('\n');
        connections.push_line(conn_id, reply).await;
        return;
    };
    let job = Job {
        conn_id,
        corr_id,
        slot,
        line,
    };
    if let Err(job) = pool.submit(job).await {
        // Pool is gone, which only happens during shutdown: unwind the
        // slot and tell the client.
        pending.remove(job.corr_id);
        let mut reply = StatusReply::error(REASON_SHUTDOWN).render();
        reply.push('\n');
        connections.push_line(conn_id, reply).await;
    }
}
