//! Worker pool.
//!
//! All blocking-ish per-request work lives here so the accept and reader
//! paths never stall: the bus send with its would-block retry loop, the
//! bounded wait on the pending slot, and the final push onto the
//! originating connection's line queue. Pool size is fixed; the shared job
//! queue is bounded, so readers feeding it get flow control for free.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use bus::{PosixQueue, SendOutcome};
use types::wire::{REASON_MQ_ERROR, REASON_MQ_FULL, REASON_OVERSIZE_REQUEST};
use types::{FrameKind, StatusReply};

use crate::config::ServerConfig;
use crate::connection::ConnectionRegistry;
use crate::metrics::RouterMetrics;
use crate::pending::PendingTable;

/// One accepted request line, bound to its connection and armed slot.
#[derive(Debug)]
pub struct Job {
    pub conn_id: u64,
    pub corr_id: u64,
    pub slot: oneshot::Receiver<String>,
    pub line: String,
}

/// Shared environment every worker task closes over.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<ServerConfig>,
    pub requests: Arc<PosixQueue>,
    pub pending: Arc<PendingTable>,
    pub connections: Arc<ConnectionRegistry>,
    pub metrics: Arc<RouterMetrics>,
}

/// Fixed-size pool draining a shared bounded job queue.
///
/// Dropping the pool closes the queue; workers finish the jobs already
/// queued and then exit.
pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
}

impl WorkerPool {
    pub fn spawn(ctx: WorkerContext) -> Self {
        let (jobs, rx) = mpsc::channel::<Job>(ctx.config.job_queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..ctx.config.workers {
            let rx = Arc::clone(&rx);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    // Lock only to pull the next job; processing happens
                    // with the queue released so the pool drains in
                    // parallel.
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    process(&ctx, job).await;
                }
                debug!(worker_id, "worker stopped");
            });
        }

        Self { jobs }
    }

    /// Hand a job to the pool, waiting for queue space.
    ///
    /// Fails only once the pool has shut down; the job comes back so the
    /// caller can unwind its pending slot.
    pub async fn submit(&self, job: Job) -> Result<(), Job> {
        self.jobs.send(job).await.map_err(|rejected| rejected.0)
    }
}

/// Drive one request through bus send, slot wait, and response enqueue.
async fn process(ctx: &WorkerContext, job: Job) {
    let Job {
        conn_id,
        corr_id,
        slot,
        line,
    } = job;

    let frame = match codec::encode_frame(
        FrameKind::RouteRequest,
        corr_id,
        line.as_bytes(),
        ctx.config.message_size,
    ) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(corr_id, error = %e, "request exceeds bus cap, rejecting");
            fail_local(ctx, conn_id, corr_id, REASON_OVERSIZE_REQUEST).await;
            return;
        }
    };

    match send_with_retry(ctx, &frame, corr_id).await {
        SendResult::Delivered => {
            RouterMetrics::incr(&ctx.metrics.requests_sent);
        }
        SendResult::Full => {
            RouterMetrics::incr(&ctx.metrics.queue_full_errors);
            warn!(corr_id, "request queue full for the whole retry window");
            fail_local(ctx, conn_id, corr_id, REASON_MQ_FULL).await;
            return;
        }
        SendResult::Fatal => {
            fail_local(ctx, conn_id, corr_id, REASON_MQ_ERROR).await;
            return;
        }
    }

    match tokio::time::timeout(ctx.config.request_timeout, slot).await {
        Ok(Ok(payload)) => {
            deliver(ctx, conn_id, payload).await;
        }
        Ok(Err(_)) => {
            // Sender dropped without a payload; nothing sensible to tell
            // the client beyond what shutdown already queued.
            debug!(corr_id, "pending slot closed without completion");
        }
        Err(_) => {
            // Evict the slot so a late engine response finds nothing and
            // the table cannot leak.
            ctx.pending.remove(corr_id);
            RouterMetrics::incr(&ctx.metrics.timeouts);
            deliver(ctx, conn_id, StatusReply::timeout().render()).await;
        }
    }
}

enum SendResult {
    Delivered,
    Full,
    Fatal,
}

async fn send_with_retry(ctx: &WorkerContext, frame: &[u8], corr_id: u64) -> SendResult {
    for _ in 0..ctx.config.send_retry_attempts {
        match ctx.requests.send(frame, 0) {
            Ok(SendOutcome::Delivered) => return SendResult::Delivered,
            Ok(SendOutcome::WouldBlock) => {
                tokio::time::sleep(ctx.config.send_retry_backoff).await;
            }
            Err(e) => {
                error!(corr_id, error = %e, "request queue send failed");
                return SendResult::Fatal;
            }
        }
    }
    SendResult::Full
}

/// Disarm the slot and answer the client directly with an ERROR line.
async fn fail_local(ctx: &WorkerContext, conn_id: u64, corr_id: u64, reason: &str) {
    ctx.pending.remove(corr_id);
    deliver(ctx, conn_id, StatusReply::error(reason).render()).await;
}

async fn deliver(ctx: &WorkerContext, conn_id: u64, body: String) {
    let mut line = body;
    line.push('\n');
    ctx.connections.push_line(conn_id, line).await;
}
