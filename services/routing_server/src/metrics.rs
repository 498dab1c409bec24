//! Router counters for monitoring and the periodic status line.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Process-lifetime counters. All relaxed: these feed logs, not control
/// flow.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub lines_accepted: AtomicU64,
    pub busy_rejections: AtomicU64,
    pub requests_sent: AtomicU64,
    pub responses_completed: AtomicU64,
    pub timeouts: AtomicU64,
    pub queue_full_errors: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit the status line every `period` until shutdown.
    pub async fn report_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // immediate first tick carries no information
        loop {
            tokio::select! {
                _ = ticker.tick() => info!("📊 router metrics: {}", self),
                _ = shutdown.changed() => break,
            }
        }
    }
}

impl fmt::Display for RouterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        write!(
            f,
            "connections {}/{} open, lines {}, busy {}, sent {}, completed {}, timeouts {}, mq_full {}",
            opened - closed.min(opened),
            opened,
            self.lines_accepted.load(Ordering::Relaxed),
            self.busy_rejections.load(Ordering::Relaxed),
            self.requests_sent.load(Ordering::Relaxed),
            self.responses_completed.load(Ordering::Relaxed),
            self.timeouts.load(Ordering::Relaxed),
            self.queue_full_errors.load(Ordering::Relaxed),
        )
    }
}
