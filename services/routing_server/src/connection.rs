//! Connection registry and per-connection writer task.
//!
//! Each accepted socket is split: the reader task lives in the accept
//! path, the write half is owned by a dedicated writer task fed through a
//! bounded channel. Workers never touch sockets; they push complete
//! response lines into the registry and the owning writer drains them.
//! A push for a connection that has already closed is dropped silently.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Registry of live connections, keyed by a process-local connection id.
#[derive(Debug)]
pub struct ConnectionRegistry {
    writers: DashMap<u64, mpsc::Sender<String>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            writers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection's outbound channel under a fresh id.
    pub fn register(&self, writer: mpsc::Sender<String>) -> u64 {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.writers.insert(conn_id, writer);
        conn_id
    }

    /// Drop a connection's outbound channel. Closing the channel also
    /// stops its writer task once the queue drains.
    pub fn deregister(&self, conn_id: u64) {
        self.writers.remove(&conn_id);
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Queue one response line for a connection.
    ///
    /// Returns `false` when the connection is gone or its writer stopped;
    /// responses for closed connections are simply discarded.
    pub async fn push_line(&self, conn_id: u64, line: String) -> bool {
        // Clone the sender out of the map entry: the guard must not be
        // held across the await below.
        let Some(sender) = self.writers.get(&conn_id).map(|entry| entry.value().clone())
        else {
            trace!(conn_id, "connection gone, dropping response line");
            return false;
        };
        sender.send(line).await.is_ok()
    }
}

/// Drain queued response lines onto the socket.
///
/// Exits when the channel closes (connection deregistered) or the first
/// write fails; either way the peer gets no further lines.
pub async fn write_loop(mut lines: mpsc::Receiver<String>, mut half: OwnedWriteHalf) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = half.write_all(line.as_bytes()).await {
            debug!(error = %e, "connection write failed");
            break;
        }
    }
}
