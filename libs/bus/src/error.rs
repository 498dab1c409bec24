//! Bus adapter errors.

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// Queue could not be created or attached.
    #[error("mq_open failed for {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: Errno,
    },

    /// Send failed for a reason other than a full nonblocking queue.
    #[error("mq_send failed: {0}")]
    Send(#[source] Errno),

    /// Receive failed for a reason other than an empty nonblocking queue.
    #[error("mq_receive failed: {0}")]
    Receive(#[source] Errno),

    /// Unlink failed for a reason other than the name already being gone.
    #[error("mq_unlink failed for {name}: {source}")]
    Unlink {
        name: String,
        #[source]
        source: Errno,
    },

    /// Message exceeds the queue's per-message size cap.
    #[error("message of {len} bytes exceeds queue cap of {max}")]
    MessageTooLarge { len: usize, max: usize },

    /// Receive buffer is smaller than the queue's message size.
    #[error("receive buffer of {cap} bytes is below queue message size {need}")]
    BufferTooSmall { cap: usize, need: usize },

    /// Queue handle was already closed.
    #[error("queue {0} is closed")]
    Closed(String),

    /// Queue name contains an interior NUL byte.
    #[error("queue name {0:?} is not a valid C string")]
    BadName(String),
}
