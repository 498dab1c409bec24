//! # Trunkline Message Bus
//!
//! ## Purpose
//! Typed adapter over the host's named, bounded, message-oriented queues
//! (POSIX `mq_*`). Both Trunkline processes exchange whole frames through
//! a pair of these channels: the engine creates them at startup, the
//! routing server attaches to the existing names.
//!
//! ## Semantics
//! - Queues are bounded in depth and per-message size; both limits come
//!   from [`MqConfig`].
//! - In nonblocking mode, a full queue reports [`SendOutcome::WouldBlock`]
//!   and an empty queue reports [`RecvOutcome::WouldBlock`] instead of
//!   suspending the caller. Every other failure is a typed [`BusError`].
//! - Delivery is atomic per message: the kernel never splits or merges
//!   queue entries, so one `send` equals one `recv`.

mod error;
mod mq;

pub use error::BusError;
pub use mq::{MqConfig, PosixQueue, RecvOutcome, SendOutcome};
pub use mq::{DEFAULT_MAX_MESSAGES, DEFAULT_MESSAGE_SIZE};
