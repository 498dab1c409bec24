//! POSIX message-queue wrapper.

use std::ffi::CString;

use nix::errno::Errno;
use nix::mqueue::{
    mq_attr_member_t, mq_close, mq_open, mq_receive, mq_send, mq_unlink, MQ_OFlag, MqAttr, MqdT,
};
use nix::sys::stat::Mode;
use tracing::debug;

use crate::error::BusError;

/// Default queue depth in messages.
pub const DEFAULT_MAX_MESSAGES: usize = 2048;

/// Default per-message byte cap. Frames larger than this never enter the
/// bus; the codec rejects them first.
pub const DEFAULT_MESSAGE_SIZE: usize = 8192;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct MqConfig {
    /// Queue name in the host namespace, e.g. `/tr_mq_req`.
    pub name: String,
    /// Maximum queued messages before sends report would-block.
    pub max_messages: usize,
    /// Maximum bytes per message.
    pub max_message_size: usize,
    /// Create the queue if it does not exist (engine side).
    pub create: bool,
    /// Report would-block instead of suspending on full/empty queues.
    pub nonblocking: bool,
}

impl MqConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_messages: DEFAULT_MAX_MESSAGES,
            max_message_size: DEFAULT_MESSAGE_SIZE,
            create: false,
            nonblocking: false,
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    pub fn capacity(mut self, max_messages: usize, max_message_size: usize) -> Self {
        self.max_messages = max_messages;
        self.max_message_size = max_message_size;
        self
    }
}

/// Outcome of a send on a bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Queue is full and the handle is nonblocking.
    WouldBlock,
}

/// Outcome of a receive on a bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// One whole message of this many bytes was placed in the buffer.
    Received(usize),
    /// Queue is empty and the handle is nonblocking.
    WouldBlock,
}

/// One open message-queue endpoint.
///
/// Send and receive take `&self`; the kernel serializes concurrent queue
/// operations, so a handle can be shared across tasks behind an `Arc`.
#[derive(Debug)]
pub struct PosixQueue {
    mqd: Option<MqdT>,
    config: MqConfig,
}

impl PosixQueue {
    /// Acquire the named queue per the configuration.
    pub fn open(config: MqConfig) -> Result<Self, BusError> {
        let name = queue_name(&config.name)?;

        let mut oflag = MQ_OFlag::O_RDWR;
        if config.create {
            oflag |= MQ_OFlag::O_CREAT;
        }
        if config.nonblocking {
            oflag |= MQ_OFlag::O_NONBLOCK;
        }

        let attr = MqAttr::new(
            0,
            config.max_messages as mq_attr_member_t,
            config.max_message_size as mq_attr_member_t,
            0,
        );
        let attr_ref = if config.create { Some(&attr) } else { None };

        let mqd = mq_open(
            name.as_c_str(),
            oflag,
            Mode::from_bits_truncate(0o660),
            attr_ref,
        )
        .map_err(|errno| BusError::Open {
            name: config.name.clone(),
            source: errno,
        })?;

        debug!(
            queue = %config.name,
            create = config.create,
            nonblocking = config.nonblocking,
            "queue opened"
        );
        Ok(Self {
            mqd: Some(mqd),
            config,
        })
    }

    /// Enqueue one message at the given priority.
    pub fn send(&self, bytes: &[u8], priority: u32) -> Result<SendOutcome, BusError> {
        if bytes.len() > self.config.max_message_size {
            return Err(BusError::MessageTooLarge {
                len: bytes.len(),
                max: self.config.max_message_size,
            });
        }
        match mq_send(self.descriptor()?, bytes, priority) {
            Ok(()) => Ok(SendOutcome::Delivered),
            Err(Errno::EAGAIN) => Ok(SendOutcome::WouldBlock),
            Err(errno) => Err(BusError::Send(errno)),
        }
    }

    /// Dequeue one whole message into `buf`.
    ///
    /// The buffer must be at least the configured message size; the kernel
    /// rejects smaller buffers, so this is checked up front with a clearer
    /// error.
    pub fn recv(&self, buf: &mut [u8]) -> Result<RecvOutcome, BusError> {
        if buf.len() < self.config.max_message_size {
            return Err(BusError::BufferTooSmall {
                cap: buf.len(),
                need: self.config.max_message_size,
            });
        }
        let mut priority = 0u32;
        match mq_receive(self.descriptor()?, buf, &mut priority) {
            Ok(n) => Ok(RecvOutcome::Received(n)),
            Err(Errno::EAGAIN) => Ok(RecvOutcome::WouldBlock),
            Err(errno) => Err(BusError::Receive(errno)),
        }
    }

    /// Remove the queue name from the host namespace.
    ///
    /// Removing an already-unlinked name is a no-op, so either side may
    /// unlink on shutdown.
    pub fn unlink(&self) -> Result<(), BusError> {
        let name = queue_name(&self.config.name)?;
        match mq_unlink(name.as_c_str()) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(errno) => Err(BusError::Unlink {
                name: self.config.name.clone(),
                source: errno,
            }),
        }
    }

    /// Per-message byte cap for this queue.
    pub fn message_size(&self) -> usize {
        self.config.max_message_size
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn descriptor(&self) -> Result<&MqdT, BusError> {
        self.mqd
            .as_ref()
            .ok_or_else(|| BusError::Closed(self.config.name.clone()))
    }
}

impl Drop for PosixQueue {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            let _ = mq_close(mqd);
        }
    }
}

fn queue_name(name: &str) -> Result<CString, BusError> {
    CString::new(name).map_err(|_| BusError::BadName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Queue names are process-unique so parallel test binaries cannot
    // collide in the kernel namespace.
    fn test_queue(tag: &str) -> MqConfig {
        MqConfig::new(format!("/trunkline_bus_{}_{}", tag, std::process::id()))
            .capacity(4, 512)
            .create(true)
            .nonblocking(true)
    }

    #[test]
    fn send_recv_roundtrip() {
        let queue = PosixQueue::open(test_queue("roundtrip")).unwrap();
        assert_eq!(queue.send(b"hello bus", 0).unwrap(), SendOutcome::Delivered);

        let mut buf = vec![0u8; 512];
        match queue.recv(&mut buf).unwrap() {
            RecvOutcome::Received(n) => assert_eq!(&buf[..n], b"hello bus"),
            other => panic!("expected a message, got {other:?}"),
        }
        queue.unlink().unwrap();
    }

    #[test]
    fn full_queue_reports_would_block() {
        let config = test_queue("full").capacity(1, 512);
        let queue = PosixQueue::open(config).unwrap();
        assert_eq!(queue.send(b"one", 0).unwrap(), SendOutcome::Delivered);
        assert_eq!(queue.send(b"two", 0).unwrap(), SendOutcome::WouldBlock);
        queue.unlink().unwrap();
    }

    #[test]
    fn empty_queue_reports_would_block() {
        let queue = PosixQueue::open(test_queue("empty")).unwrap();
        let mut buf = vec![0u8; 512];
        assert_eq!(queue.recv(&mut buf).unwrap(), RecvOutcome::WouldBlock);
        queue.unlink().unwrap();
    }

    #[test]
    fn oversize_message_is_rejected_locally() {
        let queue = PosixQueue::open(test_queue("oversize")).unwrap();
        let big = vec![0u8; 513];
        match queue.send(&big, 0) {
            Err(BusError::MessageTooLarge { len, max }) => {
                assert_eq!(len, 513);
                assert_eq!(max, 512);
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
        queue.unlink().unwrap();
    }

    #[test]
    fn undersized_recv_buffer_is_rejected() {
        let queue = PosixQueue::open(test_queue("smallbuf")).unwrap();
        let mut buf = vec![0u8; 64];
        match queue.recv(&mut buf) {
            Err(BusError::BufferTooSmall { cap, need }) => {
                assert_eq!(cap, 64);
                assert_eq!(need, 512);
            }
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
        queue.unlink().unwrap();
    }

    #[test]
    fn attach_without_create_fails_for_missing_queue() {
        let config = MqConfig::new(format!("/trunkline_bus_missing_{}", std::process::id()));
        match PosixQueue::open(config) {
            Err(BusError::Open { source, .. }) => assert_eq!(source, Errno::ENOENT),
            other => panic!("expected Open(ENOENT), got {other:?}"),
        }
    }

    #[test]
    fn double_unlink_is_a_no_op() {
        let queue = PosixQueue::open(test_queue("unlink")).unwrap();
        queue.unlink().unwrap();
        queue.unlink().unwrap();
    }

    #[test]
    fn attach_to_existing_queue_sees_creator_capacity() {
        let creator = PosixQueue::open(test_queue("attach")).unwrap();
        creator.send(b"seeded", 0).unwrap();

        let attached = PosixQueue::open(
            MqConfig::new(creator.name())
                .capacity(4, 512)
                .nonblocking(true),
        )
        .unwrap();
        let mut buf = vec![0u8; 512];
        match attached.recv(&mut buf).unwrap() {
            RecvOutcome::Received(n) => assert_eq!(&buf[..n], b"seeded"),
            other => panic!("expected the seeded message, got {other:?}"),
        }
        creator.unlink().unwrap();
    }
}
