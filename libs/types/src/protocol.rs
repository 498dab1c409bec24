//! Bus protocol constants and the fixed frame header.
//!
//! These values are part of the wire format between the routing server and
//! the FLX engine and MUST stay consistent on both sides of the bus.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Magic tag leading every frame on the bus ("TRMQ").
///
/// Frames that do not start with this value are foreign traffic and are
/// dropped without further parsing.
pub const FRAME_MAGIC: u32 = 0x5452_4D51;

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// Default name of the request queue (server → engine).
pub const REQUEST_QUEUE: &str = "/tr_mq_req";

/// Default name of the response queue (engine → server).
pub const RESPONSE_QUEUE: &str = "/tr_mq_resp";

/// Frame type discriminant carried in the header.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Routing request, payload is the client's JSON line.
    RouteRequest = 1,
    /// Routing response, payload is the engine's JSON object.
    RouteResponse = 2,
}

impl FrameKind {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for FrameKind {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, u16> {
        match raw {
            1 => Ok(FrameKind::RouteRequest),
            2 => Ok(FrameKind::RouteResponse),
            other => Err(other),
        }
    }
}

/// Frame header (24 bytes)
///
/// Fixed-width record preceding every payload on the bus. Field ordering
/// keeps the `u64` at an 8-byte offset so the struct is exactly 24 bytes
/// with zero padding; do not reorder.
///
/// ```text
/// ┌──────────────┬────────────────────────────┐
/// │ FrameHeader  │ payload (UTF-8 JSON text)  │
/// │ (24 bytes)   │ (payload_len bytes)        │
/// └──────────────┴────────────────────────────┘
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct FrameHeader {
    /// Protocol identification, always [`FRAME_MAGIC`] (bytes 0-3).
    pub magic: u32,
    /// Frame format version, currently 1 (bytes 4-5).
    pub version: u16,
    /// Raw [`FrameKind`] discriminant (bytes 6-7).
    pub kind: u16,
    /// Correlation id assigned by the routing server (bytes 8-15).
    pub corr_id: u64,
    /// Payload length in bytes (bytes 16-19).
    pub payload_len: u32,
    /// Reserved, zero (bytes 20-23).
    pub reserved: u32,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 24;

    pub fn new(kind: FrameKind, corr_id: u64, payload_len: u32) -> Self {
        Self {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
            kind: kind.as_u16(),
            corr_id,
            payload_len,
            reserved: 0,
        }
    }

    /// Decode the raw type discriminant, rejecting unknown values.
    pub fn frame_kind(&self) -> Result<FrameKind, u16> {
        FrameKind::try_from(self.kind)
    }
}
