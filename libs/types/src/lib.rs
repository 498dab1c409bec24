//! # Trunkline Shared Types
//!
//! Protocol constants, the fixed bus frame header, and the wire-level
//! request/response objects shared by the routing server and the FLX
//! engine. Everything that crosses a process boundary is defined here so
//! both sides agree on exactly one definition.

pub mod alr;
pub mod protocol;
pub mod wire;

pub use alr::{AlrRecord, RouteGroup};
pub use protocol::{FrameHeader, FrameKind, FRAME_MAGIC, FRAME_VERSION};
pub use wire::{ResponseStatus, RouteRequest, RouteResponse, StatusReply};
