//! # Trunkline Frame Codec
//!
//! ## Purpose
//! Encoding and validation of the fixed-header frames carried on the bus
//! between the routing server and the FLX engine. The bus delivers whole
//! messages atomically, so the codec is record-oriented: every buffer
//! handed to [`decode_frame`] must be exactly one frame.
//!
//! ## Validation
//! A frame is accepted only when the magic matches, the version is
//! supported, and the declared payload length plus the header size equals
//! the buffer length exactly. The strict equality check defends against
//! truncation and concatenation bugs; there is never a partial parse.

mod error;
mod frame;

pub use error::{CodecError, CodecResult};
pub use frame::{decode_frame, encode_frame, frame_kind};
