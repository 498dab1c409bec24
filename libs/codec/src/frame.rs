//! Record-oriented frame pack/unpack.

use types::{FrameHeader, FrameKind, FRAME_MAGIC, FRAME_VERSION};
use zerocopy::{AsBytes, FromBytes};

use crate::error::{CodecError, CodecResult};

/// Encode one frame: header followed by the opaque payload.
///
/// Fails only when the resulting frame would exceed `max_frame`, the bus
/// message-size cap. The check happens before any allocation so oversize
/// requests are rejected before they ever reach the bus.
pub fn encode_frame(
    kind: FrameKind,
    corr_id: u64,
    payload: &[u8],
    max_frame: usize,
) -> CodecResult<Vec<u8>> {
    let total = FrameHeader::SIZE + payload.len();
    if total > max_frame {
        return Err(CodecError::FrameTooLarge {
            size: total,
            max: max_frame,
        });
    }

    let header = FrameHeader::new(kind, corr_id, payload.len() as u32);
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode one frame, returning the header and the borrowed payload.
///
/// The header is read through `zerocopy::FromBytes`, so the buffer needs
/// no particular alignment. Rejects short buffers, foreign magic,
/// unsupported versions, and any disagreement between the declared payload
/// length and the buffer length.
pub fn decode_frame(buf: &[u8]) -> CodecResult<(FrameHeader, &[u8])> {
    if buf.len() < FrameHeader::SIZE {
        return Err(CodecError::FrameTooSmall {
            need: FrameHeader::SIZE,
            got: buf.len(),
        });
    }

    let header =
        FrameHeader::read_from(&buf[..FrameHeader::SIZE]).ok_or(CodecError::FrameTooSmall {
            need: FrameHeader::SIZE,
            got: buf.len(),
        })?;

    if header.magic != FRAME_MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: FRAME_MAGIC,
            actual: header.magic,
        });
    }
    if header.version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion {
            version: header.version,
            expected: FRAME_VERSION,
        });
    }

    let payload = &buf[FrameHeader::SIZE..];
    if header.payload_len as usize != payload.len() {
        return Err(CodecError::LengthMismatch {
            declared: header.payload_len as usize,
            actual: payload.len(),
        });
    }

    Ok((header, payload))
}

/// Map the header's raw discriminant to a [`FrameKind`].
pub fn frame_kind(header: &FrameHeader) -> CodecResult<FrameKind> {
    header
        .frame_kind()
        .map_err(|kind| CodecError::UnknownKind { kind })
}
