//! Frame validation errors.

use thiserror::Error;

/// Frame encoding/decoding errors with diagnostic context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer is too small to contain a frame header.
    #[error("frame too small: need {need} bytes, got {got}")]
    FrameTooSmall { need: usize, got: usize },

    /// Leading magic does not identify bus traffic.
    #[error("invalid magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Frame format version this codec does not speak.
    #[error("unsupported frame version {version}, expected {expected}")]
    UnsupportedVersion { version: u16, expected: u16 },

    /// Declared payload length disagrees with the buffer length.
    #[error("length mismatch: header declares {declared} payload bytes, buffer carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Encoded frame would exceed the bus message-size cap.
    #[error("frame too large: {size} bytes exceeds bus cap of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Type discriminant not defined by the protocol.
    #[error("unknown frame kind {kind}")]
    UnknownKind { kind: u16 },
}

pub type CodecResult<T> = Result<T, CodecError>;
