use tablepb_stream::StreamError;

use crate::wire_type::WireType;

/// Errors that can occur while encoding or decoding wire primitives.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The underlying stream failed or ran out of bytes.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// A varint ran past 10 bytes, overflowed its target, or was cut short.
    #[error("malformed varint")]
    MalformedVarint,

    /// A length prefix claims more bytes than the enclosing stream holds.
    #[error("length-delimited value of {declared} bytes exceeds the {available} bytes available")]
    LengthMismatch { declared: usize, available: usize },

    /// The tag header carries a wire type outside the format.
    #[error("invalid wire type {0}")]
    InvalidWireType(u32),

    /// The tag header carries field number 0 or one above the maximum.
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// The value's length cannot be derived from its wire type.
    #[error("cannot skip a value of wire type {0}")]
    UnskippableWireType(WireType),

    /// A framed message exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream in the middle of a frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
