//! Wire-level primitives of the tablepb message format.
//!
//! Every field on the wire is a varint header `(field_number << 3) | wire_type`
//! followed by a payload whose shape the wire type describes:
//! - varint: little-endian base-128 integer (zig-zag mapped for signed kinds)
//! - fixed32 / fixed64: raw little-endian bytes
//! - length-delimited: varint length, then that many bytes
//!
//! This crate also frames whole messages with a varint length prefix so a
//! sequence of messages can share one byte stream.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod frame;
pub mod reader;
pub mod scan;
pub mod wire_type;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::DelimitedCodec;
pub use codec::{
    decode_fixed32, decode_fixed64, decode_length, decode_svarint, decode_tag, decode_varint,
    decode_varint32, encode_bytes, encode_fixed32, encode_fixed64, encode_svarint, encode_tag,
    encode_varint, read_varint, skip_field, skip_varint, varint_len, write_varint, zigzag_decode32,
    zigzag_decode64, zigzag_encode32, zigzag_encode64, MAX_FIELD_NUMBER, MAX_VARINT_LEN,
};
pub use error::{Result, WireError};
pub use frame::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_FRAME};
pub use reader::DelimitedReader;
pub use scan::{FieldScanner, RawField, RawValue};
pub use wire_type::WireType;
pub use writer::DelimitedWriter;
