//! Table-driven protobuf encoding for caller-owned message blocks.
//!
//! tablepb encodes and decodes protobuf-compatible messages by walking a
//! static descriptor table instead of generated code. Messages live in
//! plain byte blocks owned by the caller; the codec reads and writes
//! fields by offset and never allocates on its own behalf.
//!
//! # Crate Structure
//!
//! - [`stream`]: forward-only byte streams over caller-supplied sources and sinks
//! - [`wire`]: varints, tags, fixed-width values, skipping and message framing
//! - [`codec`]: descriptor tables, the encoder, the decoder and typed views
//!
//! ```
//! use tablepb::codec::{DataKind, FieldDescriptor, MessageDescriptor, MessageViewMut};
//!
//! static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "id", DataKind::UINT32, 0, 4)];
//! static PING: MessageDescriptor = MessageDescriptor::new("Ping", &FIELDS, 4);
//!
//! let mut block = [0u8; 4];
//! MessageViewMut::new(&PING, &mut block).unwrap().set(1, 300u32).unwrap();
//!
//! let framed = tablepb::encode_delimited_to_vec(&PING, &block).unwrap();
//! assert_eq!(framed, [0x03, 0x08, 0xAC, 0x02]);
//! ```

/// Re-export stream types.
pub mod stream {
    pub use tablepb_stream::*;
}

/// Re-export wire primitives and framing.
pub mod wire {
    pub use tablepb_wire::*;
}

/// Re-export the descriptor-driven codec.
pub mod codec {
    pub use tablepb_codec::*;
}

pub use tablepb_codec::{
    decode, decode_from_slice, encode, encode_to_vec, CodecError, DecodeConfig, EncodeConfig,
    MessageDescriptor,
};

/// Encode `block` behind a varint length prefix into a new vector.
pub fn encode_delimited_to_vec(
    desc: &MessageDescriptor,
    block: &[u8],
) -> tablepb_codec::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    {
        let mut stream = tablepb_stream::OutputStream::unbounded(&mut out);
        tablepb_codec::encode_delimited(&mut stream, desc, block)?;
    }
    Ok(out)
}
