//! Table-driven message encoder and decoder.
//!
//! A message shape is described by a static [`MessageDescriptor`]: one
//! [`FieldDescriptor`] per field, naming its tag, its [`DataKind`] and
//! where its value lives inside a caller-owned message block. The same
//! interpreter walks any table, so adding a message shape means adding a
//! table, not code.
//!
//! ```
//! use tablepb_codec::{decode_from_slice, encode_to_vec, DataKind, FieldDescriptor, MessageDescriptor};
//!
//! static FIELDS: [FieldDescriptor; 2] = [
//!     FieldDescriptor::new(1, "id", DataKind::UINT32, 0, 4),
//!     FieldDescriptor::new(2, "score", DataKind::SINT32, 4, 4).implicit(),
//! ];
//! static RECORD: MessageDescriptor = MessageDescriptor::new("Record", &FIELDS, 8);
//!
//! let mut block = [0u8; 8];
//! block[..4].copy_from_slice(&150u32.to_le_bytes());
//! block[4..].copy_from_slice(&(-2i32).to_le_bytes());
//!
//! let bytes = encode_to_vec(&RECORD, &block).unwrap();
//! assert_eq!(bytes, [0x08, 0x96, 0x01, 0x10, 0x03]);
//!
//! let mut decoded = [0u8; 8];
//! decode_from_slice(&bytes, &RECORD, &mut decoded).unwrap();
//! assert_eq!(decoded, block);
//! ```
//!
//! The codec paths never allocate. Fields whose size is not known up front
//! can be routed to a [`FieldCallback`] instead of static storage.

pub mod callback;
pub mod collect;
pub mod config;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod iter;
pub mod message;
mod storage;

pub use callback::{Delimited, Element, ElementWriter, FieldCallback, Scalar};
pub use collect::{BytesList, ScalarList, StringList};
pub use config::{DecodeConfig, EncodeConfig, DEFAULT_MAX_DEPTH};
pub use decode::{
    decode, decode_delimited, decode_delimited_with, decode_from_slice, decode_noinit,
    decode_noinit_with, decode_with, init_defaults,
};
pub use descriptor::{
    Allocation, DataKind, DefaultValue, FieldDescriptor, IntType, MessageDescriptor, Multiplicity,
    Width, MAX_REQUIRED_FIELDS,
};
pub use encode::{
    encode, encode_delimited, encode_delimited_with, encode_to_slice, encode_to_vec, encode_with,
    encoded_size, encoded_size_with,
};
pub use error::{CodecError, ErrorKind, Result};
pub use iter::{FieldIter, FieldRef};
pub use message::{MessageView, MessageViewMut};
