use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_varint, write_varint, MAX_VARINT_LEN};
use crate::error::{Result, WireError};

/// Default maximum message size accepted from a delimited stream: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Append `payload` to `dst` behind a varint length prefix.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────────────┐
/// │ Length (varint)    │ Payload              │
/// │ 1-10 bytes         │ (Length bytes)       │
/// └────────────────────┴──────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let mut prefix = [0u8; MAX_VARINT_LEN];
    let prefix_len = write_varint(payload.len() as u64, &mut prefix);
    dst.reserve(prefix_len + payload.len());
    dst.put_slice(&prefix[..prefix_len]);
    dst.put_slice(payload);
    Ok(())
}

/// Take one length-prefixed message off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the prefix and payload from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some((declared, prefix_len)) = read_varint(src)? else {
        return Ok(None);
    };

    let payload_len = usize::try_from(declared).unwrap_or(usize::MAX);
    let too_large = WireError::FrameTooLarge {
        size: payload_len,
        max: max_payload,
    };
    if payload_len > max_payload {
        return Err(too_large);
    }

    let Some(frame_len) = prefix_len.checked_add(payload_len) else {
        return Err(too_large);
    };
    if src.len() < frame_len {
        return Ok(None);
    }

    src.advance(prefix_len);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for delimited readers, writers and codecs.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_FRAME,
        }
    }
}
