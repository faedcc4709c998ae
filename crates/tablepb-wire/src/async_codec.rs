//! `tokio_util` codec for length-prefixed messages.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::frame::{decode_frame, encode_frame, FrameConfig};

/// Frames messages on an async byte stream with a varint length prefix.
#[derive(Debug, Clone, Default)]
pub struct DelimitedCodec {
    config: FrameConfig,
}

impl DelimitedCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for DelimitedCodec {
    type Item = Bytes;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.config.max_payload_size)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(WireError::ConnectionClosed),
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for DelimitedCodec {
    type Error = WireError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        if payload.len() > self.config.max_payload_size {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_frame(payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_and_decoder_agree() {
        let mut codec = DelimitedCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"async"), &mut buf).unwrap();
        codec.encode(b"second".as_slice(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"async");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"second");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn trailing_partial_frame_at_eof_is_an_error() {
        let mut codec = DelimitedCodec::default();
        let mut buf = BytesMut::from(&[0x05, b'a'][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(WireError::ConnectionClosed)
        ));
    }

    #[test]
    fn encoder_enforces_limit() {
        let mut codec = DelimitedCodec::new(FrameConfig {
            max_payload_size: 2,
        });
        let mut buf = BytesMut::new();
        assert!(codec.encode(b"abc".as_slice(), &mut buf).is_err());
        assert!(buf.is_empty());
    }
}
