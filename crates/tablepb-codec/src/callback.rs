//! Callback-allocated fields.
//!
//! A field built with [`FieldDescriptor::callback`] keeps no value in the
//! message block. Its storage holds a slot id instead, and the encoder and
//! decoder hand the field's values to the [`FieldCallback`] at that slot of
//! the callback list passed in by the caller. Slot ids are 1-based; 0 means
//! no callback is bound and the field is skipped.

use tablepb_stream::{InputStream, OutputStream};
use tablepb_wire::{encode_bytes, encode_tag, encode_varint, WireType};

use crate::config::{DecodeConfig, EncodeConfig};
use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::{CodecError, Result};
use crate::{decode, encode, storage};

/// A single numeric value, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::Unsigned(value) => value != 0,
            Self::Signed(value) => value != 0,
            Self::Float(value) => value != 0.0,
            Self::Double(value) => value != 0.0,
        }
    }

    /// Two's-complement bits for signed values; floats are truncated.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Bool(value) => u64::from(value),
            Self::Unsigned(value) => value,
            Self::Signed(value) => value as u64,
            Self::Float(value) => value as i64 as u64,
            Self::Double(value) => value as i64 as u64,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Bool(value) => i64::from(value),
            Self::Unsigned(value) => value as i64,
            Self::Signed(value) => value,
            Self::Float(value) => value as i64,
            Self::Double(value) => value as i64,
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Self::Float(value) => value,
            Self::Double(value) => value as f32,
            other => other.as_f64() as f32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(value) => f64::from(u8::from(value)),
            Self::Unsigned(value) => value as f64,
            Self::Signed(value) => value as f64,
            Self::Float(value) => f64::from(value),
            Self::Double(value) => value,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Signed(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Signed(value)
    }
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// One decoded value handed to [`FieldCallback::decode_element`].
#[derive(Debug)]
pub enum Element<'s, 'a> {
    /// A number. Packed input produces one element per value.
    Scalar(Scalar),
    /// The payload of a string, bytes or submessage value.
    Delimited(Delimited<'s, 'a>),
}

/// Caller-supplied handler for a callback field.
///
/// Both methods default to doing nothing, so a handler only implements the
/// direction it cares about.
pub trait FieldCallback {
    /// Called once per decoded element of `field`.
    ///
    /// A delimited payload the handler leaves unread is discarded after it
    /// returns.
    fn decode_element(&mut self, field: &FieldDescriptor, element: Element<'_, '_>) -> Result<()> {
        let _ = (field, element);
        Ok(())
    }

    /// Called to emit every element of `field`, tags included.
    ///
    /// The encoder calls this once while measuring an enclosing submessage
    /// and again while writing it; both calls must emit the same bytes.
    fn encode_elements(&mut self, field: &FieldDescriptor, writer: &mut ElementWriter<'_, '_>) -> Result<()> {
        let _ = (field, writer);
        Ok(())
    }
}

/// A length-delimited payload being decoded by a callback.
pub struct Delimited<'s, 'a> {
    stream: &'s mut InputStream<'a>,
    field: &'static str,
    config: &'s DecodeConfig,
    depth: usize,
}

impl<'s, 'a> Delimited<'s, 'a> {
    pub(crate) fn new(
        stream: &'s mut InputStream<'a>,
        field: &FieldDescriptor,
        config: &'s DecodeConfig,
        depth: usize,
    ) -> Self {
        Self {
            stream,
            field: field.name,
            config,
            depth,
        }
    }

    /// Unread payload bytes.
    pub fn len(&self) -> usize {
        self.stream.bytes_left()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_exhausted()
    }

    /// Read the rest of the payload into the front of `buf`.
    pub fn read_bytes<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b [u8]> {
        let len = self.len();
        let capacity = buf.len();
        let Some(dst) = buf.get_mut(..len) else {
            return Err(CodecError::CapacityExceeded {
                field: self.field,
                len,
                capacity,
            });
        };
        self.stream.read(dst)?;
        Ok(dst)
    }

    /// Read the rest of the payload into `buf` as UTF-8 text.
    pub fn read_str<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        let field = self.field;
        let bytes = self.read_bytes(buf)?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    pub fn to_vec(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.len()];
        self.stream.read(&mut buf)?;
        Ok(buf)
    }

    pub fn to_string(&mut self) -> Result<String> {
        let field = self.field;
        String::from_utf8(self.to_vec()?).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    /// Decode the payload as a `desc` message into `block`.
    pub fn read_message(&mut self, desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
        self.read_message_with(desc, block, &mut [])
    }

    /// Like [`read_message`](Self::read_message), with callbacks for the
    /// nested message's own callback fields.
    pub fn read_message_with(
        &mut self,
        desc: &MessageDescriptor,
        block: &mut [u8],
        callbacks: &mut [&mut dyn FieldCallback],
    ) -> Result<()> {
        storage::init_message(desc, block, 0)?;
        decode::decode_message(self.stream, desc, block, callbacks, self.config, self.depth + 1)
    }

    /// Discard the rest of the payload.
    pub fn skip(&mut self) -> Result<()> {
        let left = self.len();
        self.stream.skip(left)?;
        Ok(())
    }

    /// The bounded stream over the payload, for custom parsing.
    pub fn stream(&mut self) -> &mut InputStream<'a> {
        self.stream
    }
}

impl std::fmt::Debug for Delimited<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delimited")
            .field("field", &self.field)
            .field("len", &self.len())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Emits the elements of a callback field.
///
/// Every `write_*` method writes the field's tag before the value.
pub struct ElementWriter<'s, 'a> {
    out: &'s mut OutputStream<'a>,
    field: &'s FieldDescriptor,
    config: &'s EncodeConfig,
    depth: usize,
}

impl<'s, 'a> ElementWriter<'s, 'a> {
    pub(crate) fn new(
        out: &'s mut OutputStream<'a>,
        field: &'s FieldDescriptor,
        config: &'s EncodeConfig,
        depth: usize,
    ) -> Self {
        Self {
            out,
            field,
            config,
            depth,
        }
    }

    /// Whether this pass only measures the output.
    pub fn is_sizing(&self) -> bool {
        self.out.is_sizing()
    }

    pub fn field(&self) -> &FieldDescriptor {
        self.field
    }

    pub fn write_scalar(&mut self, value: impl Into<Scalar>) -> Result<()> {
        encode_tag(self.out, self.field.wire_type(), self.field.tag)?;
        encode::encode_scalar(self.out, self.field, value.into())
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        encode_tag(self.out, WireType::LengthDelimited, self.field.tag)?;
        encode_bytes(self.out, data)?;
        Ok(())
    }

    pub fn write_message(&mut self, desc: &MessageDescriptor, block: &[u8]) -> Result<()> {
        self.write_message_with(desc, block, &mut [])
    }

    pub fn write_message_with(
        &mut self,
        desc: &MessageDescriptor,
        block: &[u8],
        callbacks: &mut [&mut dyn FieldCallback],
    ) -> Result<()> {
        encode_tag(self.out, WireType::LengthDelimited, self.field.tag)?;
        encode::encode_sized(
            self.out,
            self.field.name,
            desc,
            block,
            callbacks,
            self.config,
            self.depth + 1,
        )
    }

    /// Write `values` as one packed element. Nothing is written for an
    /// empty slice.
    pub fn write_packed(&mut self, values: &[Scalar]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        if !self.field.kind.is_packable() {
            return Err(CodecError::KindMismatch {
                field: self.field.name,
                kind: self.field.kind.name(),
            });
        }
        let size = encode::packed_size(self.field, values.iter().copied())?;
        encode_tag(self.out, WireType::LengthDelimited, self.field.tag)?;
        encode_varint(self.out, size as u64)?;
        for value in values {
            encode::encode_scalar(self.out, self.field, *value)?;
        }
        Ok(())
    }

    /// The underlying stream, for custom encodings. The caller is
    /// responsible for writing tags.
    pub fn stream(&mut self) -> &mut OutputStream<'a> {
        self.out
    }
}

impl std::fmt::Debug for ElementWriter<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementWriter")
            .field("field", &self.field.name)
            .field("sizing", &self.is_sizing())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions() {
        assert_eq!(Scalar::Signed(-1).as_u64(), u64::MAX);
        assert_eq!(Scalar::Unsigned(u64::MAX).as_i64(), -1);
        assert!(Scalar::Unsigned(2).as_bool());
        assert!(!Scalar::Double(0.0).as_bool());
        assert_eq!(Scalar::Float(2.5).as_f64(), 2.5);
        assert_eq!(Scalar::Signed(-3).as_f32(), -3.0);
        assert_eq!(Scalar::from(7u32), Scalar::Unsigned(7));
        assert_eq!(Scalar::from(-7i32), Scalar::Signed(-7));
    }

    #[test]
    fn delimited_reads_bounded_payload() {
        let data = b"hello world".to_vec();
        let mut slice: &[u8] = &data;
        let mut stream = InputStream::from_slice(&mut slice);
        let field = FieldDescriptor::new(1, "text", crate::DataKind::String, 0, 2).callback();
        let config = DecodeConfig::default();

        stream
            .with_substream(5, |sub| {
                let mut delimited = Delimited::new(sub, &field, &config, 0);
                assert_eq!(delimited.len(), 5);
                let mut buf = [0u8; 8];
                assert_eq!(delimited.read_str(&mut buf)?, "hello");
                assert!(delimited.is_empty());
                Ok::<(), CodecError>(())
            })
            .unwrap();
        assert_eq!(stream.bytes_left(), 6);
    }

    #[test]
    fn delimited_rejects_small_buffer() {
        let data = b"too long".to_vec();
        let mut slice: &[u8] = &data;
        let mut stream = InputStream::from_slice(&mut slice);
        let field = FieldDescriptor::new(1, "blob", crate::DataKind::Bytes, 0, 2).callback();
        let config = DecodeConfig::default();

        let mut delimited = Delimited::new(&mut stream, &field, &config, 0);
        let mut buf = [0u8; 4];
        assert!(matches!(
            delimited.read_bytes(&mut buf),
            Err(CodecError::CapacityExceeded { len: 8, capacity: 4, .. })
        ));
    }

    #[test]
    fn writer_emits_tagged_values() {
        let field = FieldDescriptor::new(3, "ids", crate::DataKind::UINT32, 0, 2).callback();
        let config = EncodeConfig::default();
        let mut sink: Vec<u8> = Vec::new();
        {
            let mut out = OutputStream::unbounded(&mut sink);
            let mut writer = ElementWriter::new(&mut out, &field, &config, 0);
            writer.write_scalar(150u32).unwrap();
            writer
                .write_packed(&[Scalar::Unsigned(1), Scalar::Unsigned(300)])
                .unwrap();
        }
        assert_eq!(sink, [0x18, 0x96, 0x01, 0x1A, 0x03, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn packed_write_rejects_delimited_kinds() {
        let field = FieldDescriptor::new(1, "names", crate::DataKind::String, 0, 2).callback();
        let config = EncodeConfig::default();
        let mut out = OutputStream::sizing();
        let mut writer = ElementWriter::new(&mut out, &field, &config, 0);
        assert!(matches!(
            writer.write_packed(&[Scalar::Unsigned(1)]),
            Err(CodecError::KindMismatch { .. })
        ));
    }
}
