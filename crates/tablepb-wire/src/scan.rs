//! Schema-less walk over an encoded message.

use tablepb_stream::InputStream;

use crate::codec::{decode_fixed32, decode_fixed64, decode_length, decode_tag, decode_varint};
use crate::error::{Result, WireError};
use crate::wire_type::WireType;

/// One field as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField<'a> {
    pub number: u32,
    pub wire_type: WireType,
    /// Byte offset of the field header within the scanned buffer.
    pub offset: usize,
    pub value: RawValue<'a>,
}

/// The undecoded payload of a [`RawField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Delimited(&'a [u8]),
}

/// Iterates the fields of an encoded message without a descriptor.
///
/// Stops after the first error.
pub struct FieldScanner<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FieldScanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    /// Offset of the next field header.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn scan_one(&mut self) -> Result<Option<RawField<'a>>> {
        let data: &'a [u8] = self.data;
        let start = self.pos;
        let mut rest = &data[start..];
        let mut input = InputStream::from_slice(&mut rest);

        let Some((number, wire_type)) = decode_tag(&mut input)? else {
            return Ok(None);
        };
        let value = match wire_type {
            WireType::Varint => RawValue::Varint(decode_varint(&mut input)?),
            WireType::Fixed32 => RawValue::Fixed32(decode_fixed32(&mut input)?),
            WireType::Fixed64 => RawValue::Fixed64(decode_fixed64(&mut input)?),
            WireType::LengthDelimited => {
                let len = decode_length(&mut input)?;
                let begin = start + input.bytes_read();
                input.skip(len)?;
                RawValue::Delimited(&data[begin..begin + len])
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(WireError::UnskippableWireType(wire_type));
            }
        };

        self.pos = start + input.bytes_read();
        Ok(Some(RawField {
            number,
            wire_type,
            offset: start,
            value,
        }))
    }
}

impl<'a> Iterator for FieldScanner<'a> {
    type Item = Result<RawField<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.scan_one();
        if result.is_err() {
            self.failed = true;
        }
        result.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_each_wire_type() {
        let data = [
            0x08, 0x96, 0x01, // 1: varint 150
            0x12, 0x02, b'h', b'i', // 2: "hi"
            0x1D, 1, 0, 0, 0, // 3: fixed32 1
            0x21, 2, 0, 0, 0, 0, 0, 0, 0, // 4: fixed64 2
        ];
        let fields: Vec<RawField<'_>> = FieldScanner::new(&data).collect::<Result<_>>().unwrap();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].value, RawValue::Varint(150));
        assert_eq!(fields[1].number, 2);
        assert_eq!(fields[1].offset, 3);
        assert_eq!(fields[1].value, RawValue::Delimited(b"hi"));
        assert_eq!(fields[2].value, RawValue::Fixed32(1));
        assert_eq!(fields[3].value, RawValue::Fixed64(2));
    }

    #[test]
    fn empty_message_has_no_fields() {
        assert_eq!(FieldScanner::new(&[]).count(), 0);
    }

    #[test]
    fn stops_after_truncation() {
        let data = [0x08, 0x01, 0x12, 0x05, b'a'];
        let mut scanner = FieldScanner::new(&data);
        assert!(scanner.next().unwrap().is_ok());
        assert!(matches!(
            scanner.next(),
            Some(Err(WireError::LengthMismatch {
                declared: 5,
                available: 1
            }))
        ));
        assert!(scanner.next().is_none());
        assert_eq!(scanner.position(), 2);
    }

    #[test]
    fn group_is_reported() {
        let data = [0x0B];
        let mut scanner = FieldScanner::new(&data);
        assert!(matches!(
            scanner.next(),
            Some(Err(WireError::UnskippableWireType(WireType::StartGroup)))
        ));
    }
}
