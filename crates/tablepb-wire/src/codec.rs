//! Encoding and decoding of single wire values over the byte streams.

use tablepb_stream::{InputStream, OutputStream};
use tracing::trace;

use crate::error::{Result, WireError};
use crate::wire_type::WireType;

/// Longest possible varint: ten bytes hold 64 bits of payload.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest field number that fits in a tag.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Number of bytes `value` occupies as a varint.
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Write `value` as a varint into `buf`, returning the bytes used.
pub fn write_varint(mut value: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut len = 0usize;
    while value >= 0x80 {
        buf[len] = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8;
    len + 1
}

/// Read a varint from the front of `src`.
///
/// Returns `Ok(None)` if `src` ends before the varint does, and the value
/// with its encoded length otherwise.
pub fn read_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(WireError::MalformedVarint);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if src.len() >= MAX_VARINT_LEN {
        return Err(WireError::MalformedVarint);
    }
    Ok(None)
}

/// Encode `value` as a varint.
pub fn encode_varint(out: &mut OutputStream<'_>, value: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = write_varint(value, &mut buf);
    out.write(&buf[..len])?;
    Ok(())
}

/// Decode a varint of up to 64 bits.
///
/// Running out of input before the first byte is a stream error; running
/// out after it, or exceeding ten bytes, is [`WireError::MalformedVarint`].
pub fn decode_varint(input: &mut InputStream<'_>) -> Result<u64> {
    let first = input.read_byte()?;
    decode_varint_from(first, input)
}

/// Decode a varint that must fit in 32 bits.
pub fn decode_varint32(input: &mut InputStream<'_>) -> Result<u32> {
    let value = decode_varint(input)?;
    u32::try_from(value).map_err(|_| WireError::MalformedVarint)
}

fn decode_varint_from(first: u8, input: &mut InputStream<'_>) -> Result<u64> {
    if first & 0x80 == 0 {
        return Ok(u64::from(first));
    }

    let mut value = u64::from(first & 0x7F);
    for i in 1..MAX_VARINT_LEN {
        let byte = input
            .read_byte()
            .map_err(|_| WireError::MalformedVarint)?;
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(WireError::MalformedVarint);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(WireError::MalformedVarint)
}

/// Consume a varint without assembling its value.
pub fn skip_varint(input: &mut InputStream<'_>) -> Result<()> {
    let first = input.read_byte()?;
    if first & 0x80 == 0 {
        return Ok(());
    }
    for _ in 1..MAX_VARINT_LEN {
        let byte = input
            .read_byte()
            .map_err(|_| WireError::MalformedVarint)?;
        if byte & 0x80 == 0 {
            return Ok(());
        }
    }
    Err(WireError::MalformedVarint)
}

/// Zig-zag map a signed 64-bit value: 0, -1, 1, -2 become 0, 1, 2, 3.
pub const fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Invert [`zigzag_encode64`].
pub const fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Zig-zag map a signed 32-bit value.
pub const fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Invert [`zigzag_encode32`].
pub const fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Encode a signed value as a zig-zag varint.
pub fn encode_svarint(out: &mut OutputStream<'_>, value: i64) -> Result<()> {
    encode_varint(out, zigzag_encode64(value))
}

/// Decode a zig-zag varint.
pub fn decode_svarint(input: &mut InputStream<'_>) -> Result<i64> {
    decode_varint(input).map(zigzag_decode64)
}

/// Encode four little-endian bytes.
pub fn encode_fixed32(out: &mut OutputStream<'_>, value: u32) -> Result<()> {
    out.write(&value.to_le_bytes())?;
    Ok(())
}

/// Encode eight little-endian bytes.
pub fn encode_fixed64(out: &mut OutputStream<'_>, value: u64) -> Result<()> {
    out.write(&value.to_le_bytes())?;
    Ok(())
}

/// Decode four little-endian bytes.
pub fn decode_fixed32(input: &mut InputStream<'_>) -> Result<u32> {
    let mut buf = [0u8; 4];
    input.read(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Decode eight little-endian bytes.
pub fn decode_fixed64(input: &mut InputStream<'_>) -> Result<u64> {
    let mut buf = [0u8; 8];
    input.read(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Encode a field header.
pub fn encode_tag(out: &mut OutputStream<'_>, wire_type: WireType, field_number: u32) -> Result<()> {
    if field_number == 0 || field_number > MAX_FIELD_NUMBER {
        return Err(WireError::InvalidFieldNumber(u64::from(field_number)));
    }
    encode_varint(out, (u64::from(field_number) << 3) | u64::from(wire_type.bits()))
}

/// Decode a field header.
///
/// Returns `Ok(None)` when the stream ends cleanly before the header, which
/// is how the end of a message is detected.
pub fn decode_tag(input: &mut InputStream<'_>) -> Result<Option<(u32, WireType)>> {
    let Some(first) = input.try_read_byte()? else {
        return Ok(None);
    };
    let header = decode_varint_from(first, input)?;
    let header = u32::try_from(header).map_err(|_| WireError::MalformedVarint)?;

    let bits = header & 0x07;
    let wire_type = WireType::from_bits(bits).ok_or(WireError::InvalidWireType(bits))?;
    let field_number = header >> 3;
    if field_number == 0 {
        return Err(WireError::InvalidFieldNumber(0));
    }
    Ok(Some((field_number, wire_type)))
}

/// Encode `data` as a length-delimited value: varint length, then the bytes.
pub fn encode_bytes(out: &mut OutputStream<'_>, data: &[u8]) -> Result<()> {
    encode_varint(out, data.len() as u64)?;
    out.write(data)?;
    Ok(())
}

/// Decode the length prefix of a length-delimited value.
///
/// Fails with [`WireError::LengthMismatch`] if the declared length exceeds
/// what the stream has left.
pub fn decode_length(input: &mut InputStream<'_>) -> Result<usize> {
    let declared = decode_varint32(input)? as usize;
    let available = input.bytes_left();
    if declared > available {
        return Err(WireError::LengthMismatch {
            declared,
            available,
        });
    }
    Ok(declared)
}

/// Skip the payload of one field whose header has already been read.
pub fn skip_field(input: &mut InputStream<'_>, wire_type: WireType) -> Result<()> {
    trace!(wire_type = wire_type.name(), "skipping field payload");
    match wire_type {
        WireType::Varint => skip_varint(input),
        WireType::Fixed32 | WireType::Fixed64 => {
            let len = wire_type.fixed_len().unwrap_or_default();
            input.skip(len)?;
            Ok(())
        }
        WireType::LengthDelimited => {
            let len = decode_length(input)?;
            input.skip(len)?;
            Ok(())
        }
        WireType::StartGroup | WireType::EndGroup => {
            Err(WireError::UnskippableWireType(wire_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use tablepb_stream::StreamError;

    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut sink: Vec<u8> = Vec::new();
        let mut out = OutputStream::unbounded(&mut sink);
        encode_varint(&mut out, value).unwrap();
        sink
    }

    fn decode_all(data: &[u8]) -> Result<u64> {
        let mut slice = data;
        let mut input = InputStream::from_slice(&mut slice);
        decode_varint(&mut input)
    }

    #[test]
    fn varint_examples() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(1), [0x01]);
        assert_eq!(encoded(150), [0x96, 0x01]);
        assert_eq!(encoded(300), [0xAC, 0x02]);
        assert_eq!(encoded(u64::MAX).len(), 10);
        assert_eq!(decode_all(&[0x96, 0x01]).unwrap(), 150);
    }

    #[test]
    fn varint_len_matches_encoding() {
        for value in [0u64, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(varint_len(value), encoded(value).len(), "value {value}");
        }
    }

    #[test]
    fn overlong_varint_is_malformed() {
        let data = [0xFFu8; 11];
        assert!(matches!(decode_all(&data), Err(WireError::MalformedVarint)));
    }

    #[test]
    fn tenth_byte_overflow_is_malformed() {
        let mut data = [0xFFu8; 10];
        data[9] = 0x02;
        assert!(matches!(decode_all(&data), Err(WireError::MalformedVarint)));
    }

    #[test]
    fn truncated_varint_is_malformed() {
        assert!(matches!(decode_all(&[0x80, 0x80]), Err(WireError::MalformedVarint)));
    }

    #[test]
    fn empty_input_is_stream_error() {
        assert!(matches!(
            decode_all(&[]),
            Err(WireError::Stream(StreamError::LimitExceeded { .. }))
        ));
    }

    #[test]
    fn varint32_rejects_wide_values() {
        let data = encoded(u64::from(u32::MAX) + 1);
        let mut slice: &[u8] = &data;
        let mut input = InputStream::from_slice(&mut slice);
        assert!(matches!(decode_varint32(&mut input), Err(WireError::MalformedVarint)));
    }

    #[test]
    fn zigzag_small_values() {
        assert_eq!(zigzag_encode64(0), 0);
        assert_eq!(zigzag_encode64(-1), 1);
        assert_eq!(zigzag_encode64(1), 2);
        assert_eq!(zigzag_encode64(-2), 3);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_decode32(u32::MAX), i32::MIN);
        assert_eq!(zigzag_decode64(zigzag_encode64(i64::MIN)), i64::MIN);
    }

    #[test]
    fn slice_varint_reports_incomplete() {
        assert_eq!(read_varint(&[0x96]).unwrap(), None);
        assert_eq!(read_varint(&[0x96, 0x01, 0xFF]).unwrap(), Some((150, 2)));
        assert!(read_varint(&[0xFF; 10]).is_err());
    }

    #[test]
    fn tag_roundtrip() {
        let mut sink: Vec<u8> = Vec::new();
        let mut out = OutputStream::unbounded(&mut sink);
        encode_tag(&mut out, WireType::LengthDelimited, 2).unwrap();
        assert_eq!(sink, [0x12]);

        let mut slice: &[u8] = &sink;
        let mut input = InputStream::from_slice(&mut slice);
        assert_eq!(
            decode_tag(&mut input).unwrap(),
            Some((2, WireType::LengthDelimited))
        );
        assert_eq!(decode_tag(&mut input).unwrap(), None);
    }

    #[test]
    fn tag_with_zero_field_number_is_rejected() {
        let mut slice: &[u8] = &[0x00];
        let mut input = InputStream::from_slice(&mut slice);
        assert!(matches!(
            decode_tag(&mut input),
            Err(WireError::InvalidFieldNumber(0))
        ));
    }

    #[test]
    fn tag_with_unknown_wire_type_is_rejected() {
        let mut slice: &[u8] = &[0x0E];
        let mut input = InputStream::from_slice(&mut slice);
        assert!(matches!(
            decode_tag(&mut input),
            Err(WireError::InvalidWireType(6))
        ));
    }

    #[test]
    fn encode_tag_rejects_out_of_range_numbers() {
        let mut out = OutputStream::sizing();
        assert!(encode_tag(&mut out, WireType::Varint, 0).is_err());
        assert!(encode_tag(&mut out, WireType::Varint, MAX_FIELD_NUMBER + 1).is_err());
        encode_tag(&mut out, WireType::Varint, MAX_FIELD_NUMBER).unwrap();
        assert_eq!(out.bytes_written(), 5);
    }

    #[test]
    fn length_beyond_stream_is_mismatch() {
        let mut slice: &[u8] = &[0x05, 0x01, 0x02];
        let mut input = InputStream::from_slice(&mut slice);
        assert!(matches!(
            decode_length(&mut input),
            Err(WireError::LengthMismatch {
                declared: 5,
                available: 2
            })
        ));
    }

    #[test]
    fn skip_each_wire_type() {
        let data = [
            0x96, 0x01, // varint
            1, 2, 3, 4, // fixed32
            1, 2, 3, 4, 5, 6, 7, 8, // fixed64
            0x02, b'h', b'i', // length-delimited
            0x2A,
        ];
        let mut slice: &[u8] = &data;
        let mut input = InputStream::from_slice(&mut slice);
        skip_field(&mut input, WireType::Varint).unwrap();
        skip_field(&mut input, WireType::Fixed32).unwrap();
        skip_field(&mut input, WireType::Fixed64).unwrap();
        skip_field(&mut input, WireType::LengthDelimited).unwrap();
        assert_eq!(input.read_byte().unwrap(), 0x2A);
    }

    #[test]
    fn groups_cannot_be_skipped() {
        let mut slice: &[u8] = &[];
        let mut input = InputStream::from_slice(&mut slice);
        assert!(matches!(
            skip_field(&mut input, WireType::StartGroup),
            Err(WireError::UnskippableWireType(WireType::StartGroup))
        ));
    }

    #[test]
    fn fixed_values_are_little_endian() {
        let mut sink: Vec<u8> = Vec::new();
        let mut out = OutputStream::unbounded(&mut sink);
        encode_fixed32(&mut out, 0x0403_0201).unwrap();
        encode_fixed64(&mut out, 0x0807_0605_0403_0201).unwrap();
        assert_eq!(&sink[..4], &[1, 2, 3, 4]);
        assert_eq!(&sink[4..], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut slice: &[u8] = &sink;
        let mut input = InputStream::from_slice(&mut slice);
        assert_eq!(decode_fixed32(&mut input).unwrap(), 0x0403_0201);
        assert_eq!(decode_fixed64(&mut input).unwrap(), 0x0807_0605_0403_0201);
    }
}
