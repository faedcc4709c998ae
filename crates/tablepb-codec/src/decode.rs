//! Table-driven message decoder.
//!
//! The decoder reads tags until its stream is exhausted, looks each field
//! number up in the descriptor table and writes the value into the message
//! block at the offsets the table names. Values merge into whatever the
//! block already holds: scalars are overwritten, arrays are appended to and
//! submessages are merged field by field.

use tablepb_stream::{InputStream, StreamError};
use tablepb_wire::{
    decode_fixed32, decode_fixed64, decode_length, decode_tag, decode_varint, skip_field,
    zigzag_decode64, WireError, WireType,
};
use tracing::{debug, trace};

use crate::callback::{Delimited, Element, FieldCallback, Scalar};
use crate::config::DecodeConfig;
use crate::descriptor::{
    DataKind, FieldDescriptor, IntType, MessageDescriptor, Multiplicity, Width, MAX_REQUIRED_FIELDS,
};
use crate::error::{CodecError, Result};
use crate::iter::FieldRef;
use crate::storage;

/// Initialise `block` and decode a message from `stream` into it.
pub fn decode(stream: &mut InputStream<'_>, desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
    decode_with(stream, desc, block, &mut [], &DecodeConfig::default())
}

/// Like [`decode`], with callbacks for callback fields and an explicit config.
pub fn decode_with(
    stream: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
) -> Result<()> {
    init_defaults(desc, block)?;
    decode_message(stream, desc, block, callbacks, config, 0)
}

/// Decode into `block` without initialising it first, merging with its
/// current content.
pub fn decode_noinit(stream: &mut InputStream<'_>, desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
    decode_noinit_with(stream, desc, block, &mut [], &DecodeConfig::default())
}

pub fn decode_noinit_with(
    stream: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
) -> Result<()> {
    decode_message(stream, desc, block, callbacks, config, 0)
}

/// Decode a message preceded by its length as a varint.
pub fn decode_delimited(stream: &mut InputStream<'_>, desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
    decode_delimited_with(stream, desc, block, &mut [], &DecodeConfig::default())
}

pub fn decode_delimited_with(
    stream: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
) -> Result<()> {
    let len = decode_length(stream)?;
    init_defaults(desc, block)?;
    stream.with_substream(len, |sub| decode_bounded(sub, desc, block, callbacks, config, 0, len))
}

pub fn decode_from_slice(buf: &[u8], desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
    let mut src = buf;
    let mut stream = InputStream::from_slice(&mut src);
    decode(&mut stream, desc, block)
}

/// Zero every static field of `block` and apply descriptor defaults.
///
/// Has-flags, counts and oneof `which` slots are cleared; singular
/// submessages are initialised recursively. Callback slot bindings are
/// left as they are.
pub fn init_defaults(desc: &MessageDescriptor, block: &mut [u8]) -> Result<()> {
    storage::init_message(desc, block, 0)
}

pub(crate) fn decode_message(
    input: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
    depth: usize,
) -> Result<()> {
    if depth > config.max_depth {
        debug!(message = desc.name, depth, max = config.max_depth, "decode depth limit reached");
        return Err(CodecError::MessageTooDeep {
            max: config.max_depth,
        });
    }
    storage::check_block(desc, block)?;

    let mut fields = desc.iter();
    let mut seen_required = 0u64;

    while let Some((number, wire_type)) = decode_tag(input)? {
        let Some(fref) = fields.find(number) else {
            if config.strict_unknown_fields {
                return Err(CodecError::UnknownField {
                    message: desc.name,
                    number,
                });
            }
            trace!(message = desc.name, number, wire_type = wire_type.name(), "skipping unknown field");
            skip_value(input, number, wire_type)?;
            continue;
        };

        let field = fref.field;
        if !field.accepts(wire_type) {
            if config.skip_mismatched_wire_types {
                debug!(
                    message = desc.name,
                    field = field.name,
                    expected = field.wire_type().name(),
                    actual = wire_type.name(),
                    "skipping field with mismatched wire type"
                );
                skip_value(input, number, wire_type)?;
                continue;
            }
            return Err(CodecError::WireTypeMismatch {
                field: field.name,
                expected: field.wire_type(),
                actual: wire_type,
            });
        }

        decode_field(input, desc, &fref, wire_type, block, callbacks, config, depth)?;
        if let Some(mask) = fref.required_index.and_then(required_mask) {
            seen_required |= mask;
        }
    }

    check_required(desc, seen_required)
}

/// Decode a message that must fill the whole of `input`.
fn decode_bounded(
    input: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
    depth: usize,
    len: usize,
) -> Result<()> {
    decode_message(input, desc, block, callbacks, config, depth)?;
    if !input.is_exhausted() {
        return Err(StreamError::EndOfStream {
            requested: len,
            available: len - input.bytes_left(),
        }
        .into());
    }
    Ok(())
}

/// Bit for the `bit`th required field, or `None` past the tracked range.
fn required_mask(bit: usize) -> Option<u64> {
    (bit < MAX_REQUIRED_FIELDS).then(|| 1u64 << bit)
}

/// Required fields past [`MAX_REQUIRED_FIELDS`] are not tracked and never
/// reported missing.
fn check_required(desc: &MessageDescriptor, seen: u64) -> Result<()> {
    for fref in desc.iter() {
        let Some(mask) = fref.required_index.and_then(required_mask) else {
            continue;
        };
        if seen & mask == 0 {
            return Err(CodecError::MissingRequiredField {
                message: desc.name,
                field: fref.field.name,
            });
        }
    }
    Ok(())
}

fn skip_value(input: &mut InputStream<'_>, number: u32, wire_type: WireType) -> Result<()> {
    match skip_field(input, wire_type) {
        Err(WireError::UnskippableWireType(wire_type)) => {
            Err(CodecError::UnknownFieldSkipFailure { number, wire_type })
        }
        other => Ok(other?),
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_field(
    input: &mut InputStream<'_>,
    desc: &MessageDescriptor,
    fref: &FieldRef<'_>,
    wire_type: WireType,
    block: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
    depth: usize,
) -> Result<()> {
    let field = fref.field;
    if field.is_callback() {
        return decode_callback(input, fref, wire_type, block, callbacks, config, depth);
    }

    match field.multiplicity {
        Multiplicity::Repeated if wire_type == WireType::LengthDelimited && field.kind.is_packable() => {
            decode_packed(input, fref, block)
        }
        Multiplicity::Repeated => {
            let count = next_element(block, fref)?;
            let data = storage::get_mut(block, fref.element(count), field)?;
            if let DataKind::Submessage(nested) = field.kind {
                storage::init_message(nested, data, 0)?;
            }
            decode_value(input, field, data, callbacks, config, depth)?;
            storage::set_slot(block, fref, count as u64 + 1)
        }
        Multiplicity::Oneof(_) => {
            if storage::slot(block, fref)? != u64::from(field.tag) {
                storage::activate_oneof(desc, fref, block)?;
            }
            let data = storage::get_mut(block, fref.data(), field)?;
            decode_value(input, field, data, callbacks, config, depth)
        }
        Multiplicity::Optional => {
            let data = storage::get_mut(block, fref.data(), field)?;
            decode_value(input, field, data, callbacks, config, depth)?;
            if fref.size_slot().is_some() {
                storage::set_slot(block, fref, 1)?;
            }
            Ok(())
        }
        Multiplicity::Required => {
            let data = storage::get_mut(block, fref.data(), field)?;
            decode_value(input, field, data, callbacks, config, depth)
        }
    }
}

/// Index of the next free array element, or `ArrayFull`.
fn next_element(block: &[u8], fref: &FieldRef<'_>) -> Result<usize> {
    let count = storage::slot(block, fref)? as usize;
    if count >= fref.field.array_capacity {
        return Err(CodecError::ArrayFull {
            field: fref.field.name,
            capacity: fref.field.array_capacity,
        });
    }
    Ok(count)
}

fn decode_packed(input: &mut InputStream<'_>, fref: &FieldRef<'_>, block: &mut [u8]) -> Result<()> {
    let field = fref.field;
    let len = decode_length(input)?;
    input.with_substream(len, |sub| {
        while !sub.is_exhausted() {
            let count = next_element(block, fref)?;
            let value = decode_scalar(sub, field)?;
            storage::store_scalar(&field.kind, storage::get_mut(block, fref.element(count), field)?, value);
            storage::set_slot(block, fref, count as u64 + 1)?;
        }
        Ok(())
    })
}

fn decode_value(
    input: &mut InputStream<'_>,
    field: &FieldDescriptor,
    data: &mut [u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
    depth: usize,
) -> Result<()> {
    match field.kind {
        DataKind::String => {
            let len = decode_length(input)?;
            let capacity = data.len().saturating_sub(1);
            if data.is_empty() || len > capacity {
                return Err(CodecError::CapacityExceeded {
                    field: field.name,
                    len,
                    capacity,
                });
            }
            input.read(&mut data[..len])?;
            data[len] = 0;
            if config.validate_utf8 && std::str::from_utf8(&data[..len]).is_err() {
                return Err(CodecError::InvalidUtf8 { field: field.name });
            }
        }
        DataKind::Bytes => {
            let len = decode_length(input)?;
            if data.len() < 4 {
                return Err(CodecError::invalid(field.name, "bytes storage needs a length prefix"));
            }
            let (prefix, payload) = data.split_at_mut(4);
            if len > payload.len() {
                return Err(CodecError::CapacityExceeded {
                    field: field.name,
                    len,
                    capacity: payload.len(),
                });
            }
            input.read(&mut payload[..len])?;
            storage::write_uint(prefix, len as u64);
        }
        DataKind::Submessage(nested) => {
            let len = decode_length(input)?;
            input.with_substream(len, |sub| {
                decode_bounded(sub, nested, data, callbacks, config, depth + 1, len)
            })?;
        }
        _ => {
            let value = decode_scalar(input, field)?;
            storage::store_scalar(&field.kind, data, value);
        }
    }
    Ok(())
}

/// Read one scalar value of `field`, narrowed to its storage width the
/// way an integer cast would.
fn decode_scalar(input: &mut InputStream<'_>, field: &FieldDescriptor) -> Result<Scalar> {
    let value = match field.kind {
        DataKind::Bool => Scalar::Bool(decode_varint(input)? != 0),
        DataKind::Varint(int) if int.signed => {
            Scalar::Signed(storage::truncate_signed(decode_varint(input)? as i64, int.width))
        }
        DataKind::Varint(int) => Scalar::Unsigned(storage::truncate_unsigned(decode_varint(input)?, int.width)),
        DataKind::ZigZag(width) => {
            Scalar::Signed(storage::truncate_signed(zigzag_decode64(decode_varint(input)?), width))
        }
        DataKind::Enum => Scalar::Signed(i64::from(decode_varint(input)? as i32)),
        DataKind::Fixed(IntType {
            width: Width::W64,
            signed,
        }) => {
            let raw = decode_fixed64(input)?;
            if signed {
                Scalar::Signed(raw as i64)
            } else {
                Scalar::Unsigned(raw)
            }
        }
        DataKind::Fixed(int) => {
            let raw = decode_fixed32(input)?;
            if int.signed {
                Scalar::Signed(i64::from(raw as i32))
            } else {
                Scalar::Unsigned(u64::from(raw))
            }
        }
        DataKind::Float(Width::W64) => Scalar::Double(f64::from_bits(decode_fixed64(input)?)),
        DataKind::Float(_) => Scalar::Float(f32::from_bits(decode_fixed32(input)?)),
        DataKind::String | DataKind::Bytes | DataKind::Submessage(_) => {
            return Err(CodecError::KindMismatch {
                field: field.name,
                kind: field.kind.name(),
            })
        }
    };
    Ok(value)
}

fn decode_callback(
    input: &mut InputStream<'_>,
    fref: &FieldRef<'_>,
    wire_type: WireType,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &DecodeConfig,
    depth: usize,
) -> Result<()> {
    let field = fref.field;
    let slot = storage::callback_slot(block, fref)?;
    if slot == 0 {
        trace!(field = field.name, "no callback bound, skipping");
        return skip_value(input, field.tag, wire_type);
    }
    let callback = callbacks
        .get_mut(slot - 1)
        .ok_or_else(|| CodecError::invalid(field.name, "callback slot not provided"))?;

    if wire_type != WireType::LengthDelimited {
        let value = decode_scalar(input, field)?;
        return callback.decode_element(field, Element::Scalar(value));
    }

    let len = decode_length(input)?;
    input.with_substream(len, |sub| {
        if field.kind.is_packable() {
            while !sub.is_exhausted() {
                let value = decode_scalar(sub, field)?;
                callback.decode_element(field, Element::Scalar(value))?;
            }
            return Ok(());
        }
        callback.decode_element(field, Element::Delimited(Delimited::new(sub, field, config, depth)))?;
        let rest = sub.bytes_left();
        sub.skip(rest)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DefaultValue;

    static INNER_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::new(1, "a", DataKind::INT32, 0, 4).implicit(),
        FieldDescriptor::new(2, "b", DataKind::INT32, 4, 4)
            .implicit()
            .with_default(DefaultValue::I64(7)),
    ];
    static INNER: MessageDescriptor = MessageDescriptor::new("Inner", &INNER_FIELDS, 8);

    static SAMPLE_FIELDS: [FieldDescriptor; 6] = [
        FieldDescriptor::new(1, "id", DataKind::UINT32, 0, 4),
        FieldDescriptor::new(2, "name", DataKind::String, 4, 6).implicit(),
        FieldDescriptor::new(3, "small", DataKind::Varint(IntType::new(Width::W8, false)), 10, 1).optional(11),
        FieldDescriptor::new(4, "inner", DataKind::Submessage(&INNER), 12, 8).optional(20),
        FieldDescriptor::new(5, "values", DataKind::SINT32, 24, 4).repeated(36, 3),
        FieldDescriptor::new(6, "blob", DataKind::Bytes, 40, 8).implicit(),
    ];
    static SAMPLE: MessageDescriptor = MessageDescriptor::new("Sample", &SAMPLE_FIELDS, 48);

    fn u32_at(block: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
    }

    fn i32_at(block: &[u8], offset: usize) -> i32 {
        i32::from_le_bytes(block[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn decodes_into_offsets() {
        let wire = [
            0x08, 0x96, 0x01, // id = 150
            0x12, 0x03, b'a', b'b', b'c', // name
            0x18, 0xAC, 0x02, // small = 300, truncated to 44
            0x22, 0x02, 0x08, 0x05, // inner.a = 5
            0x28, 0x03, 0x28, 0x04, // values = -2, 2
            0x32, 0x02, 0xDE, 0xAD, // blob
        ];
        let mut block = [0xEEu8; 48];
        decode_from_slice(&wire, &SAMPLE, &mut block).unwrap();

        assert_eq!(u32_at(&block, 0), 150);
        assert_eq!(&block[4..8], b"abc\0");
        assert_eq!(block[10], 44);
        assert_eq!(block[11], 1);
        assert_eq!(i32_at(&block, 12), 5);
        assert_eq!(i32_at(&block, 16), 7);
        assert_eq!(block[20], 1);
        assert_eq!(i32_at(&block, 24), -2);
        assert_eq!(i32_at(&block, 28), 2);
        assert_eq!(u32_at(&block, 36), 2);
        assert_eq!(u32_at(&block, 40), 2);
        assert_eq!(&block[44..46], &[0xDE, 0xAD]);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let mut block = [0u8; 48];
        let err = decode_from_slice(&[0x12, 0x01, b'x'], &SAMPLE, &mut block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MissingRequiredField {
                message: "Sample",
                field: "id"
            }
        ));
    }

    const WIDE_COUNT: usize = MAX_REQUIRED_FIELDS + 1;

    const fn wide_fields() -> [FieldDescriptor; WIDE_COUNT] {
        let mut fields = [FieldDescriptor::new(1, "flag", DataKind::Bool, 0, 1); WIDE_COUNT];
        let mut index = 0;
        while index < WIDE_COUNT {
            fields[index] = FieldDescriptor::new(index as u32 + 1, "flag", DataKind::Bool, index, 1);
            index += 1;
        }
        fields
    }

    static WIDE_FIELDS: [FieldDescriptor; WIDE_COUNT] = wide_fields();
    static WIDE: MessageDescriptor = MessageDescriptor::new("Wide", &WIDE_FIELDS, WIDE_COUNT);

    fn wide_wire(tags: impl Iterator<Item = u32>) -> Vec<u8> {
        let mut wire = Vec::new();
        for tag in tags {
            let key = tag << 3;
            if key < 0x80 {
                wire.push(key as u8);
            } else {
                wire.extend([(key as u8) | 0x80, (key >> 7) as u8]);
            }
            wire.push(0x01);
        }
        wire
    }

    #[test]
    fn required_fields_past_the_tracked_range_are_not_reported_missing() {
        let mut block = [0u8; WIDE_COUNT];
        decode_from_slice(&wide_wire(1..=65), &WIDE, &mut block).unwrap();
        assert!(block.iter().all(|&flag| flag == 1));

        let mut block = [0u8; WIDE_COUNT];
        decode_from_slice(&wide_wire(1..=64), &WIDE, &mut block).unwrap();
        assert_eq!(block[64], 0);

        let mut block = [0u8; WIDE_COUNT];
        let err = decode_from_slice(&wide_wire(2..=65), &WIDE, &mut block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MissingRequiredField {
                message: "Wide",
                field: "flag"
            }
        ));
    }

    #[test]
    fn string_longer_than_storage_is_rejected() {
        let mut block = [0u8; 48];
        let wire = [0x08, 0x01, 0x12, 0x06, b'a', b'b', b'c', b'd', b'e', b'f'];
        let err = decode_from_slice(&wire, &SAMPLE, &mut block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::CapacityExceeded {
                len: 6,
                capacity: 5,
                ..
            }
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected_unless_disabled() {
        let wire = [0x08, 0x01, 0x12, 0x01, 0xFF];
        let mut block = [0u8; 48];
        assert!(matches!(
            decode_from_slice(&wire, &SAMPLE, &mut block),
            Err(CodecError::InvalidUtf8 { field: "name" })
        ));

        let config = DecodeConfig {
            validate_utf8: false,
            ..DecodeConfig::default()
        };
        let mut src: &[u8] = &wire;
        let mut stream = InputStream::from_slice(&mut src);
        decode_with(&mut stream, &SAMPLE, &mut block, &mut [], &config).unwrap();
        assert_eq!(block[4], 0xFF);
    }

    #[test]
    fn wire_type_mismatch() {
        let wire = [0x0D, 0x01, 0x00, 0x00, 0x00];
        let mut block = [0u8; 48];
        let err = decode_from_slice(&wire, &SAMPLE, &mut block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::WireTypeMismatch {
                field: "id",
                expected: WireType::Varint,
                actual: WireType::Fixed32
            }
        ));

        let config = DecodeConfig {
            skip_mismatched_wire_types: true,
            ..DecodeConfig::default()
        };
        let wire = [0x0D, 0x01, 0x00, 0x00, 0x00, 0x08, 0x09];
        let mut src: &[u8] = &wire;
        let mut stream = InputStream::from_slice(&mut src);
        decode_with(&mut stream, &SAMPLE, &mut block, &mut [], &config).unwrap();
        assert_eq!(u32_at(&block, 0), 9);
    }

    #[test]
    fn group_in_unknown_field_cannot_be_skipped() {
        let wire = [0x08, 0x01, 0x7B];
        let mut block = [0u8; 48];
        let err = decode_from_slice(&wire, &SAMPLE, &mut block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownFieldSkipFailure {
                number: 15,
                wire_type: WireType::StartGroup
            }
        ));
    }

    #[test]
    fn truncated_submessage_is_end_of_stream() {
        let wire = [0x08, 0x01, 0x22, 0x05, 0x08];
        let mut block = [0u8; 48];
        let err = decode_from_slice(&wire, &SAMPLE, &mut block).unwrap_err();
        assert!(matches!(err, CodecError::Wire(WireError::LengthMismatch { .. })));
    }

    #[test]
    fn delimited_reads_only_its_message() {
        let wire = [0x02, 0x08, 0x07, 0x08, 0x09];
        let mut src: &[u8] = &wire;
        let mut stream = InputStream::from_slice(&mut src);
        let mut block = [0u8; 48];
        decode_delimited(&mut stream, &SAMPLE, &mut block).unwrap();
        assert_eq!(u32_at(&block, 0), 7);
        assert_eq!(stream.bytes_left(), 2);
    }

    #[test]
    fn noinit_merges_with_existing_content() {
        let mut block = [0u8; 48];
        decode_from_slice(&[0x08, 0x01, 0x28, 0x02], &SAMPLE, &mut block).unwrap();
        let mut src: &[u8] = &[0x08, 0x02, 0x28, 0x04];
        let mut stream = InputStream::from_slice(&mut src);
        decode_noinit(&mut stream, &SAMPLE, &mut block).unwrap();
        assert_eq!(u32_at(&block, 0), 2);
        assert_eq!(u32_at(&block, 36), 2);
        assert_eq!(i32_at(&block, 28), 2);
    }

    #[test]
    fn depth_limit_stops_nesting() {
        let wire = [0x08, 0x01, 0x22, 0x02, 0x08, 0x05];
        let config = DecodeConfig {
            max_depth: 0,
            ..DecodeConfig::default()
        };
        let mut src: &[u8] = &wire;
        let mut stream = InputStream::from_slice(&mut src);
        let mut block = [0u8; 48];
        let err = decode_with(&mut stream, &SAMPLE, &mut block, &mut [], &config).unwrap_err();
        assert!(matches!(err, CodecError::MessageTooDeep { max: 0 }));
    }
}
