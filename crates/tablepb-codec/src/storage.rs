//! Bounds-checked access to message blocks.

use std::ops::Range;

use crate::callback::Scalar;
use crate::descriptor::{DataKind, DefaultValue, FieldDescriptor, MessageDescriptor, Multiplicity, Width};
use crate::error::{CodecError, Result};
use crate::iter::FieldRef;

const MAX_INIT_DEPTH: usize = 64;

pub(crate) fn get<'b>(block: &'b [u8], range: Range<usize>, field: &FieldDescriptor) -> Result<&'b [u8]> {
    block
        .get(range)
        .ok_or_else(|| CodecError::invalid(field.name, "storage outside message block"))
}

pub(crate) fn get_mut<'b>(
    block: &'b mut [u8],
    range: Range<usize>,
    field: &FieldDescriptor,
) -> Result<&'b mut [u8]> {
    block
        .get_mut(range)
        .ok_or_else(|| CodecError::invalid(field.name, "storage outside message block"))
}

pub(crate) fn check_block(desc: &MessageDescriptor, block: &[u8]) -> Result<()> {
    if block.len() < desc.size {
        return Err(CodecError::invalid(
            desc.name,
            "message block smaller than descriptor size",
        ));
    }
    Ok(())
}

/// Little-endian unsigned value of up to eight bytes.
pub(crate) fn read_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

/// Little-endian signed value of up to eight bytes, sign-extended.
pub(crate) fn read_int(bytes: &[u8]) -> i64 {
    let len = bytes.len().min(8);
    if len == 0 {
        return 0;
    }
    let shift = 64 - 8 * len as u32;
    ((read_uint(bytes) << shift) as i64) >> shift
}

/// Store the low `bytes.len()` bytes of `value`, little-endian.
pub(crate) fn write_uint(bytes: &mut [u8], value: u64) {
    for (i, byte) in bytes.iter_mut().take(8).enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
}

pub(crate) fn truncate_unsigned(value: u64, width: Width) -> u64 {
    match width {
        Width::W64 => value,
        _ => value & ((1u64 << (8 * width.bytes())) - 1),
    }
}

pub(crate) fn truncate_signed(value: i64, width: Width) -> i64 {
    let shift = 64 - 8 * width.bytes() as u32;
    (value << shift) >> shift
}

pub(crate) fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&byte| byte == 0)
}

/// Length of a NUL-terminated string, or `None` without a terminator.
pub(crate) fn string_len(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&byte| byte == 0)
}

/// The populated part of `[u32 length][capacity]` bytes storage.
pub(crate) fn bytes_value<'b>(data: &'b [u8], field: &FieldDescriptor) -> Result<&'b [u8]> {
    let (prefix, payload) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| CodecError::invalid(field.name, "bytes storage needs a length prefix"))?;
    let len = u32::from_le_bytes(*prefix) as usize;
    payload.get(..len).ok_or(CodecError::CapacityExceeded {
        field: field.name,
        len,
        capacity: payload.len(),
    })
}

pub(crate) fn load_scalar(kind: &DataKind, bytes: &[u8]) -> Scalar {
    match kind {
        DataKind::Bool => Scalar::Bool(!is_zero(bytes)),
        DataKind::Varint(int) | DataKind::Fixed(int) if int.signed => Scalar::Signed(read_int(bytes)),
        DataKind::Varint(_) | DataKind::Fixed(_) => Scalar::Unsigned(read_uint(bytes)),
        DataKind::ZigZag(_) | DataKind::Enum => Scalar::Signed(read_int(bytes)),
        DataKind::Float(Width::W64) => Scalar::Double(f64::from_bits(read_uint(bytes))),
        DataKind::Float(_) => Scalar::Float(f32::from_bits(read_uint(bytes) as u32)),
        DataKind::String | DataKind::Bytes | DataKind::Submessage(_) => Scalar::Unsigned(0),
    }
}

pub(crate) fn store_scalar(kind: &DataKind, bytes: &mut [u8], value: Scalar) {
    match kind {
        DataKind::Bool => write_uint(bytes, u64::from(value.as_bool())),
        DataKind::Float(Width::W64) => write_uint(bytes, value.as_f64().to_bits()),
        DataKind::Float(_) => write_uint(bytes, u64::from(value.as_f32().to_bits())),
        _ => write_uint(bytes, value.as_u64()),
    }
}

/// Value of the has-flag, element count or oneof `which` tag.
pub(crate) fn slot(block: &[u8], fref: &FieldRef<'_>) -> Result<u64> {
    let range = fref
        .size_slot()
        .ok_or_else(|| CodecError::invalid(fref.field.name, "field has no size offset"))?;
    Ok(read_uint(get(block, range, fref.field)?))
}

pub(crate) fn set_slot(block: &mut [u8], fref: &FieldRef<'_>, value: u64) -> Result<()> {
    let range = fref
        .size_slot()
        .ok_or_else(|| CodecError::invalid(fref.field.name, "field has no size offset"))?;
    write_uint(get_mut(block, range, fref.field)?, value);
    Ok(())
}

/// Callback slot id stored in a callback field; 0 means unbound.
pub(crate) fn callback_slot(block: &[u8], fref: &FieldRef<'_>) -> Result<usize> {
    Ok(read_uint(get(block, fref.data(), fref.field)?) as usize)
}

/// Whether the encoder would emit this static field.
pub(crate) fn is_present(block: &[u8], fref: &FieldRef<'_>) -> Result<bool> {
    let field = fref.field;
    match field.multiplicity {
        Multiplicity::Required => Ok(true),
        Multiplicity::Repeated => Ok(slot(block, fref)? > 0),
        Multiplicity::Oneof(_) => Ok(slot(block, fref)? == u64::from(field.tag)),
        Multiplicity::Optional if field.size_offset.is_some() => Ok(slot(block, fref)? != 0),
        Multiplicity::Optional => {
            let data = get(block, fref.data(), field)?;
            Ok(match field.kind {
                DataKind::Bytes => !bytes_value(data, field)?.is_empty(),
                DataKind::String => data.first().is_some_and(|&byte| byte != 0),
                _ => !is_zero(data),
            })
        }
    }
}

/// Zero every static field of `block` and apply defaults, recursively.
///
/// Callback slot bindings are left untouched.
pub(crate) fn init_message(desc: &MessageDescriptor, block: &mut [u8], depth: usize) -> Result<()> {
    if depth > MAX_INIT_DEPTH {
        return Err(CodecError::invalid(desc.name, "descriptor nesting too deep"));
    }
    check_block(desc, block)?;
    for fref in desc.iter() {
        if !fref.field.is_callback() {
            reset_field(block, &fref, depth)?;
        }
    }
    Ok(())
}

/// Return one static field to its initial state.
pub(crate) fn reset_field(block: &mut [u8], fref: &FieldRef<'_>, depth: usize) -> Result<()> {
    let field = fref.field;
    if let Some(range) = fref.size_slot() {
        get_mut(block, range, field)?.fill(0);
    }
    match field.multiplicity {
        Multiplicity::Repeated => get_mut(block, fref.array(), field)?.fill(0),
        Multiplicity::Oneof(_) => get_mut(block, fref.data(), field)?.fill(0),
        Multiplicity::Required | Multiplicity::Optional => {
            let data = get_mut(block, fref.data(), field)?;
            data.fill(0);
            fill_initial(field, data, depth)?;
        }
    }
    Ok(())
}

/// Make `fref` the active member of its oneof group.
///
/// Every member's storage is cleared first, so nothing of the previously
/// active member survives.
pub(crate) fn activate_oneof(desc: &MessageDescriptor, fref: &FieldRef<'_>, block: &mut [u8]) -> Result<()> {
    let field = fref.field;
    let Some(group) = field.oneof_group() else {
        return Ok(());
    };
    for member in desc.iter() {
        if member.field.oneof_group() == Some(group) {
            get_mut(block, member.data(), member.field)?.fill(0);
        }
    }
    fill_initial(field, get_mut(block, fref.data(), field)?, 0)?;
    set_slot(block, fref, u64::from(field.tag))
}

/// Initial content of a freshly zeroed value: nested defaults for
/// submessages, the descriptor default otherwise.
pub(crate) fn fill_initial(field: &FieldDescriptor, data: &mut [u8], depth: usize) -> Result<()> {
    if let DataKind::Submessage(nested) = field.kind {
        return init_message(nested, data, depth + 1);
    }
    let Some(default) = field.default else {
        return Ok(());
    };
    match (default, &field.kind) {
        (DefaultValue::Str(text), DataKind::String) => {
            let len = text.len();
            if len >= data.len() {
                return Err(CodecError::invalid(field.name, "default value does not fit the field"));
            }
            data[..len].copy_from_slice(text.as_bytes());
            data[len] = 0;
        }
        (DefaultValue::Bytes(bytes), DataKind::Bytes) => {
            if bytes.len() + 4 > data.len() {
                return Err(CodecError::invalid(field.name, "default value does not fit the field"));
            }
            let (prefix, payload) = data.split_at_mut(4);
            write_uint(prefix, bytes.len() as u64);
            payload[..bytes.len()].copy_from_slice(bytes);
        }
        (value, kind) if kind.is_scalar() => {
            let scalar = default_scalar(value)
                .ok_or_else(|| CodecError::invalid(field.name, "default value does not fit the field"))?;
            store_scalar(kind, data, scalar);
        }
        _ => return Err(CodecError::invalid(field.name, "default value does not fit the field")),
    }
    Ok(())
}

fn default_scalar(value: DefaultValue) -> Option<Scalar> {
    match value {
        DefaultValue::Bool(value) => Some(Scalar::Bool(value)),
        DefaultValue::U64(value) => Some(Scalar::Unsigned(value)),
        DefaultValue::I64(value) => Some(Scalar::Signed(value)),
        DefaultValue::F32(value) => Some(Scalar::Float(value)),
        DefaultValue::F64(value) => Some(Scalar::Double(value)),
        DefaultValue::Str(_) | DefaultValue::Bytes(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IntType;

    #[test]
    fn little_endian_roundtrip() {
        let mut bytes = [0u8; 4];
        write_uint(&mut bytes, 0x1234_5678);
        assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(read_uint(&bytes), 0x1234_5678);
    }

    #[test]
    fn signed_reads_extend_the_sign() {
        assert_eq!(read_int(&[0xFF]), -1);
        assert_eq!(read_int(&[0xFE, 0xFF]), -2);
        assert_eq!(read_int(&[0x00, 0x00, 0x00, 0x80]), i64::from(i32::MIN));
        assert_eq!(read_int(&[]), 0);
    }

    #[test]
    fn truncation_matches_cast_semantics() {
        assert_eq!(truncate_unsigned(0x1_0000_0001, Width::W32), 1);
        assert_eq!(truncate_unsigned(u64::MAX, Width::W8), 0xFF);
        assert_eq!(truncate_signed(-1, Width::W16), -1);
        assert_eq!(truncate_signed(0x8000, Width::W16), -32_768);
        assert_eq!(truncate_signed(i64::MIN, Width::W64), i64::MIN);
    }

    #[test]
    fn scalars_roundtrip_through_storage() {
        let kind = DataKind::Varint(IntType::new(Width::W16, true));
        let mut bytes = [0u8; 2];
        store_scalar(&kind, &mut bytes, Scalar::Signed(-300));
        assert_eq!(load_scalar(&kind, &bytes), Scalar::Signed(-300));

        let mut bytes = [0u8; 4];
        store_scalar(&DataKind::FLOAT, &mut bytes, Scalar::Float(1.5));
        assert_eq!(load_scalar(&DataKind::FLOAT, &bytes), Scalar::Float(1.5));
    }

    #[test]
    fn bytes_value_checks_capacity() {
        let field = FieldDescriptor::new(1, "blob", DataKind::Bytes, 0, 8);
        let data = [3, 0, 0, 0, b'a', b'b', b'c', 0];
        assert_eq!(bytes_value(&data, &field).unwrap(), b"abc");

        let data = [9, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            bytes_value(&data, &field),
            Err(CodecError::CapacityExceeded { len: 9, capacity: 4, .. })
        ));
    }

    #[test]
    fn string_defaults_are_terminated() {
        let field = FieldDescriptor::new(1, "greeting", DataKind::String, 0, 8)
            .with_default(DefaultValue::Str("hi"));
        let mut data = [0u8; 8];
        fill_initial(&field, &mut data, 0).unwrap();
        assert_eq!(&data[..3], b"hi\0");
    }
}
