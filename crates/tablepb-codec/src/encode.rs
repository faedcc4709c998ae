//! Table-driven message encoder.
//!
//! Fields are written in descriptor table order. A submessage is encoded
//! twice: once into a sizing stream to learn its length prefix, then for
//! real into a sub-stream of exactly that length.

use tablepb_stream::{OutputStream, StreamError};
use tablepb_wire::{
    encode_bytes, encode_fixed32, encode_fixed64, encode_tag, encode_varint, zigzag_encode64,
    WireError, WireType,
};
use tracing::debug;

use crate::callback::{ElementWriter, FieldCallback, Scalar};
use crate::config::EncodeConfig;
use crate::descriptor::{DataKind, FieldDescriptor, IntType, MessageDescriptor, Multiplicity, Width};
use crate::error::{CodecError, Result};
use crate::iter::FieldRef;
use crate::storage;

/// Encode the message in `block` to `stream`.
pub fn encode(stream: &mut OutputStream<'_>, desc: &MessageDescriptor, block: &[u8]) -> Result<()> {
    encode_with(stream, desc, block, &mut [], &EncodeConfig::default())
}

/// Encode with callbacks for callback fields and an explicit config.
pub fn encode_with(
    stream: &mut OutputStream<'_>,
    desc: &MessageDescriptor,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
) -> Result<()> {
    encode_message(stream, desc, block, callbacks, config, 0)
}

/// Encode the message preceded by its length as a varint.
pub fn encode_delimited(stream: &mut OutputStream<'_>, desc: &MessageDescriptor, block: &[u8]) -> Result<()> {
    encode_delimited_with(stream, desc, block, &mut [], &EncodeConfig::default())
}

pub fn encode_delimited_with(
    stream: &mut OutputStream<'_>,
    desc: &MessageDescriptor,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
) -> Result<()> {
    encode_sized(stream, desc.name, desc, block, callbacks, config, 0)
}

/// Bytes [`encode`] would write for this message.
pub fn encoded_size(desc: &MessageDescriptor, block: &[u8]) -> Result<usize> {
    encoded_size_with(desc, block, &mut [], &EncodeConfig::default())
}

pub fn encoded_size_with(
    desc: &MessageDescriptor,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
) -> Result<usize> {
    let mut sizing = OutputStream::sizing();
    encode_message(&mut sizing, desc, block, callbacks, config, 0)?;
    Ok(sizing.bytes_written())
}

/// Encode into `buf` and return the number of bytes used.
pub fn encode_to_slice(buf: &mut [u8], desc: &MessageDescriptor, block: &[u8]) -> Result<usize> {
    let mut dst: &mut [u8] = buf;
    let mut stream = OutputStream::from_slice(&mut dst);
    encode(&mut stream, desc, block)?;
    Ok(stream.bytes_written())
}

pub fn encode_to_vec(desc: &MessageDescriptor, block: &[u8]) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let mut stream = OutputStream::unbounded(&mut buf);
    encode(&mut stream, desc, block)?;
    Ok(buf)
}

pub(crate) fn encode_message(
    out: &mut OutputStream<'_>,
    desc: &MessageDescriptor,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    if depth > config.max_depth {
        debug!(message = desc.name, depth, max = config.max_depth, "encode depth limit reached");
        return Err(CodecError::MessageTooDeep {
            max: config.max_depth,
        });
    }
    storage::check_block(desc, block)?;

    for fref in desc.iter() {
        encode_field(out, &fref, block, callbacks, config, depth)?;
    }
    Ok(())
}

/// Write `varint(size) || message`, measuring the message first.
pub(crate) fn encode_sized(
    out: &mut OutputStream<'_>,
    label: &'static str,
    desc: &MessageDescriptor,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    let mut sizing = OutputStream::sizing();
    encode_message(&mut sizing, desc, block, callbacks, config, depth)?;
    let size = sizing.bytes_written();
    encode_varint(out, size as u64)?;

    if out.is_sizing() {
        out.skip(size)?;
        return Ok(());
    }

    let written = out.with_substream(size, |sub| {
        match encode_message(sub, desc, block, callbacks, config, depth) {
            Err(CodecError::Wire(WireError::Stream(StreamError::LimitExceeded { requested, .. }))) => {
                Err(CodecError::SizeMismatch {
                    field: label,
                    expected: size,
                    actual: sub.bytes_written() + requested,
                })
            }
            Err(err) => Err(err),
            Ok(()) => Ok(sub.bytes_written()),
        }
    })?;
    if written != size {
        return Err(CodecError::SizeMismatch {
            field: label,
            expected: size,
            actual: written,
        });
    }
    Ok(())
}

fn encode_field(
    out: &mut OutputStream<'_>,
    fref: &FieldRef<'_>,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    let field = fref.field;
    if field.is_callback() {
        return encode_callback(out, fref, block, callbacks, config, depth);
    }

    match field.multiplicity {
        Multiplicity::Repeated => return encode_array(out, fref, block, callbacks, config, depth),
        Multiplicity::Oneof(_) | Multiplicity::Optional => {
            if !storage::is_present(block, fref)? {
                return Ok(());
            }
        }
        Multiplicity::Required => {}
    }
    let data = storage::get(block, fref.data(), field)?;
    encode_value(out, field, data, callbacks, config, depth)
}

fn encode_array(
    out: &mut OutputStream<'_>,
    fref: &FieldRef<'_>,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    let field = fref.field;
    let count = storage::slot(block, fref)? as usize;
    if count == 0 {
        return Ok(());
    }
    if count > field.array_capacity {
        return Err(CodecError::ArrayFull {
            field: field.name,
            capacity: field.array_capacity,
        });
    }

    if field.packed && field.kind.is_packable() {
        let size = match field.kind.fixed_wire_len() {
            Some(width) => width * count,
            None => {
                let mut sizing = OutputStream::sizing();
                for index in 0..count {
                    encode_scalar(&mut sizing, field, element_scalar(block, fref, index)?)?;
                }
                sizing.bytes_written()
            }
        };
        encode_tag(out, WireType::LengthDelimited, field.tag)?;
        encode_varint(out, size as u64)?;
        for index in 0..count {
            encode_scalar(out, field, element_scalar(block, fref, index)?)?;
        }
        return Ok(());
    }

    for index in 0..count {
        let data = storage::get(block, fref.element(index), field)?;
        encode_value(out, field, data, callbacks, config, depth)?;
    }
    Ok(())
}

fn element_scalar(block: &[u8], fref: &FieldRef<'_>, index: usize) -> Result<Scalar> {
    let data = storage::get(block, fref.element(index), fref.field)?;
    Ok(storage::load_scalar(&fref.field.kind, data))
}

/// Payload length of a packed run of `values`.
pub(crate) fn packed_size(field: &FieldDescriptor, values: impl Iterator<Item = Scalar>) -> Result<usize> {
    if let Some(width) = field.kind.fixed_wire_len() {
        return Ok(width * values.count());
    }
    let mut sizing = OutputStream::sizing();
    for value in values {
        encode_scalar(&mut sizing, field, value)?;
    }
    Ok(sizing.bytes_written())
}

fn encode_value(
    out: &mut OutputStream<'_>,
    field: &FieldDescriptor,
    data: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    match field.kind {
        DataKind::String => {
            let len = storage::string_len(data).ok_or(CodecError::CapacityExceeded {
                field: field.name,
                len: data.len(),
                capacity: data.len().saturating_sub(1),
            })?;
            encode_tag(out, WireType::LengthDelimited, field.tag)?;
            encode_bytes(out, &data[..len])?;
        }
        DataKind::Bytes => {
            let payload = storage::bytes_value(data, field)?;
            encode_tag(out, WireType::LengthDelimited, field.tag)?;
            encode_bytes(out, payload)?;
        }
        DataKind::Submessage(nested) => {
            encode_tag(out, WireType::LengthDelimited, field.tag)?;
            encode_sized(out, field.name, nested, data, callbacks, config, depth + 1)?;
        }
        kind => {
            encode_tag(out, kind.wire_type(), field.tag)?;
            encode_scalar(out, field, storage::load_scalar(&kind, data))?;
        }
    }
    Ok(())
}

/// Write one scalar value of `field` without its tag.
pub(crate) fn encode_scalar(out: &mut OutputStream<'_>, field: &FieldDescriptor, value: Scalar) -> Result<()> {
    match field.kind {
        DataKind::Bool => encode_varint(out, u64::from(value.as_bool()))?,
        DataKind::Varint(_) | DataKind::Enum => encode_varint(out, value.as_u64())?,
        DataKind::ZigZag(_) => encode_varint(out, zigzag_encode64(value.as_i64()))?,
        DataKind::Fixed(IntType {
            width: Width::W64, ..
        }) => encode_fixed64(out, value.as_u64())?,
        DataKind::Fixed(_) => encode_fixed32(out, value.as_u64() as u32)?,
        DataKind::Float(Width::W64) => encode_fixed64(out, value.as_f64().to_bits())?,
        DataKind::Float(_) => encode_fixed32(out, value.as_f32().to_bits())?,
        DataKind::String | DataKind::Bytes | DataKind::Submessage(_) => {
            return Err(CodecError::KindMismatch {
                field: field.name,
                kind: field.kind.name(),
            })
        }
    }
    Ok(())
}

fn encode_callback(
    out: &mut OutputStream<'_>,
    fref: &FieldRef<'_>,
    block: &[u8],
    callbacks: &mut [&mut dyn FieldCallback],
    config: &EncodeConfig,
    depth: usize,
) -> Result<()> {
    let field = fref.field;
    let slot = storage::callback_slot(block, fref)?;
    if slot == 0 {
        return Ok(());
    }
    let callback = callbacks
        .get_mut(slot - 1)
        .ok_or_else(|| CodecError::invalid(field.name, "callback slot not provided"))?;
    let mut writer = ElementWriter::new(out, field, config, depth);
    callback.encode_elements(field, &mut writer)
}
