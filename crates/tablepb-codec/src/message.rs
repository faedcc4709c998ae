//! Typed access to message blocks by field tag.
//!
//! The codec itself only needs raw blocks. These views are for the code on
//! either side of it: building a message before [`encode`](crate::encode)
//! and reading one back after [`decode`](crate::decode), without spelling
//! out offsets by hand.
//!
//! ```
//! use tablepb_codec::{DataKind, FieldDescriptor, MessageDescriptor, MessageView, MessageViewMut};
//!
//! static FIELDS: [FieldDescriptor; 2] = [
//!     FieldDescriptor::new(1, "id", DataKind::UINT32, 0, 4),
//!     FieldDescriptor::new(2, "label", DataKind::String, 4, 12).implicit(),
//! ];
//! static ITEM: MessageDescriptor = MessageDescriptor::new("Item", &FIELDS, 16);
//!
//! let mut block = [0u8; 16];
//! let mut item = MessageViewMut::new(&ITEM, &mut block).unwrap();
//! item.set(1, 42u32).unwrap();
//! item.set_str(2, "widget").unwrap();
//!
//! let view = MessageView::new(&ITEM, &block).unwrap();
//! assert_eq!(view.get(1).unwrap().as_u64(), 42);
//! assert_eq!(view.get_str(2).unwrap(), "widget");
//! ```

use crate::callback::Scalar;
use crate::descriptor::{DataKind, FieldDescriptor, MessageDescriptor, Multiplicity};
use crate::error::{CodecError, Result};
use crate::iter::FieldRef;
use crate::storage;

const ZERO_SCALAR: [u8; 8] = [0; 8];

fn lookup(desc: &MessageDescriptor, tag: u32) -> Result<FieldRef<'_>> {
    desc.iter().find(tag).ok_or(CodecError::NoSuchField {
        message: desc.name,
        tag,
    })
}

fn mismatch(field: &FieldDescriptor, kind: &'static str) -> CodecError {
    CodecError::KindMismatch {
        field: field.name,
        kind,
    }
}

/// The field holds one static value.
fn expect_single(field: &FieldDescriptor) -> Result<()> {
    if field.is_callback() {
        return Err(mismatch(field, "callback"));
    }
    if field.is_repeated() {
        return Err(mismatch(field, "repeated"));
    }
    Ok(())
}

fn expect_array(field: &FieldDescriptor) -> Result<()> {
    if field.is_callback() {
        return Err(mismatch(field, "callback"));
    }
    if !field.is_repeated() {
        return Err(mismatch(field, field.kind.name()));
    }
    Ok(())
}

fn expect_scalar(field: &FieldDescriptor) -> Result<()> {
    if field.kind.is_scalar() {
        Ok(())
    } else {
        Err(mismatch(field, field.kind.name()))
    }
}

fn expect_kind(field: &FieldDescriptor, wanted: &DataKind) -> Result<()> {
    if std::mem::discriminant(&field.kind) == std::mem::discriminant(wanted) {
        Ok(())
    } else {
        Err(mismatch(field, field.kind.name()))
    }
}

fn nested(field: &FieldDescriptor) -> Result<&'static MessageDescriptor> {
    match field.kind {
        DataKind::Submessage(nested) => Ok(nested),
        _ => Err(mismatch(field, field.kind.name())),
    }
}

/// Anything but an inactive oneof member.
fn is_active(block: &[u8], fref: &FieldRef<'_>) -> Result<bool> {
    match fref.field.multiplicity {
        Multiplicity::Oneof(_) => Ok(storage::slot(block, fref)? == u64::from(fref.field.tag)),
        _ => Ok(true),
    }
}

/// Populated element count, never above capacity.
fn element_count(block: &[u8], fref: &FieldRef<'_>) -> Result<usize> {
    let count = storage::slot(block, fref)? as usize;
    if count > fref.field.array_capacity {
        return Err(CodecError::ArrayFull {
            field: fref.field.name,
            capacity: fref.field.array_capacity,
        });
    }
    Ok(count)
}

fn element_range(block: &[u8], fref: &FieldRef<'_>, index: usize) -> Result<std::ops::Range<usize>> {
    let count = element_count(block, fref)?;
    if index >= count {
        return Err(CodecError::IndexOutOfRange {
            field: fref.field.name,
            index,
            count,
        });
    }
    Ok(fref.element(index))
}

fn str_value<'b>(field: &FieldDescriptor, data: &'b [u8]) -> Result<&'b str> {
    let len = storage::string_len(data).ok_or(CodecError::CapacityExceeded {
        field: field.name,
        len: data.len(),
        capacity: data.len().saturating_sub(1),
    })?;
    std::str::from_utf8(&data[..len]).map_err(|_| CodecError::InvalidUtf8 { field: field.name })
}

fn store_str(field: &FieldDescriptor, data: &mut [u8], text: &str) -> Result<()> {
    let capacity = data.len().saturating_sub(1);
    if data.is_empty() || text.len() > capacity {
        return Err(CodecError::CapacityExceeded {
            field: field.name,
            len: text.len(),
            capacity,
        });
    }
    data.fill(0);
    data[..text.len()].copy_from_slice(text.as_bytes());
    Ok(())
}

fn store_bytes(field: &FieldDescriptor, data: &mut [u8], value: &[u8]) -> Result<()> {
    if data.len() < 4 {
        return Err(CodecError::invalid(field.name, "bytes storage needs a length prefix"));
    }
    let (prefix, payload) = data.split_at_mut(4);
    if value.len() > payload.len() {
        return Err(CodecError::CapacityExceeded {
            field: field.name,
            len: value.len(),
            capacity: payload.len(),
        });
    }
    payload.fill(0);
    payload[..value.len()].copy_from_slice(value);
    storage::write_uint(prefix, value.len() as u64);
    Ok(())
}

/// Read-only view of a message block.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'d, 'b> {
    desc: &'d MessageDescriptor,
    block: &'b [u8],
}

impl<'d, 'b> MessageView<'d, 'b> {
    /// Fails when `block` is smaller than the descriptor's size.
    pub fn new(desc: &'d MessageDescriptor, block: &'b [u8]) -> Result<Self> {
        storage::check_block(desc, block)?;
        Ok(Self { desc, block })
    }

    pub fn descriptor(&self) -> &'d MessageDescriptor {
        self.desc
    }

    pub fn block(&self) -> &'b [u8] {
        self.block
    }

    /// Whether the field would be encoded. For callback fields, whether a
    /// callback slot is bound.
    pub fn has(&self, tag: u32) -> Result<bool> {
        let fref = lookup(self.desc, tag)?;
        if fref.field.is_callback() {
            return Ok(storage::callback_slot(self.block, &fref)? != 0);
        }
        storage::is_present(self.block, &fref)
    }

    /// Value of a single scalar field. An inactive oneof member reads as
    /// zero.
    pub fn get(&self, tag: u32) -> Result<Scalar> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_scalar(field)?;
        if !is_active(self.block, &fref)? {
            return Ok(storage::load_scalar(&field.kind, &ZERO_SCALAR));
        }
        let data = storage::get(self.block, fref.data(), field)?;
        Ok(storage::load_scalar(&field.kind, data))
    }

    pub fn get_str(&self, tag: u32) -> Result<&'b str> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_kind(field, &DataKind::String)?;
        if !is_active(self.block, &fref)? {
            return Ok("");
        }
        str_value(field, storage::get(self.block, fref.data(), field)?)
    }

    pub fn get_bytes(&self, tag: u32) -> Result<&'b [u8]> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_kind(field, &DataKind::Bytes)?;
        if !is_active(self.block, &fref)? {
            return Ok(&[]);
        }
        storage::bytes_value(storage::get(self.block, fref.data(), field)?, field)
    }

    /// Populated elements of a repeated field; 0 or 1 for a single field.
    pub fn count(&self, tag: u32) -> Result<usize> {
        let fref = lookup(self.desc, tag)?;
        if fref.field.is_repeated() && !fref.field.is_callback() {
            return element_count(self.block, &fref);
        }
        Ok(usize::from(self.has(tag)?))
    }

    pub fn get_at(&self, tag: u32, index: usize) -> Result<Scalar> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_scalar(field)?;
        let range = element_range(self.block, &fref, index)?;
        Ok(storage::load_scalar(&field.kind, storage::get(self.block, range, field)?))
    }

    pub fn get_str_at(&self, tag: u32, index: usize) -> Result<&'b str> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_kind(field, &DataKind::String)?;
        let range = element_range(self.block, &fref, index)?;
        str_value(field, storage::get(self.block, range, field)?)
    }

    pub fn get_bytes_at(&self, tag: u32, index: usize) -> Result<&'b [u8]> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_kind(field, &DataKind::Bytes)?;
        let range = element_range(self.block, &fref, index)?;
        storage::bytes_value(storage::get(self.block, range, field)?, field)
    }

    /// View of a single submessage field.
    pub fn submessage(&self, tag: u32) -> Result<MessageView<'d, 'b>> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        let desc = nested(field)?;
        MessageView::new(desc, storage::get(self.block, fref.data(), field)?)
    }

    /// View of element `index` of a repeated submessage field.
    pub fn element(&self, tag: u32, index: usize) -> Result<MessageView<'d, 'b>> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        let desc = nested(field)?;
        let range = element_range(self.block, &fref, index)?;
        MessageView::new(desc, storage::get(self.block, range, field)?)
    }

    /// Tag of the active member of oneof `group`, if any.
    pub fn which(&self, group: u8) -> Result<Option<u32>> {
        let member = self
            .desc
            .oneof_members(group)
            .next()
            .ok_or(CodecError::NoSuchField {
                message: self.desc.name,
                tag: u32::from(group),
            })?;
        let fref = lookup(self.desc, member.tag)?;
        let which = storage::slot(self.block, &fref)? as u32;
        Ok((which != 0).then_some(which))
    }
}

/// Mutable view of a message block.
#[derive(Debug)]
pub struct MessageViewMut<'d, 'b> {
    desc: &'d MessageDescriptor,
    block: &'b mut [u8],
}

impl<'d, 'b> MessageViewMut<'d, 'b> {
    pub fn new(desc: &'d MessageDescriptor, block: &'b mut [u8]) -> Result<Self> {
        storage::check_block(desc, block)?;
        Ok(Self { desc, block })
    }

    pub fn as_view(&self) -> MessageView<'d, '_> {
        MessageView {
            desc: self.desc,
            block: &*self.block,
        }
    }

    /// Reset every static field to its default.
    pub fn init(&mut self) -> Result<()> {
        storage::init_message(self.desc, self.block, 0)
    }

    /// Set a single scalar field and mark it present.
    pub fn set(&mut self, tag: u32, value: impl Into<Scalar>) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_scalar(field)?;
        self.mark_present(&fref)?;
        storage::store_scalar(&field.kind, storage::get_mut(self.block, fref.data(), field)?, value.into());
        Ok(())
    }

    pub fn set_str(&mut self, tag: u32, text: &str) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_kind(field, &DataKind::String)?;
        self.mark_present(&fref)?;
        store_str(field, storage::get_mut(self.block, fref.data(), field)?, text)
    }

    pub fn set_bytes(&mut self, tag: u32, value: &[u8]) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        expect_kind(field, &DataKind::Bytes)?;
        self.mark_present(&fref)?;
        store_bytes(field, storage::get_mut(self.block, fref.data(), field)?, value)
    }

    /// Set or clear the has-flag of an optional field, or activate or
    /// deactivate a oneof member.
    pub fn set_present(&mut self, tag: u32, present: bool) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        match field.multiplicity {
            Multiplicity::Optional if fref.size_slot().is_some() => {
                storage::set_slot(self.block, &fref, u64::from(present))
            }
            Multiplicity::Oneof(_) if present => self.mark_present(&fref),
            Multiplicity::Oneof(_) => self.clear(tag),
            _ => Err(mismatch(field, "field without a presence flag")),
        }
    }

    /// Append to a repeated scalar field.
    pub fn push(&mut self, tag: u32, value: impl Into<Scalar>) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_scalar(field)?;
        let range = self.append(&fref)?;
        storage::store_scalar(&field.kind, storage::get_mut(self.block, range, field)?, value.into());
        Ok(())
    }

    pub fn push_str(&mut self, tag: u32, text: &str) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_kind(field, &DataKind::String)?;
        let range = self.append(&fref)?;
        store_str(field, storage::get_mut(self.block, range, field)?, text)
    }

    pub fn push_bytes(&mut self, tag: u32, value: &[u8]) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        expect_kind(field, &DataKind::Bytes)?;
        let range = self.append(&fref)?;
        store_bytes(field, storage::get_mut(self.block, range, field)?, value)
    }

    /// Append an initialised element to a repeated submessage field and
    /// return a view of it.
    pub fn push_message(&mut self, tag: u32) -> Result<MessageViewMut<'d, '_>> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        let desc = nested(field)?;
        let range = self.append(&fref)?;
        let block = storage::get_mut(self.block, range, field)?;
        storage::init_message(desc, block, 0)?;
        Ok(MessageViewMut { desc, block })
    }

    /// Mutable view of a single submessage field, which is marked present.
    pub fn submessage_mut(&mut self, tag: u32) -> Result<MessageViewMut<'d, '_>> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_single(field)?;
        let desc = nested(field)?;
        self.mark_present(&fref)?;
        MessageViewMut::new(desc, storage::get_mut(self.block, fref.data(), field)?)
    }

    pub fn element_mut(&mut self, tag: u32, index: usize) -> Result<MessageViewMut<'d, '_>> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        expect_array(field)?;
        let desc = nested(field)?;
        let range = element_range(self.block, &fref, index)?;
        MessageViewMut::new(desc, storage::get_mut(self.block, range, field)?)
    }

    /// Route a callback field to entry `slot - 1` of the callback list;
    /// slot 0 unbinds it.
    pub fn bind_callback(&mut self, tag: u32, slot: u16) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        let field = fref.field;
        if !field.is_callback() {
            return Err(mismatch(field, field.kind.name()));
        }
        storage::write_uint(storage::get_mut(self.block, fref.data(), field)?, u64::from(slot));
        Ok(())
    }

    /// Return a field to its initial state. Clearing an inactive oneof
    /// member does nothing; clearing a callback field unbinds it.
    pub fn clear(&mut self, tag: u32) -> Result<()> {
        let fref = lookup(self.desc, tag)?;
        if fref.field.is_callback() {
            return self.bind_callback(tag, 0);
        }
        if !is_active(self.block, &fref)? {
            return Ok(());
        }
        storage::reset_field(self.block, &fref, 0)
    }

    fn mark_present(&mut self, fref: &FieldRef<'_>) -> Result<()> {
        match fref.field.multiplicity {
            Multiplicity::Oneof(_) if !is_active(self.block, fref)? => {
                storage::activate_oneof(self.desc, fref, self.block)
            }
            Multiplicity::Optional if fref.size_slot().is_some() => storage::set_slot(self.block, fref, 1),
            _ => Ok(()),
        }
    }

    /// Claim the next array element and return its storage range.
    fn append(&mut self, fref: &FieldRef<'_>) -> Result<std::ops::Range<usize>> {
        let count = element_count(self.block, fref)?;
        if count >= fref.field.array_capacity {
            return Err(CodecError::ArrayFull {
                field: fref.field.name,
                capacity: fref.field.array_capacity,
            });
        }
        storage::set_slot(self.block, fref, count as u64 + 1)?;
        Ok(fref.element(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DefaultValue;

    static POINT_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::new(1, "x", DataKind::SINT32, 0, 4).implicit(),
        FieldDescriptor::new(2, "y", DataKind::SINT32, 4, 4).implicit(),
    ];
    static POINT: MessageDescriptor = MessageDescriptor::new("Point", &POINT_FIELDS, 8);

    static SHAPE_FIELDS: [FieldDescriptor; 7] = [
        FieldDescriptor::new(1, "label", DataKind::String, 0, 8).optional(8),
        FieldDescriptor::new(2, "points", DataKind::Submessage(&POINT), 12, 8).repeated(36, 3),
        FieldDescriptor::new(3, "radius", DataKind::FLOAT, 40, 4).oneof(0, 52),
        FieldDescriptor::new(4, "side", DataKind::UINT32, 44, 4)
            .oneof(0, 52)
            .with_default(DefaultValue::U64(1)),
        FieldDescriptor::new(5, "tags", DataKind::Bytes, 56, 8).repeated(72, 2),
        FieldDescriptor::new(6, "extra", DataKind::UINT32, 76, 2).callback(),
        FieldDescriptor::new(7, "center", DataKind::Submessage(&POINT), 80, 8).optional(9),
    ];
    static SHAPE: MessageDescriptor = MessageDescriptor::new("Shape", &SHAPE_FIELDS, 88);

    #[test]
    fn descriptors_are_consistent() {
        SHAPE.validate().unwrap();
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        shape.set_str(1, "tri").unwrap();
        for (x, y) in [(0, 0), (4, 0), (0, -3)] {
            let mut point = shape.push_message(2).unwrap();
            point.set(1, x).unwrap();
            point.set(2, y).unwrap();
        }
        shape.push_bytes(5, b"abc").unwrap();

        let view = shape.as_view();
        assert!(view.has(1).unwrap());
        assert_eq!(view.get_str(1).unwrap(), "tri");
        assert_eq!(view.count(2).unwrap(), 3);
        assert_eq!(view.element(2, 2).unwrap().get(2).unwrap(), Scalar::Signed(-3));
        assert_eq!(view.get_bytes_at(5, 0).unwrap(), b"abc");
        assert!(!view.has(7).unwrap());
    }

    #[test]
    fn oneof_switch_resets_sibling() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        shape.set(3, 2.5f32).unwrap();
        assert_eq!(shape.as_view().which(0).unwrap(), Some(3));

        shape.set_present(4, true).unwrap();
        let view = shape.as_view();
        assert_eq!(view.which(0).unwrap(), Some(4));
        assert_eq!(view.get(4).unwrap(), Scalar::Unsigned(1));
        assert_eq!(view.get(3).unwrap(), Scalar::Float(0.0));
        assert!(!view.has(3).unwrap());

        shape.clear(3).unwrap();
        assert_eq!(shape.as_view().which(0).unwrap(), Some(4));
        shape.clear(4).unwrap();
        assert_eq!(shape.as_view().which(0).unwrap(), None);
    }

    #[test]
    fn arrays_are_bounded() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        shape.push_bytes(5, b"a").unwrap();
        shape.push_bytes(5, b"b").unwrap();
        assert!(matches!(
            shape.push_bytes(5, b"c"),
            Err(CodecError::ArrayFull { capacity: 2, .. })
        ));
        assert!(matches!(
            shape.as_view().get_bytes_at(5, 2),
            Err(CodecError::IndexOutOfRange { index: 2, count: 2, .. })
        ));
    }

    #[test]
    fn wrong_accessors_are_rejected() {
        let block = [0u8; 88];
        let view = MessageView::new(&SHAPE, &block).unwrap();
        assert!(matches!(view.get(99), Err(CodecError::NoSuchField { tag: 99, .. })));
        assert!(matches!(view.get(1), Err(CodecError::KindMismatch { .. })));
        assert!(matches!(view.get_str(2), Err(CodecError::KindMismatch { .. })));
        assert!(matches!(view.get(6), Err(CodecError::KindMismatch { kind: "callback", .. })));
        assert!(matches!(view.which(5), Err(CodecError::NoSuchField { tag: 5, .. })));
    }

    #[test]
    fn strings_must_fit() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        assert!(matches!(
            shape.set_str(1, "too long!"),
            Err(CodecError::CapacityExceeded { len: 9, capacity: 7, .. })
        ));
        shape.set_str(1, "seven!!").unwrap();
    }

    #[test]
    fn callback_binding() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        shape.bind_callback(6, 1).unwrap();
        assert!(shape.as_view().has(6).unwrap());
        shape.clear(6).unwrap();
        assert!(!shape.as_view().has(6).unwrap());
        assert!(matches!(shape.bind_callback(1, 1), Err(CodecError::KindMismatch { .. })));
    }

    #[test]
    fn submessage_mut_marks_presence() {
        let mut block = [0u8; 88];
        let mut shape = MessageViewMut::new(&SHAPE, &mut block).unwrap();
        shape.submessage_mut(7).unwrap().set(1, -9).unwrap();
        let view = MessageView::new(&SHAPE, &block).unwrap();
        assert!(view.has(7).unwrap());
        assert_eq!(view.submessage(7).unwrap().get(1).unwrap(), Scalar::Signed(-9));
    }
}
