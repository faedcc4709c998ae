//! Static field descriptor tables.
//!
//! A [`MessageDescriptor`] describes one message shape: its fields, how each
//! travels on the wire and where each lives inside a message block. Tables
//! are built with `const fn` builders so they can sit in `static` items:
//!
//! ```
//! use tablepb_codec::{DataKind, FieldDescriptor, MessageDescriptor};
//!
//! static POINT_FIELDS: [FieldDescriptor; 2] = [
//!     FieldDescriptor::new(1, "x", DataKind::SINT32, 0, 4),
//!     FieldDescriptor::new(2, "y", DataKind::SINT32, 4, 4).implicit(),
//! ];
//! static POINT: MessageDescriptor = MessageDescriptor::new("Point", &POINT_FIELDS, 8);
//!
//! assert!(POINT.validate().is_ok());
//! ```

use std::fmt;

use tablepb_wire::{WireType, MAX_FIELD_NUMBER};

use crate::error::{CodecError, Result};
use crate::iter::FieldIter;

const MAX_VALIDATE_DEPTH: usize = 64;

/// Maximum number of required fields tracked per message.
pub const MAX_REQUIRED_FIELDS: usize = 64;

/// Storage width of an integer or float field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Width {
    W8 = 1,
    W16 = 2,
    W32 = 4,
    W64 = 8,
}

impl Width {
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// Width and signedness of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    pub width: Width,
    pub signed: bool,
}

impl IntType {
    pub const fn new(width: Width, signed: bool) -> Self {
        Self { width, signed }
    }
}

/// How a field's value is represented, on the wire and in storage.
#[derive(Debug, Clone, Copy)]
pub enum DataKind {
    Bool,
    /// Plain varint. Negative signed values are sign-extended to 64 bits.
    Varint(IntType),
    /// Zig-zag mapped signed varint.
    ZigZag(Width),
    /// 32-bit signed enum value, encoded as a varint.
    Enum,
    /// Fixed 32 or 64-bit integer.
    Fixed(IntType),
    /// IEEE 754 single (32) or double (64) precision.
    Float(Width),
    /// NUL-terminated UTF-8 text stored in `data_size` bytes.
    String,
    /// `[u32 LE length][data_size - 4 bytes]`.
    Bytes,
    Submessage(&'static MessageDescriptor),
}

impl DataKind {
    pub const INT32: Self = Self::Varint(IntType::new(Width::W32, true));
    pub const INT64: Self = Self::Varint(IntType::new(Width::W64, true));
    pub const UINT32: Self = Self::Varint(IntType::new(Width::W32, false));
    pub const UINT64: Self = Self::Varint(IntType::new(Width::W64, false));
    pub const SINT32: Self = Self::ZigZag(Width::W32);
    pub const SINT64: Self = Self::ZigZag(Width::W64);
    pub const FIXED32: Self = Self::Fixed(IntType::new(Width::W32, false));
    pub const FIXED64: Self = Self::Fixed(IntType::new(Width::W64, false));
    pub const SFIXED32: Self = Self::Fixed(IntType::new(Width::W32, true));
    pub const SFIXED64: Self = Self::Fixed(IntType::new(Width::W64, true));
    pub const FLOAT: Self = Self::Float(Width::W32);
    pub const DOUBLE: Self = Self::Float(Width::W64);

    /// Wire type used to encode a single value of this kind.
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Bool | Self::Varint(_) | Self::ZigZag(_) | Self::Enum => WireType::Varint,
            Self::Fixed(IntType {
                width: Width::W64, ..
            })
            | Self::Float(Width::W64) => WireType::Fixed64,
            Self::Fixed(_) | Self::Float(_) => WireType::Fixed32,
            Self::String | Self::Bytes | Self::Submessage(_) => WireType::LengthDelimited,
        }
    }

    /// Whether values of this kind are single numbers.
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes | Self::Submessage(_))
    }

    /// Whether a repeated field of this kind may use packed encoding.
    pub const fn is_packable(&self) -> bool {
        self.is_scalar()
    }

    /// Storage bytes of one scalar value.
    pub const fn scalar_width(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Varint(int) | Self::Fixed(int) => Some(int.width.bytes()),
            Self::ZigZag(width) | Self::Float(width) => Some(width.bytes()),
            Self::Enum => Some(4),
            Self::String | Self::Bytes | Self::Submessage(_) => None,
        }
    }

    /// Wire bytes of one value, for fixed-width wire types.
    pub const fn fixed_wire_len(&self) -> Option<usize> {
        self.wire_type().fixed_len()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Varint(int) => match (int.signed, int.width) {
                (true, Width::W8) => "int8",
                (true, Width::W16) => "int16",
                (true, Width::W32) => "int32",
                (true, Width::W64) => "int64",
                (false, Width::W8) => "uint8",
                (false, Width::W16) => "uint16",
                (false, Width::W32) => "uint32",
                (false, Width::W64) => "uint64",
            },
            Self::ZigZag(Width::W64) => "sint64",
            Self::ZigZag(_) => "sint32",
            Self::Enum => "enum",
            Self::Fixed(int) => match (int.signed, int.width) {
                (true, Width::W64) => "sfixed64",
                (true, _) => "sfixed32",
                (false, Width::W64) => "fixed64",
                (false, _) => "fixed32",
            },
            Self::Float(Width::W64) => "double",
            Self::Float(_) => "float",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Submessage(_) => "message",
        }
    }
}

/// How many values a field holds and how presence is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    Required,
    /// With a has-flag at `size_offset`, or implicit presence without one.
    Optional,
    /// Element count (u32) at `size_offset`.
    Repeated,
    /// Member of the given group; the active tag (u32) is at `size_offset`.
    Oneof(u8),
}

/// Where a field's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Allocation {
    /// Inside the message block.
    Static,
    /// Handed to a caller callback; the block holds a u16 slot id, 0 = unbound.
    Callback,
}

/// Value a field takes when a message is initialised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(&'static str),
    Bytes(&'static [u8]),
}

impl DefaultValue {
    fn fits(&self, kind: &DataKind, data_size: usize) -> bool {
        match (self, kind) {
            (Self::Bool(_), DataKind::Bool) => true,
            (
                Self::U64(_) | Self::I64(_),
                DataKind::Varint(_) | DataKind::ZigZag(_) | DataKind::Enum | DataKind::Fixed(_),
            ) => true,
            (Self::F32(_) | Self::F64(_), DataKind::Float(_)) => true,
            (Self::Str(text), DataKind::String) => text.len() < data_size,
            (Self::Bytes(bytes), DataKind::Bytes) => bytes.len() + 4 <= data_size,
            _ => false,
        }
    }
}

/// One entry of a message descriptor table.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub tag: u32,
    pub kind: DataKind,
    pub multiplicity: Multiplicity,
    pub allocation: Allocation,
    /// Offset of the value (or of element 0) inside the message block.
    pub data_offset: usize,
    /// Bytes of storage per value.
    pub data_size: usize,
    /// Offset of the has-flag, element count or oneof `which` tag.
    pub size_offset: Option<usize>,
    /// Maximum element count of a static repeated field.
    pub array_capacity: usize,
    pub packed: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDescriptor {
    /// A required static field.
    pub const fn new(
        tag: u32,
        name: &'static str,
        kind: DataKind,
        data_offset: usize,
        data_size: usize,
    ) -> Self {
        Self {
            name,
            tag,
            kind,
            multiplicity: Multiplicity::Required,
            allocation: Allocation::Static,
            data_offset,
            data_size,
            size_offset: None,
            array_capacity: 0,
            packed: false,
            default: None,
        }
    }

    /// Optional, with a one-byte has-flag at `has_offset`.
    pub const fn optional(mut self, has_offset: usize) -> Self {
        self.multiplicity = Multiplicity::Optional;
        self.size_offset = Some(has_offset);
        self
    }

    /// Optional without a has-flag: present whenever its storage is non-zero.
    pub const fn implicit(mut self) -> Self {
        self.multiplicity = Multiplicity::Optional;
        self.size_offset = None;
        self
    }

    /// Static array of up to `capacity` elements with a u32 count at
    /// `count_offset`.
    pub const fn repeated(mut self, count_offset: usize, capacity: usize) -> Self {
        self.multiplicity = Multiplicity::Repeated;
        self.size_offset = Some(count_offset);
        self.array_capacity = capacity;
        self
    }

    pub const fn packed(mut self) -> Self {
        self.packed = true;
        self
    }

    /// Member of oneof `group`, whose active tag is a u32 at `which_offset`.
    pub const fn oneof(mut self, group: u8, which_offset: usize) -> Self {
        self.multiplicity = Multiplicity::Oneof(group);
        self.size_offset = Some(which_offset);
        self
    }

    /// Route values through a caller callback instead of static storage.
    ///
    /// The field's storage becomes a u16 slot id.
    pub const fn callback(mut self) -> Self {
        self.allocation = Allocation::Callback;
        self.data_size = 2;
        self
    }

    pub const fn with_default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn wire_type(&self) -> WireType {
        self.kind.wire_type()
    }

    pub const fn is_required(&self) -> bool {
        matches!(self.multiplicity, Multiplicity::Required)
    }

    pub const fn is_repeated(&self) -> bool {
        matches!(self.multiplicity, Multiplicity::Repeated)
    }

    pub const fn is_callback(&self) -> bool {
        matches!(self.allocation, Allocation::Callback)
    }

    pub const fn oneof_group(&self) -> Option<u8> {
        match self.multiplicity {
            Multiplicity::Oneof(group) => Some(group),
            _ => None,
        }
    }

    /// Whether a value arriving with `wire_type` can be decoded into this field.
    pub fn accepts(&self, wire_type: WireType) -> bool {
        if wire_type == self.wire_type() {
            return true;
        }
        wire_type == WireType::LengthDelimited
            && self.kind.is_packable()
            && (self.is_repeated() || self.is_callback())
    }

    fn validate_layout(&self, size: usize) -> Result<()> {
        let fail = |reason| Err(CodecError::invalid(self.name, reason));

        if self.is_callback() {
            if self.data_size != 2 {
                return fail("callback slot must be 2 bytes");
            }
            if self.oneof_group().is_some() {
                return fail("callback fields cannot be oneof members");
            }
            return check_range(self.name, self.data_offset, 2, size);
        }

        match self.kind {
            DataKind::Fixed(IntType {
                width: Width::W8 | Width::W16,
                ..
            }) => return fail("fixed kinds must be 32 or 64 bits"),
            DataKind::Float(Width::W8 | Width::W16) => {
                return fail("float kinds must be 32 or 64 bits")
            }
            DataKind::String if self.data_size == 0 => {
                return fail("string storage needs room for the terminator")
            }
            DataKind::Bytes if self.data_size < 4 => {
                return fail("bytes storage needs a length prefix")
            }
            DataKind::Submessage(nested) if self.data_size != nested.size => {
                return fail("submessage storage does not match nested size")
            }
            _ => {}
        }
        if let Some(width) = self.kind.scalar_width() {
            if self.data_size != width {
                return fail("storage size does not match kind");
            }
        }

        match self.multiplicity {
            Multiplicity::Repeated => {
                let Some(count_offset) = self.size_offset else {
                    return fail("repeated field needs a count offset");
                };
                if self.array_capacity == 0 {
                    return fail("repeated field needs a capacity");
                }
                let Some(array_len) = self.data_size.checked_mul(self.array_capacity) else {
                    return fail("array storage overflows");
                };
                check_range(self.name, self.data_offset, array_len, size)?;
                check_range(self.name, count_offset, 4, size)?;
            }
            Multiplicity::Oneof(_) => {
                let Some(which_offset) = self.size_offset else {
                    return fail("oneof member needs a which offset");
                };
                check_range(self.name, which_offset, 4, size)?;
                check_range(self.name, self.data_offset, self.data_size, size)?;
            }
            Multiplicity::Optional => {
                if let Some(has_offset) = self.size_offset {
                    check_range(self.name, has_offset, 1, size)?;
                }
                check_range(self.name, self.data_offset, self.data_size, size)?;
            }
            Multiplicity::Required => {
                check_range(self.name, self.data_offset, self.data_size, size)?;
            }
        }

        if self.packed && !(self.is_repeated() && self.kind.is_packable()) {
            return fail("only repeated scalar fields can be packed");
        }
        if let Some(default) = &self.default {
            if !default.fits(&self.kind, self.data_size) {
                return fail("default value does not fit the field");
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(CodecError::invalid(field, "storage outside message block")),
    }
}

/// Descriptor table of one message shape.
pub struct MessageDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Size of a message block in bytes.
    pub size: usize,
    sorted: bool,
}

impl MessageDescriptor {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor], size: usize) -> Self {
        let mut sorted = true;
        let mut i = 1;
        while i < fields.len() {
            if fields[i - 1].tag >= fields[i].tag {
                sorted = false;
            }
            i += 1;
        }
        Self {
            name,
            fields,
            size,
            sorted,
        }
    }

    /// Whether the table lists its fields in ascending tag order.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Look up a field by tag.
    pub fn field(&self, tag: u32) -> Option<&FieldDescriptor> {
        self.field_index(tag).and_then(|index| self.fields.get(index))
    }

    /// Table position of the field with `tag`.
    pub fn field_index(&self, tag: u32) -> Option<usize> {
        if self.sorted {
            self.fields.binary_search_by_key(&tag, |field| field.tag).ok()
        } else {
            self.fields.iter().position(|field| field.tag == tag)
        }
    }

    pub fn iter(&self) -> FieldIter<'_> {
        FieldIter::new(self)
    }

    pub fn required_count(&self) -> usize {
        self.fields.iter().filter(|field| field.is_required()).count()
    }

    /// Fields belonging to oneof `group`, in table order.
    pub fn oneof_members(&self, group: u8) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.fields
            .iter()
            .filter(move |field| field.oneof_group() == Some(group))
    }

    /// Check the table, and every table it nests, for consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_VALIDATE_DEPTH {
            return Err(CodecError::invalid(self.name, "descriptor nesting too deep"));
        }

        for (index, field) in self.fields.iter().enumerate() {
            if field.tag == 0 || field.tag > MAX_FIELD_NUMBER {
                return Err(CodecError::invalid(field.name, "tag out of range"));
            }
            if self.fields[..index].iter().any(|other| other.tag == field.tag) {
                return Err(CodecError::invalid(field.name, "duplicate tag"));
            }
            field.validate_layout(self.size)?;
            if let Some(group) = field.oneof_group() {
                if self
                    .oneof_members(group)
                    .any(|member| member.size_offset != field.size_offset)
                {
                    return Err(CodecError::invalid(
                        field.name,
                        "oneof members disagree on the which offset",
                    ));
                }
            }
        }

        if self.required_count() > MAX_REQUIRED_FIELDS {
            return Err(CodecError::invalid(self.name, "more than 64 required fields"));
        }

        for field in self.fields {
            if let (DataKind::Submessage(nested), Allocation::Static) = (field.kind, field.allocation) {
                nested.validate_at(depth + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INNER_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "id", DataKind::UINT32, 0, 4)];
    static INNER: MessageDescriptor = MessageDescriptor::new("Inner", &INNER_FIELDS, 4);

    static OUTER_FIELDS: [FieldDescriptor; 5] = [
        FieldDescriptor::new(1, "flag", DataKind::Bool, 0, 1).optional(1),
        FieldDescriptor::new(2, "name", DataKind::String, 4, 8).implicit(),
        FieldDescriptor::new(3, "inner", DataKind::Submessage(&INNER), 12, 4).optional(2),
        FieldDescriptor::new(4, "samples", DataKind::SINT32, 16, 4)
            .repeated(32, 4)
            .packed(),
        FieldDescriptor::new(5, "names", DataKind::String, 36, 2)
            .implicit()
            .callback(),
    ];
    static OUTER: MessageDescriptor = MessageDescriptor::new("Outer", &OUTER_FIELDS, 40);

    static UNSORTED_FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor::new(9, "late", DataKind::UINT32, 0, 4),
        FieldDescriptor::new(2, "early", DataKind::UINT32, 4, 4),
    ];
    static UNSORTED: MessageDescriptor = MessageDescriptor::new("Unsorted", &UNSORTED_FIELDS, 8);

    fn reason(desc: &MessageDescriptor) -> &'static str {
        match desc.validate() {
            Err(CodecError::InvalidDescriptor { reason, .. }) => reason,
            other => panic!("expected invalid descriptor, got {other:?}"),
        }
    }

    #[test]
    fn wire_types_follow_kinds() {
        assert_eq!(DataKind::INT32.wire_type(), WireType::Varint);
        assert_eq!(DataKind::SINT64.wire_type(), WireType::Varint);
        assert_eq!(DataKind::Enum.wire_type(), WireType::Varint);
        assert_eq!(DataKind::FIXED32.wire_type(), WireType::Fixed32);
        assert_eq!(DataKind::FLOAT.wire_type(), WireType::Fixed32);
        assert_eq!(DataKind::SFIXED64.wire_type(), WireType::Fixed64);
        assert_eq!(DataKind::DOUBLE.wire_type(), WireType::Fixed64);
        assert_eq!(DataKind::Bytes.wire_type(), WireType::LengthDelimited);
        assert_eq!(DataKind::Submessage(&INNER).wire_type(), WireType::LengthDelimited);
    }

    #[test]
    fn kind_names() {
        assert_eq!(DataKind::UINT64.name(), "uint64");
        assert_eq!(DataKind::SFIXED32.name(), "sfixed32");
        assert_eq!(DataKind::DOUBLE.name(), "double");
        assert_eq!(DataKind::Submessage(&INNER).name(), "message");
    }

    #[test]
    fn valid_table_passes() {
        OUTER.validate().unwrap();
        assert!(OUTER.is_sorted());
        assert_eq!(OUTER.required_count(), 0);
    }

    #[test]
    fn lookup_sorted_and_unsorted() {
        assert_eq!(OUTER.field(4).unwrap().name, "samples");
        assert!(OUTER.field(6).is_none());
        assert!(!UNSORTED.is_sorted());
        assert_eq!(UNSORTED.field_index(2), Some(1));
        assert_eq!(UNSORTED.field(9).unwrap().name, "late");
    }

    #[test]
    fn packed_numbers_accept_both_encodings() {
        let samples = OUTER.field(4).unwrap();
        assert!(samples.accepts(WireType::Varint));
        assert!(samples.accepts(WireType::LengthDelimited));
        assert!(!samples.accepts(WireType::Fixed32));

        let flag = OUTER.field(1).unwrap();
        assert!(!flag.accepts(WireType::LengthDelimited));
    }

    #[test]
    fn rejects_duplicate_tags() {
        static FIELDS: [FieldDescriptor; 2] = [
            FieldDescriptor::new(1, "a", DataKind::Bool, 0, 1),
            FieldDescriptor::new(1, "b", DataKind::Bool, 1, 1),
        ];
        static DESC: MessageDescriptor = MessageDescriptor::new("Dup", &FIELDS, 2);
        assert_eq!(reason(&DESC), "duplicate tag");
    }

    #[test]
    fn rejects_storage_past_block() {
        static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "a", DataKind::UINT64, 4, 8)];
        static DESC: MessageDescriptor = MessageDescriptor::new("Short", &FIELDS, 8);
        assert_eq!(reason(&DESC), "storage outside message block");
    }

    #[test]
    fn rejects_width_mismatch() {
        static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "a", DataKind::UINT32, 0, 8)];
        static DESC: MessageDescriptor = MessageDescriptor::new("Wide", &FIELDS, 8);
        assert_eq!(reason(&DESC), "storage size does not match kind");
    }

    #[test]
    fn rejects_packed_strings() {
        static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "a", DataKind::String, 4, 4)
            .repeated(0, 2)
            .packed()];
        static DESC: MessageDescriptor = MessageDescriptor::new("Packed", &FIELDS, 12);
        assert_eq!(reason(&DESC), "only repeated scalar fields can be packed");
    }

    #[test]
    fn rejects_split_oneof() {
        static FIELDS: [FieldDescriptor; 2] = [
            FieldDescriptor::new(1, "a", DataKind::UINT32, 4, 4).oneof(0, 0),
            FieldDescriptor::new(2, "b", DataKind::UINT32, 4, 4).oneof(0, 8),
        ];
        static DESC: MessageDescriptor = MessageDescriptor::new("Split", &FIELDS, 12);
        assert_eq!(reason(&DESC), "oneof members disagree on the which offset");
    }

    #[test]
    fn rejects_bad_nested_table() {
        static BAD_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(0, "zero", DataKind::Bool, 0, 1)];
        static BAD: MessageDescriptor = MessageDescriptor::new("Bad", &BAD_FIELDS, 1);
        static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "bad", DataKind::Submessage(&BAD), 0, 1)];
        static DESC: MessageDescriptor = MessageDescriptor::new("Holder", &FIELDS, 1);
        assert_eq!(reason(&DESC), "tag out of range");
    }

    #[test]
    fn rejects_mismatched_default() {
        static FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::new(1, "a", DataKind::String, 0, 4)
            .with_default(DefaultValue::Str("toolong"))];
        static DESC: MessageDescriptor = MessageDescriptor::new("Default", &FIELDS, 4);
        assert_eq!(reason(&DESC), "default value does not fit the field");
    }

    #[test]
    fn debug_output_is_shallow() {
        let rendered = format!("{OUTER:?}");
        assert!(rendered.contains("Outer"));
        assert!(!rendered.contains("Inner"));
    }
}
