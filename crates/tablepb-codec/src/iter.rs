//! Cursor over a descriptor table.

use std::ops::Range;

use crate::descriptor::{FieldDescriptor, MessageDescriptor, Multiplicity};

/// A table entry resolved against its position in the table.
///
/// The range helpers describe where the field lives inside a message block;
/// they never panic, and a range that does not fit the block is rejected
/// when it is used.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'d> {
    /// Position in the descriptor table.
    pub index: usize,
    pub field: &'d FieldDescriptor,
    /// Bit of this field in the required-field set, for required fields.
    pub required_index: Option<usize>,
}

impl FieldRef<'_> {
    /// Storage of a single value (element 0 for arrays).
    pub fn data(&self) -> Range<usize> {
        span(self.field.data_offset, self.field.data_size)
    }

    /// Storage of array element `index`.
    pub fn element(&self, index: usize) -> Range<usize> {
        let size = self.field.data_size;
        span(
            self.field
                .data_offset
                .saturating_add(index.saturating_mul(size)),
            size,
        )
    }

    /// Storage of the whole array of a repeated field.
    pub fn array(&self) -> Range<usize> {
        span(
            self.field.data_offset,
            self.field.data_size.saturating_mul(self.field.array_capacity),
        )
    }

    /// The has-flag (1 byte), element count or oneof `which` tag (4 bytes).
    pub fn size_slot(&self) -> Option<Range<usize>> {
        let offset = self.field.size_offset?;
        let len = match self.field.multiplicity {
            Multiplicity::Optional => 1,
            _ => 4,
        };
        Some(span(offset, len))
    }
}

fn span(start: usize, len: usize) -> Range<usize> {
    start..start.saturating_add(len)
}

/// Walks a descriptor table in order, or searches it by tag.
///
/// [`FieldIter::find`] starts at the current entry and wraps around, so a
/// message whose tags arrive in table order costs one step per field.
#[derive(Debug, Clone)]
pub struct FieldIter<'d> {
    desc: &'d MessageDescriptor,
    index: usize,
    required_before: usize,
}

impl<'d> FieldIter<'d> {
    pub fn new(desc: &'d MessageDescriptor) -> Self {
        Self {
            desc,
            index: 0,
            required_before: 0,
        }
    }

    pub fn descriptor(&self) -> &'d MessageDescriptor {
        self.desc
    }

    /// Return to the first entry.
    pub fn reset(&mut self) {
        self.index = 0;
        self.required_before = 0;
    }

    /// Find the entry with `tag`, leaving the cursor on it.
    pub fn find(&mut self, tag: u32) -> Option<FieldRef<'d>> {
        let fields = self.desc.fields;
        for _ in 0..fields.len() {
            if self.index >= fields.len() {
                self.reset();
            }
            let field = fields.get(self.index)?;
            if field.tag == tag {
                return Some(self.resolve(field));
            }
            self.step(field);
        }
        None
    }

    fn resolve(&self, field: &'d FieldDescriptor) -> FieldRef<'d> {
        FieldRef {
            index: self.index,
            field,
            required_index: field.is_required().then_some(self.required_before),
        }
    }

    fn step(&mut self, field: &FieldDescriptor) {
        if field.is_required() {
            self.required_before += 1;
        }
        self.index += 1;
    }
}

impl<'d> Iterator for FieldIter<'d> {
    type Item = FieldRef<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.desc.fields.get(self.index)?;
        let resolved = self.resolve(field);
        self.step(field);
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DataKind;

    static FIELDS: [FieldDescriptor; 4] = [
        FieldDescriptor::new(1, "a", DataKind::UINT32, 0, 4),
        FieldDescriptor::new(2, "b", DataKind::Bool, 4, 1).optional(5),
        FieldDescriptor::new(3, "c", DataKind::UINT32, 8, 4),
        FieldDescriptor::new(4, "d", DataKind::FIXED32, 12, 4).repeated(28, 4),
    ];
    static DESC: MessageDescriptor = MessageDescriptor::new("Iter", &FIELDS, 32);

    #[test]
    fn walks_in_table_order_with_required_indices() {
        let refs: Vec<FieldRef<'_>> = DESC.iter().collect();
        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0].required_index, Some(0));
        assert_eq!(refs[1].required_index, None);
        assert_eq!(refs[2].required_index, Some(1));
        assert_eq!(refs[3].index, 3);
    }

    #[test]
    fn find_wraps_around() {
        let mut iter = FieldIter::new(&DESC);
        assert_eq!(iter.find(3).unwrap().required_index, Some(1));
        assert_eq!(iter.find(3).unwrap().index, 2);

        let first = iter.find(1).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.required_index, Some(0));

        assert_eq!(iter.find(4).unwrap().index, 3);
        assert!(iter.find(99).is_none());
        assert_eq!(iter.find(2).unwrap().index, 1);
    }

    #[test]
    fn ranges_resolve_storage() {
        let mut iter = FieldIter::new(&DESC);
        let b = iter.find(2).unwrap();
        assert_eq!(b.data(), 4..5);
        assert_eq!(b.size_slot(), Some(5..6));

        let d = iter.find(4).unwrap();
        assert_eq!(d.element(2), 20..24);
        assert_eq!(d.array(), 12..28);
        assert_eq!(d.size_slot(), Some(28..32));

        let a = iter.find(1).unwrap();
        assert_eq!(a.size_slot(), None);
    }

    #[test]
    fn empty_table() {
        static EMPTY: MessageDescriptor = MessageDescriptor::new("Empty", &[], 0);
        let mut iter = EMPTY.iter();
        assert!(iter.find(1).is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn huge_offsets_saturate() {
        let field = FieldDescriptor::new(1, "x", DataKind::UINT64, usize::MAX - 2, 8)
            .repeated(0, usize::MAX);
        let fref = FieldRef {
            index: 0,
            field: &field,
            required_index: None,
        };
        assert_eq!(fref.data().end, usize::MAX);
        assert_eq!(fref.element(3).start, usize::MAX);
    }
}
