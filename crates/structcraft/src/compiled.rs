//! Compiled record layout: resolved members, array length policies and merged scalar segments.

use std::{fmt, ops::Range, sync::Arc};

use crate::{
    byte_order::{ByteOrder, align_up},
    errors::{Error, ReadError},
    field::{Element, Field, LengthFn},
    scalar::ScalarKind,
    schema::Schema,
    value::Value,
};

/// Resolved member of a record: a concrete descriptor, or a placeholder awaiting a derived record.
#[derive(Debug, Clone)]
pub enum FieldSlot {
    Concrete(CompiledMember),
    Unresolved,
}

impl FieldSlot {
    pub fn is_padding(&self) -> bool {
        matches!(self, FieldSlot::Concrete(CompiledMember::Scalar(field)) if field.kind() == ScalarKind::Pad)
    }
}

#[derive(Debug, Clone)]
pub enum CompiledMember {
    Scalar(Field),
    Record(Arc<Schema>),
    Array(Arc<CompiledArray>),
}

impl CompiledMember {
    /// Byte size when it does not depend on runtime values.
    pub fn static_size(&self, order: ByteOrder) -> Option<usize> {
        match self {
            CompiledMember::Scalar(field) => Some(field.size(order)),
            CompiledMember::Record(schema) => schema.size(),
            CompiledMember::Array(array) => array.static_size(order),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledArray {
    pub name: String,
    pub element: Element,
    pub length: CompiledLength,
}

impl CompiledArray {
    pub fn static_size(&self, order: ByteOrder) -> Option<usize> {
        let CompiledLength::Fixed(count) = self.length else {
            return None;
        };

        match &self.element {
            Element::Scalar(field) => field.size(order).checked_mul(count),
            Element::Record(schema) => schema.size().and_then(|size| size.checked_mul(count)),
        }
    }

    /// Width of one element, if every element has the same static size.
    pub fn element_size(&self, order: ByteOrder) -> Option<usize> {
        match &self.element {
            Element::Scalar(field) => Some(field.size(order)),
            Element::Record(schema) => schema.size(),
        }
    }
}

/// Length policy with field references resolved to indices in the owning record.
#[derive(Clone)]
pub enum CompiledLength {
    Fixed(usize),
    Field { index: usize, name: String },
    Computed(LengthFn),
    Greedy,
}

impl fmt::Debug for CompiledLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledLength::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            CompiledLength::Field { index, name } => f
                .debug_struct("Field")
                .field("index", index)
                .field("name", name)
                .finish(),
            CompiledLength::Computed(_) => f.write_str("Computed"),
            CompiledLength::Greedy => f.write_str("Greedy"),
        }
    }
}

/// One scalar slot inside a [Segment].
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Slot indices from the owning record down to the scalar, one per nesting level.
    pub path: Vec<usize>,
    /// Dotted name, e.g. `northwest.x`.
    pub name: String,
    pub field: Field,
    pub offset: usize,
}

/// A run of consecutive fixed-size scalars sharing one byte order, encoded and decoded as a unit.
#[derive(Debug, Clone)]
pub struct Segment {
    pub byte_order: ByteOrder,
    /// Members of the owning record's field order covered by this segment.
    pub range: Range<usize>,
    pub leaves: Vec<Leaf>,
    pub size: usize,
}

impl Segment {
    pub fn new(byte_order: ByteOrder, start: usize) -> Self {
        Segment {
            byte_order,
            range: start..start,
            leaves: Vec::new(),
            size: 0,
        }
    }

    /// Appends a scalar, inserting alignment padding for [ByteOrder::Native].
    pub fn push(&mut self, path: Vec<usize>, name: String, field: Field) {
        let kind = field.kind();
        let offset = align_up(self.size, kind.align(self.byte_order));
        self.size = offset + kind.size(self.byte_order);
        self.leaves.push(Leaf {
            path,
            name,
            field,
            offset,
        });
    }

    /// Struct-module style format string, e.g. `<IHdd`.
    pub fn format(&self) -> String {
        let mut format = String::with_capacity(self.leaves.len() + 1);
        format.push(self.byte_order.code());
        for leaf in &self.leaves {
            format.push_str(&leaf.field.kind().format());
        }

        format
    }

    /// Encodes prepared `values` (one per leaf) into the first [Segment::size] bytes of `out`.
    pub fn encode(&self, values: &[Value], out: &mut [u8]) -> Result<(), Error> {
        out[..self.size].fill(0);

        for (leaf, value) in self.leaves.iter().zip(values) {
            let kind = leaf.field.kind();
            let end = leaf.offset + kind.size(self.byte_order);
            kind.encode(value, self.byte_order, &mut out[leaf.offset..end])
                .map_err(|source| Error::Encode {
                    field: leaf.name.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Decodes one raw value per leaf from the start of `data`.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<Value>, ReadError> {
        if data.len() < self.size {
            return Err(ReadError::PacketTooShort {
                needed: self.size,
                available: data.len(),
            });
        }

        Ok(self
            .leaves
            .iter()
            .map(|leaf| {
                let kind = leaf.field.kind();
                let end = leaf.offset + kind.size(self.byte_order);
                kind.decode(&data[leaf.offset..end], self.byte_order)
            })
            .collect())
    }
}

/// One instruction of a record's pack/unpack plan.
#[derive(Debug, Clone)]
pub enum Step {
    Segment(Segment),
    /// Member at this index packs and unpacks itself.
    Standalone(usize),
}
