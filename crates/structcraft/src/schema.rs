//! Schema: compiled record type. Build one with [SchemaBuilder], then create [crate::record::Record]s from it.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::debug;

use crate::{
    byte_order::ByteOrder,
    compiled::{CompiledArray, CompiledLength, CompiledMember, FieldSlot, Segment, Step},
    errors::CompileError,
    field::{ArrayDef, Element, Field, FieldKind, Length},
    scalar::ScalarKind,
};

/// Names that collide with record methods.
const RESERVED_NAMES: &[&str] = &["size"];

/// Ordered registration of a record type's fields.
///
/// ```
/// use structcraft::field::Field;
/// use structcraft::schema::SchemaBuilder;
///
/// let point = SchemaBuilder::new("Point")
///     .scalar("x", Field::double())
///     .scalar("y", Field::double())
///     .compile()
///     .unwrap();
/// assert_eq!(point.size(), Some(16));
/// assert!(point.is_flat());
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    bases: Vec<Arc<Schema>>,
    field_order: Option<Vec<String>>,
    byte_order: Option<ByteOrder>,
    members: Vec<(String, FieldKind)>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaBuilder {
            name: name.into(),
            bases: Vec::new(),
            field_order: None,
            byte_order: None,
            members: Vec::new(),
        }
    }

    /// Derives from `base`: its field order, descriptors and byte order are inherited.
    pub fn extends(mut self, base: &Arc<Schema>) -> Self {
        self.bases.push(base.clone());
        self
    }

    /// Explicit field order. Only allowed on a root record; defaults to declaration order.
    pub fn field_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_order = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    pub fn member(mut self, name: impl Into<String>, kind: impl Into<FieldKind>) -> Self {
        self.members.push((name.into(), kind.into()));
        self
    }

    pub fn scalar(self, name: impl Into<String>, field: Field) -> Self {
        self.member(name, FieldKind::Scalar(field))
    }

    pub fn record(self, name: impl Into<String>, schema: &Arc<Schema>) -> Self {
        self.member(name, FieldKind::Record(schema.clone()))
    }

    pub fn array(self, name: impl Into<String>, array: ArrayDef) -> Self {
        self.member(name, FieldKind::Array(array))
    }

    /// Declares a field that a derived record must define before the type can be instantiated.
    pub fn placeholder(self, name: impl Into<String>) -> Self {
        self.member(name, FieldKind::Placeholder)
    }

    /// Validates the declaration and compiles it into an immutable [Schema].
    pub fn compile(self) -> Result<Arc<Schema>, CompileError> {
        Schema::compile(self).map(Arc::new)
    }
}

/// A compiled record type: field order, resolved descriptors and the pack/unpack plan.
///
/// Immutable once compiled and shared by every record of the type.
pub struct Schema {
    name: String,
    base: Option<Arc<Schema>>,
    byte_order: ByteOrder,
    field_order: Vec<String>,
    index: HashMap<String, usize>,
    slots: Vec<FieldSlot>,
    /// Positions of the members that hold values; padding is left out.
    valued: Vec<usize>,
    keys: Vec<String>,
    plan: Vec<Step>,
    partial: bool,
    size: Option<usize>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("byte_order", &self.byte_order)
            .field("field_order", &self.field_order)
            .field("partial", &self.partial)
            .field("size", &self.size)
            .finish()
    }
}

impl Schema {
    fn compile(builder: SchemaBuilder) -> Result<Self, CompileError> {
        let SchemaBuilder {
            name,
            mut bases,
            field_order,
            byte_order,
            members,
        } = builder;

        if bases.len() > 1 {
            return Err(CompileError::MultipleBases { record: name });
        }
        let base = bases.pop();

        let mut own: HashMap<String, FieldKind> = HashMap::with_capacity(members.len());
        let mut declared = Vec::with_capacity(members.len());
        for (field, kind) in members {
            validate_name(&field)?;
            if own.contains_key(&field) {
                return Err(CompileError::DuplicateField {
                    record: name,
                    field,
                });
            }
            declared.push(field.clone());
            own.insert(field, kind);
        }

        let order = match (&base, field_order) {
            (Some(_), Some(_)) => return Err(CompileError::FieldOrderRedeclared { record: name }),
            (Some(base), None) => base.field_order.clone(),
            (None, Some(order)) => {
                for field in &order {
                    validate_name(field)?;
                }
                order
            }
            (None, None) => declared.clone(),
        };

        let mut index = HashMap::with_capacity(order.len());
        for (i, field) in order.iter().enumerate() {
            if index.insert(field.clone(), i).is_some() {
                return Err(CompileError::DuplicateField {
                    record: name,
                    field: field.clone(),
                });
            }
        }

        if let Some(field) = declared.iter().find(|f| !index.contains_key(*f)) {
            return Err(CompileError::NotInFieldOrder {
                record: name,
                field: field.clone(),
            });
        }

        let byte_order = byte_order
            .or(base.as_ref().map(|b| b.byte_order))
            .unwrap_or_default();

        let mut slots = Vec::with_capacity(order.len());
        for (position, field) in order.iter().enumerate() {
            let slot = match own.remove(field) {
                Some(kind) => compile_member(&name, field, position, kind, &index)?,
                None => match &base {
                    Some(base) => base.slots[position].clone(),
                    None => {
                        return Err(CompileError::UndefinedField {
                            record: name,
                            field: field.clone(),
                        });
                    }
                },
            };
            slots.push(slot);
        }

        let partial = slots.iter().any(|slot| match slot {
            FieldSlot::Unresolved => true,
            FieldSlot::Concrete(CompiledMember::Record(schema)) => schema.partial,
            FieldSlot::Concrete(CompiledMember::Array(array)) => {
                matches!(&array.element, Element::Record(schema) if schema.partial)
            }
            FieldSlot::Concrete(CompiledMember::Scalar(_)) => false,
        });

        let (plan, size) = if partial {
            (Vec::new(), None)
        } else {
            let plan = partition(&order, &slots, byte_order);
            let size = static_size(&name, &plan, &slots, byte_order)?;
            (plan, size)
        };

        let valued: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_padding())
            .map(|(i, _)| i)
            .collect();
        let keys = valued.iter().map(|&i| order[i].clone()).collect();

        let schema = Schema {
            name,
            base,
            byte_order,
            field_order: order,
            index,
            slots,
            valued,
            keys,
            plan,
            partial,
            size,
        };

        debug!(
            record = %schema.name,
            fields = schema.field_order.len(),
            steps = schema.plan.len(),
            flat = schema.is_flat(),
            partial = schema.partial,
            "compiled record schema"
        );

        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<Schema>> {
        self.base.as_ref()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn field_order(&self) -> &[String] {
        &self.field_order
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Names of the fields that hold values, in field order. Padding fields take up bytes on the
    /// wire but are not listed.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Positions in field order of the fields listed by [Schema::keys].
    pub fn valued(&self) -> &[usize] {
        &self.valued
    }

    pub fn len(&self) -> usize {
        self.field_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_order.is_empty()
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&FieldSlot> {
        self.slots.get(index)
    }

    /// True while any field is still a placeholder. Partial types cannot be instantiated.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Names of the fields that are still placeholders, including inside nested records.
    pub fn unresolved_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for (name, slot) in self.field_order.iter().zip(&self.slots) {
            let nested = match slot {
                FieldSlot::Unresolved => {
                    fields.push(name.clone());
                    continue;
                }
                FieldSlot::Concrete(CompiledMember::Record(schema)) => schema,
                FieldSlot::Concrete(CompiledMember::Array(array)) => match &array.element {
                    Element::Record(schema) => schema,
                    Element::Scalar(_) => continue,
                },
                FieldSlot::Concrete(CompiledMember::Scalar(_)) => continue,
            };
            fields.extend(
                nested
                    .unresolved_fields()
                    .into_iter()
                    .map(|inner| format!("{name}.{inner}")),
            );
        }

        fields
    }

    pub fn plan(&self) -> &[Step] {
        &self.plan
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.plan.iter().filter_map(|step| match step {
            Step::Segment(segment) => Some(segment),
            Step::Standalone(_) => None,
        })
    }

    /// A flat record compiles to exactly one segment and can be merged into a parent's segment.
    pub fn is_flat(&self) -> bool {
        matches!(self.plan.as_slice(), [Step::Segment(_)])
    }

    /// Encoded size in bytes, when it does not depend on runtime values.
    pub fn size(&self) -> Option<usize> {
        self.size
    }
}

fn validate_name(name: &str) -> Result<(), CompileError> {
    if RESERVED_NAMES.contains(&name) {
        return Err(CompileError::ReservedName(name.to_string()));
    }
    if name.is_empty() || name.contains('.') {
        return Err(CompileError::InvalidFieldName(name.to_string()));
    }

    Ok(())
}

fn check_scalar(name: &str, field: &Field) -> Result<(), CompileError> {
    if field.kind() == ScalarKind::Bytes(0) {
        return Err(CompileError::InvalidStringLength);
    }
    if field.is_static() && field.is_generated() {
        return Err(CompileError::ConflictingField {
            field: name.to_string(),
        });
    }

    Ok(())
}

fn compile_member(
    record: &str,
    name: &str,
    position: usize,
    kind: FieldKind,
    index: &HashMap<String, usize>,
) -> Result<FieldSlot, CompileError> {
    let member = match kind {
        FieldKind::Placeholder => return Ok(FieldSlot::Unresolved),
        FieldKind::Scalar(field) => {
            check_scalar(name, &field)?;
            CompiledMember::Scalar(field)
        }
        FieldKind::Record(schema) => CompiledMember::Record(schema),
        FieldKind::Array(ArrayDef { element, length }) => {
            match &element {
                Element::Scalar(field) => {
                    check_scalar(name, field)?;
                    if field.is_generated() {
                        return Err(CompileError::GeneratedArrayElement {
                            array: name.to_string(),
                        });
                    }
                }
                Element::Record(schema) if schema.size() == Some(0) => {
                    return Err(CompileError::EmptyElement {
                        array: name.to_string(),
                    });
                }
                Element::Record(_) => {}
            }

            let earlier = |field: &str| -> Result<usize, CompileError> {
                match index.get(field) {
                    Some(&i) if i < position => Ok(i),
                    Some(_) => Err(CompileError::ForwardReference {
                        array: name.to_string(),
                        field: field.to_string(),
                    }),
                    None => Err(CompileError::UndefinedField {
                        record: record.to_string(),
                        field: field.to_string(),
                    }),
                }
            };

            let length = match length {
                Length::Fixed(n) => CompiledLength::Fixed(n),
                Length::Greedy => CompiledLength::Greedy,
                Length::Field(field) => CompiledLength::Field {
                    index: earlier(&field)?,
                    name: field,
                },
                Length::Computed { fields, func } => {
                    for field in &fields {
                        earlier(field)?;
                    }
                    CompiledLength::Computed(func)
                }
            };

            let array = CompiledArray {
                name: name.to_string(),
                element,
                length,
            };
            if let CompiledLength::Fixed(count) = array.length
                && let Some(size) = array.element_size(ByteOrder::Native)
                && size.checked_mul(count).is_none()
            {
                return Err(CompileError::SizeOverflow {
                    record: record.to_string(),
                });
            }

            CompiledMember::Array(Arc::new(array))
        }
    };

    Ok(FieldSlot::Concrete(member))
}

/// Splits the field order into merged scalar segments and standalone members.
fn partition(order: &[String], slots: &[FieldSlot], byte_order: ByteOrder) -> Vec<Step> {
    let mut plan = Vec::new();
    let mut pending: Option<Segment> = None;

    for (i, (name, slot)) in order.iter().zip(slots).enumerate() {
        match slot {
            FieldSlot::Concrete(CompiledMember::Scalar(field)) => {
                let segment = pending.get_or_insert_with(|| Segment::new(byte_order, i));
                segment.push(vec![i], name.clone(), field.clone());
                segment.range.end = i + 1;
            }
            FieldSlot::Concrete(CompiledMember::Record(schema))
                if schema.byte_order == byte_order && schema.is_flat() =>
            {
                let segment = pending.get_or_insert_with(|| Segment::new(byte_order, i));
                for inner in schema.segments() {
                    for leaf in &inner.leaves {
                        let mut path = Vec::with_capacity(leaf.path.len() + 1);
                        path.push(i);
                        path.extend_from_slice(&leaf.path);
                        segment.push(path, format!("{name}.{}", leaf.name), leaf.field.clone());
                    }
                }
                segment.range.end = i + 1;
            }
            _ => {
                if let Some(segment) = pending.take() {
                    plan.push(Step::Segment(segment));
                }
                plan.push(Step::Standalone(i));
            }
        }
    }

    if let Some(segment) = pending.take() {
        plan.push(Step::Segment(segment));
    }

    plan
}

/// Total static size, `None` when any member is sized at runtime.
fn static_size(
    record: &str,
    plan: &[Step],
    slots: &[FieldSlot],
    byte_order: ByteOrder,
) -> Result<Option<usize>, CompileError> {
    let mut total: usize = 0;
    for step in plan {
        let size = match step {
            Step::Segment(segment) => segment.size,
            Step::Standalone(i) => match slots[*i] {
                FieldSlot::Concrete(ref member) => match member.static_size(byte_order) {
                    Some(size) => size,
                    None => return Ok(None),
                },
                FieldSlot::Unresolved => return Ok(None),
            },
        };
        total = total
            .checked_add(size)
            .ok_or_else(|| CompileError::SizeOverflow {
                record: record.to_string(),
            })?;
    }

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Arc<Schema> {
        SchemaBuilder::new("Point")
            .scalar("x", Field::double())
            .scalar("y", Field::double())
            .compile()
            .unwrap()
    }

    fn formats(schema: &Schema) -> Vec<String> {
        schema.segments().map(Segment::format).collect()
    }

    #[test]
    fn test_compile_flat_record() {
        let schema = point();
        assert_eq!(schema.field_order(), ["x", "y"]);
        assert_eq!(schema.size(), Some(16));
        assert!(schema.is_flat());
        assert_eq!(formats(&schema), vec!["@dd"]);
    }

    #[test]
    fn test_nested_flat_records_merge() {
        let point = point();
        let bbox = SchemaBuilder::new("BoundingBox")
            .record("northwest", &point)
            .record("southeast", &point)
            .compile()
            .unwrap();

        assert!(bbox.is_flat());
        assert_eq!(bbox.size(), Some(32));
        assert_eq!(formats(&bbox), vec!["@dddd"]);

        let segment = bbox.segments().next().unwrap();
        assert_eq!(segment.range, 0..2);
        let names: Vec<&str> = segment.leaves.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["northwest.x", "northwest.y", "southeast.x", "southeast.y"]);
        assert_eq!(segment.leaves[2].path, vec![1, 0]);
    }

    #[test]
    fn test_byte_order_mismatch_is_standalone() {
        let big_point = SchemaBuilder::new("BigPoint")
            .byte_order(ByteOrder::Big)
            .scalar("x", Field::double())
            .scalar("y", Field::double())
            .compile()
            .unwrap();
        let schema = SchemaBuilder::new("Tagged")
            .byte_order(ByteOrder::Little)
            .scalar("tag", Field::ushort())
            .record("point", &big_point)
            .scalar("flags", Field::uchar())
            .compile()
            .unwrap();

        assert!(!schema.is_flat());
        assert!(matches!(
            schema.plan(),
            [Step::Segment(_), Step::Standalone(1), Step::Segment(_)]
        ));
        assert_eq!(formats(&schema), vec!["<H", "<B"]);
        assert_eq!(schema.size(), Some(19));
    }

    #[test]
    fn test_arrays_split_segments() {
        let schema = SchemaBuilder::new("Path")
            .byte_order(ByteOrder::Little)
            .scalar("count", Field::uint())
            .array("points", ArrayDef::of_records(&point(), Length::field("count")))
            .compile()
            .unwrap();

        assert!(matches!(schema.plan(), [Step::Segment(_), Step::Standalone(1)]));
        assert_eq!(schema.size(), None);

        let fixed = SchemaBuilder::new("Fixed")
            .byte_order(ByteOrder::Little)
            .scalar("count", Field::uint())
            .array("values", ArrayDef::of_scalars(Field::double(), Length::fixed(6)))
            .compile()
            .unwrap();
        assert_eq!(fixed.size(), Some(52));
    }

    #[test]
    fn test_explicit_field_order() {
        let schema = SchemaBuilder::new("Ordered")
            .field_order(["b", "a"])
            .scalar("a", Field::int())
            .scalar("b", Field::short())
            .byte_order(ByteOrder::Big)
            .compile()
            .unwrap();
        assert_eq!(schema.field_order(), ["b", "a"]);
        assert_eq!(formats(&schema), vec![">hi"]);
    }

    #[test]
    fn test_field_order_errors() {
        let err = SchemaBuilder::new("R")
            .field_order(["a", "b"])
            .scalar("a", Field::int())
            .compile()
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::UndefinedField {
                record: "R".into(),
                field: "b".into()
            }
        );

        let err = SchemaBuilder::new("R")
            .field_order(["a"])
            .scalar("a", Field::int())
            .scalar("b", Field::int())
            .compile()
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::NotInFieldOrder {
                record: "R".into(),
                field: "b".into()
            }
        );
    }

    #[test]
    fn test_name_errors() {
        assert_eq!(
            SchemaBuilder::new("R")
                .scalar("size", Field::int())
                .compile()
                .unwrap_err(),
            CompileError::ReservedName("size".into())
        );
        assert_eq!(
            SchemaBuilder::new("R")
                .scalar("a.b", Field::int())
                .compile()
                .unwrap_err(),
            CompileError::InvalidFieldName("a.b".into())
        );
        assert!(matches!(
            SchemaBuilder::new("R")
                .scalar("a", Field::int())
                .scalar("a", Field::int())
                .compile(),
            Err(CompileError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_field_errors() {
        assert_eq!(
            SchemaBuilder::new("R")
                .scalar("s", Field::string(0))
                .compile()
                .unwrap_err(),
            CompileError::InvalidStringLength
        );
        assert!(matches!(
            SchemaBuilder::new("R")
                .scalar("s", Field::int().fixed(1).generator(|_| 1.into()))
                .compile(),
            Err(CompileError::ConflictingField { .. })
        ));
        assert!(matches!(
            SchemaBuilder::new("R")
                .array(
                    "a",
                    ArrayDef::of_scalars(Field::int().generator(|_| 1.into()), Length::fixed(2))
                )
                .compile(),
            Err(CompileError::GeneratedArrayElement { .. })
        ));
    }

    #[test]
    fn test_array_size_errors() {
        assert_eq!(
            SchemaBuilder::new("Huge")
                .array("a", ArrayDef::of_scalars(Field::int(), Length::fixed(usize::MAX)))
                .compile()
                .unwrap_err(),
            CompileError::SizeOverflow {
                record: "Huge".into()
            }
        );
        assert_eq!(
            SchemaBuilder::new("Huge")
                .scalar("tag", Field::uchar())
                .array("a", ArrayDef::of_scalars(Field::uchar(), Length::fixed(usize::MAX)))
                .compile()
                .unwrap_err(),
            CompileError::SizeOverflow {
                record: "Huge".into()
            }
        );

        let empty = SchemaBuilder::new("Empty").compile().unwrap();
        assert_eq!(
            SchemaBuilder::new("R")
                .scalar("count", Field::uint())
                .array("items", ArrayDef::of_records(&empty, Length::field("count")))
                .compile()
                .unwrap_err(),
            CompileError::EmptyElement {
                array: "items".into()
            }
        );
    }

    #[test]
    fn test_forward_reference() {
        let err = SchemaBuilder::new("R")
            .array("values", ArrayDef::of_scalars(Field::int(), Length::field("count")))
            .scalar("count", Field::uint())
            .compile()
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::ForwardReference {
                array: "values".into(),
                field: "count".into()
            }
        );

        let err = SchemaBuilder::new("R")
            .scalar("count", Field::uint())
            .array(
                "values",
                ArrayDef::of_scalars(Field::int(), Length::computed(["values"], |_| Ok(0))),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, CompileError::ForwardReference { .. }));
    }

    #[test]
    fn test_inheritance() {
        let base = SchemaBuilder::new("Message")
            .byte_order(ByteOrder::Little)
            .scalar("id", Field::ushort())
            .placeholder("payload")
            .compile()
            .unwrap();
        assert!(base.is_partial());
        assert_eq!(base.unresolved_fields(), vec!["payload".to_string()]);
        assert!(base.plan().is_empty());

        let derived = SchemaBuilder::new("Ping")
            .extends(&base)
            .scalar("payload", Field::uint())
            .compile()
            .unwrap();
        assert!(!derived.is_partial());
        assert_eq!(derived.byte_order(), ByteOrder::Little);
        assert_eq!(derived.field_order(), ["id", "payload"]);
        assert_eq!(formats(&derived), vec!["<HI"]);
        assert!(Arc::ptr_eq(derived.base().unwrap(), &base));

        let still_partial = SchemaBuilder::new("Empty").extends(&base).compile().unwrap();
        assert!(still_partial.is_partial());
    }

    #[test]
    fn test_inheritance_errors() {
        let base = point();

        assert_eq!(
            SchemaBuilder::new("D")
                .extends(&base)
                .field_order(["x", "y"])
                .compile()
                .unwrap_err(),
            CompileError::FieldOrderRedeclared { record: "D".into() }
        );
        assert_eq!(
            SchemaBuilder::new("D")
                .extends(&base)
                .scalar("z", Field::double())
                .compile()
                .unwrap_err(),
            CompileError::NotInFieldOrder {
                record: "D".into(),
                field: "z".into()
            }
        );
        assert_eq!(
            SchemaBuilder::new("D")
                .extends(&base)
                .extends(&base)
                .compile()
                .unwrap_err(),
            CompileError::MultipleBases { record: "D".into() }
        );
    }

    #[test]
    fn test_nested_partial_propagates() {
        let partial = SchemaBuilder::new("Inner")
            .placeholder("value")
            .compile()
            .unwrap();
        let outer = SchemaBuilder::new("Outer")
            .record("inner", &partial)
            .compile()
            .unwrap();
        assert!(outer.is_partial());
        assert_eq!(outer.unresolved_fields(), vec!["inner.value".to_string()]);
    }
}
