//! Record: runtime value container bound to a compiled [Schema].

use std::{
    fmt,
    ops::RangeBounds,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::trace;

use crate::{
    array::{Array, clamp, type_label},
    compiled::{CompiledMember, FieldSlot, Step},
    errors::Error,
    field::Field,
    schema::Schema,
    value::Value,
};

#[derive(Debug, Clone)]
enum Slot {
    Scalar(Value),
    Record(Record),
    Array(Array),
}

/// An instance of a record type.
///
/// `Record` is a handle: clones share the same values. Assigning a record into a nested-record
/// field of another record shares it too, so changes made through either are visible through both
/// until a different record is assigned to that field.
///
/// ```
/// use structcraft::field::Field;
/// use structcraft::record::Record;
/// use structcraft::schema::SchemaBuilder;
///
/// let point = SchemaBuilder::new("Point")
///     .scalar("x", Field::double())
///     .scalar("y", Field::double())
///     .compile()
///     .unwrap();
///
/// let p = Record::from_values(&point, vec![5000.0.into(), 300.5.into()]).unwrap();
/// let copy = Record::from_bytes(&point, &p.pack().unwrap()).unwrap();
/// assert_eq!(copy.get("y").unwrap().as_f64(), Some(300.5));
/// ```
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.schema.name());
        for (name, value) in self.items() {
            s.field(&name, &value);
        }
        s.finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && (Arc::ptr_eq(&self.slots, &other.slots) || self.values() == other.values())
    }
}

impl Record {
    /// Record holding every field's default. Fails for partial record types.
    pub fn new(schema: &Arc<Schema>) -> Result<Self, Error> {
        let partial = || Error::Partial {
            record: schema.name().to_string(),
            fields: schema.unresolved_fields(),
        };
        if schema.is_partial() {
            return Err(partial());
        }

        let slots = schema
            .slots()
            .iter()
            .map(|slot| match slot {
                FieldSlot::Concrete(CompiledMember::Scalar(field)) => Ok(Slot::Scalar(field.initial())),
                FieldSlot::Concrete(CompiledMember::Record(nested)) => {
                    Record::new(nested).map(Slot::Record)
                }
                FieldSlot::Concrete(CompiledMember::Array(array)) => {
                    Ok(Slot::Array(Array::new(array.clone(), schema.byte_order())))
                }
                FieldSlot::Unresolved => Err(partial()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Record {
            schema: schema.clone(),
            slots: Arc::new(Mutex::new(slots)),
        })
    }

    /// Fills fields by position in field order.
    pub fn from_values(schema: &Arc<Schema>, values: Vec<Value>) -> Result<Self, Error> {
        Self::from_args(schema, values, Vec::new())
    }

    /// Fills fields by name. Names may be dotted paths into nested records.
    pub fn from_map(schema: &Arc<Schema>, named: Vec<(String, Value)>) -> Result<Self, Error> {
        Self::from_args(schema, Vec::new(), named)
    }

    /// Fills positional values first, then named ones; a named value wins over a positional one.
    pub fn from_args(
        schema: &Arc<Schema>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Self, Error> {
        let record = Self::new(schema)?;

        if positional.len() > record.len() {
            return Err(Error::TooManyValues {
                given: positional.len(),
                expected: record.len(),
            });
        }

        for (index, value) in positional.into_iter().enumerate() {
            record.set_index(index, value)?;
        }
        for (name, value) in named {
            record.set(&name, value)?;
        }

        Ok(record)
    }

    /// Decodes a record from the start of `data`.
    pub fn from_bytes(schema: &Arc<Schema>, data: &[u8]) -> Result<Self, Error> {
        let record = Self::new(schema)?;
        record.unpack(data)?;
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, index: usize) -> Option<Slot> {
        self.lock().get(index).cloned()
    }

    fn replace(&self, index: usize, slot: Slot) {
        if let Some(current) = self.lock().get_mut(index) {
            *current = slot;
        }
    }

    fn position(&self, name: &str) -> Result<usize, Error> {
        self.schema.index_of(name).ok_or_else(|| Error::UnknownField {
            record: self.schema.name().to_string(),
            field: name.to_string(),
        })
    }

    fn member(&self, index: usize) -> Result<&CompiledMember, Error> {
        match self.schema.slot(index) {
            Some(FieldSlot::Concrete(member)) => Ok(member),
            Some(FieldSlot::Unresolved) => Err(Error::Partial {
                record: self.schema.name().to_string(),
                fields: self.schema.unresolved_fields(),
            }),
            None => Err(Error::Index {
                index,
                len: self.schema.len(),
            }),
        }
    }

    /// Number of fields holding values; padding is not counted.
    pub fn len(&self) -> usize {
        self.schema.valued().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position in field order of the `index`-th value field.
    fn valued(&self, index: usize) -> Result<usize, Error> {
        self.schema
            .valued()
            .get(index)
            .copied()
            .ok_or(Error::Index {
                index,
                len: self.len(),
            })
    }

    /// Current value at `index`; generated fields are computed on every read.
    fn value_at(&self, index: usize) -> Value {
        match self.slot(index) {
            Some(Slot::Scalar(stored)) => match self.schema.slot(index) {
                Some(FieldSlot::Concrete(CompiledMember::Scalar(field))) => field.get(&stored, self),
                _ => stored,
            },
            Some(Slot::Record(record)) => Value::Record(record),
            Some(Slot::Array(array)) => Value::Array(array),
            None => Value::None,
        }
    }

    /// Value as stored, without running a generator.
    pub(crate) fn stored(&self, index: usize) -> Value {
        match self.slot(index) {
            Some(Slot::Scalar(stored)) => stored,
            Some(Slot::Record(record)) => Value::Record(record),
            Some(Slot::Array(array)) => Value::Array(array),
            None => Value::None,
        }
    }

    /// Reads a field by name or dotted path (`"northwest.x"`).
    ///
    /// Nested records and arrays are returned as handles sharing this record's storage.
    pub fn get(&self, path: &str) -> Result<Value, Error> {
        match path.split_once('.') {
            Some((head, rest)) => self.record(head)?.get(rest),
            None => self.position(path).map(|index| self.value_at(index)),
        }
    }

    /// Writes a field by name or dotted path.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<(), Error> {
        match path.split_once('.') {
            Some((head, rest)) => self.record(head)?.set(rest, value),
            None => self.write(self.position(path)?, value.into()),
        }
    }

    /// Reads the `index`-th field in field order, skipping padding.
    pub fn get_index(&self, index: usize) -> Result<Value, Error> {
        self.valued(index).map(|position| self.value_at(position))
    }

    /// Writes the `index`-th field in field order, skipping padding.
    ///
    /// Nested-record fields take a record of exactly the declared type (shared, not copied) or
    /// [Value::None] for a fresh default record. Array fields take a [Value::List] of elements, an
    /// [Value::Array] to share, or [Value::None] to empty them.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Result<(), Error> {
        self.write(self.valued(index)?, value.into())
    }

    fn write(&self, index: usize, value: Value) -> Result<(), Error> {
        let member = self.member(index)?;
        let name = &self.schema.field_order()[index];

        let slot = match member {
            CompiledMember::Scalar(field) => Slot::Scalar(field.set(name, value)?),
            CompiledMember::Record(schema) => match value {
                Value::Record(record) if Arc::ptr_eq(record.schema(), schema) => Slot::Record(record),
                Value::None => Slot::Record(Record::new(schema)?),
                other => {
                    return Err(Error::TypeMismatch {
                        field: name.clone(),
                        expected: schema.name().to_string(),
                        given: type_label(&other),
                    });
                }
            },
            CompiledMember::Array(def) => {
                let order = self.schema.byte_order();
                match value {
                    Value::Array(array) if Array::new(def.clone(), order).accepts(&array) => {
                        Slot::Array(array.rebind(def.clone(), order))
                    }
                    Value::List(items) => {
                        let array = Array::new(def.clone(), order);
                        array.extend(items)?;
                        Slot::Array(array)
                    }
                    Value::None => Slot::Array(Array::new(def.clone(), order)),
                    other => {
                        return Err(Error::TypeMismatch {
                            field: name.clone(),
                            expected: "array".to_string(),
                            given: type_label(&other),
                        });
                    }
                }
            }
        };

        self.replace(index, slot);
        Ok(())
    }

    /// Values of the fields in `range`, indexed like [Record::get_index].
    pub fn get_slice(&self, range: impl RangeBounds<usize>) -> Vec<Value> {
        let valued = self.schema.valued();
        clamp(range, valued.len())
            .map(|index| self.value_at(valued[index]))
            .collect()
    }

    /// Writes `values` to the fields in `range`; both must have the same length.
    pub fn set_slice(&self, range: impl RangeBounds<usize>, values: Vec<Value>) -> Result<(), Error> {
        let range = clamp(range, self.len());
        if range.len() != values.len() {
            return Err(Error::LengthMismatch {
                expected: range.len(),
                given: values.len(),
            });
        }

        for (index, value) in range.zip(values) {
            self.set_index(index, value)?;
        }

        Ok(())
    }

    /// Nested record at `path`.
    pub fn record(&self, path: &str) -> Result<Record, Error> {
        match self.get(path)? {
            Value::Record(record) => Ok(record),
            _ => Err(Error::NotARecord {
                path: path.to_string(),
            }),
        }
    }

    /// Array field at `path`.
    pub fn array(&self, path: &str) -> Result<Array, Error> {
        match self.get(path)? {
            Value::Array(array) => Ok(array),
            _ => Err(Error::NotAnArray {
                path: path.to_string(),
            }),
        }
    }

    /// Field names in field order, without padding.
    pub fn keys(&self) -> &[String] {
        self.schema.keys()
    }

    pub fn values(&self) -> Vec<Value> {
        self.schema
            .valued()
            .iter()
            .map(|&index| self.value_at(index))
            .collect()
    }

    pub fn items(&self) -> Vec<(String, Value)> {
        self.keys().iter().cloned().zip(self.values()).collect()
    }

    /// Sets several fields at once.
    ///
    /// `args` holds at most one value: a [Value::Map], or a [Value::List] of `[name, value]` pairs.
    /// `overrides` are applied last and win over `args`.
    pub fn update(&self, args: Vec<Value>, overrides: Vec<(String, Value)>) -> Result<(), Error> {
        if args.len() > 1 {
            return Err(Error::UpdateArgument(format!(
                "update expected at most 1 arguments, got {}",
                args.len()
            )));
        }

        let mut pairs = match args.into_iter().next() {
            None => Vec::new(),
            Some(Value::Map(named)) => named,
            Some(Value::List(items)) => items
                .into_iter()
                .map(update_pair)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(Error::UpdateArgument(format!(
                    "parameter type '{}' not supported by update",
                    other.type_name()
                )));
            }
        };
        pairs.extend(overrides);

        for (name, value) in pairs {
            self.set(&name, value)?;
        }

        Ok(())
    }

    /// Encoded size in bytes for the current values.
    pub fn size(&self) -> usize {
        if let Some(size) = self.schema.size() {
            return size;
        }

        self.schema
            .plan()
            .iter()
            .map(|step| match step {
                Step::Segment(segment) => segment.size,
                Step::Standalone(index) => match self.slot(*index) {
                    Some(Slot::Record(record)) => record.size(),
                    Some(Slot::Array(array)) => array.size(),
                    _ => 0,
                },
            })
            .sum()
    }

    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(self.size());
        self.pack_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoding of this record to `out`.
    pub fn pack_into(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let start = out.len();

        for step in self.schema.plan() {
            match step {
                Step::Segment(segment) => {
                    let values = segment
                        .leaves
                        .iter()
                        .map(|leaf| leaf.field.prep(&leaf.name, self.leaf_value(&leaf.path)))
                        .collect::<Result<Vec<_>, _>>()?;

                    let offset = out.len();
                    out.resize(offset + segment.size, 0);
                    segment.encode(&values, &mut out[offset..])?;
                }
                Step::Standalone(index) => match self.slot(*index) {
                    Some(Slot::Record(record)) => record.pack_into(out)?,
                    Some(Slot::Array(array)) => array.pack_into(out)?,
                    _ => {}
                },
            }
        }

        trace!(record = %self.schema.name(), bytes = out.len() - start, "packed record");
        Ok(())
    }

    /// Decodes from the start of `data`. Trailing bytes are ignored.
    pub fn unpack(&self, data: &[u8]) -> Result<(), Error> {
        self.unpack_from(data).map(|_| ())
    }

    /// Decodes from the start of `data` and returns the number of bytes consumed.
    pub fn unpack_from(&self, data: &[u8]) -> Result<usize, Error> {
        let mut offset = 0;

        for step in self.schema.plan() {
            match step {
                Step::Segment(segment) => {
                    let raw = segment.decode(&data[offset..])?;
                    for (leaf, value) in segment.leaves.iter().zip(raw) {
                        self.store_leaf(&leaf.path, &leaf.name, value, &leaf.field)?;
                    }
                    offset += segment.size;
                }
                Step::Standalone(index) => match self.slot(*index) {
                    Some(Slot::Record(record)) => offset += record.unpack_from(&data[offset..])?,
                    Some(Slot::Array(array)) => offset += array.unpack_from(&data[offset..], self)?,
                    _ => {}
                },
            }
        }

        trace!(record = %self.schema.name(), bytes = offset, "unpacked record");
        Ok(offset)
    }

    /// Current value of the scalar at `path`, following nested records.
    fn leaf_value(&self, path: &[usize]) -> Value {
        match path {
            [index] => self.value_at(*index),
            [index, rest @ ..] => match self.slot(*index) {
                Some(Slot::Record(record)) => record.leaf_value(rest),
                _ => Value::None,
            },
            [] => Value::None,
        }
    }

    fn store_leaf(&self, path: &[usize], name: &str, raw: Value, field: &Field) -> Result<(), Error> {
        match path {
            [index] => {
                if let Some(value) = field.unprep(name, raw)? {
                    self.replace(*index, Slot::Scalar(value));
                }
                Ok(())
            }
            [index, rest @ ..] => match self.slot(*index) {
                Some(Slot::Record(record)) => record.store_leaf(rest, name, raw, field),
                _ => Err(Error::NotARecord {
                    path: name.to_string(),
                }),
            },
            [] => Ok(()),
        }
    }
}

fn update_pair(item: Value) -> Result<(String, Value), Error> {
    if let Value::List(pair) = &item {
        if let [Value::Str(name), value] = pair.as_slice() {
            return Ok((name.clone(), value.clone()));
        }
    }

    Err(Error::UpdateArgument(format!(
        "update sequence element of type '{}' is not a (name, value) pair",
        item.type_name()
    )))
}
