//! Runtime value store of an array field.

use std::{
    fmt,
    ops::{Bound, Range, RangeBounds},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, trace};

use crate::{
    byte_order::ByteOrder,
    compiled::{CompiledArray, CompiledLength},
    errors::{Error, ReadError},
    field::Element,
    record::Record,
    value::Value,
};

/// Handle to the elements of an array field.
///
/// Clones share the same elements. Scalar elements are stored as plain values, record elements as
/// [Value::Record] handles.
#[derive(Clone)]
pub struct Array {
    def: Arc<CompiledArray>,
    byte_order: ByteOrder,
    items: Arc<Mutex<Vec<Value>>>,
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items) || self.values() == other.values()
    }
}

impl Array {
    pub(crate) fn new(def: Arc<CompiledArray>, byte_order: ByteOrder) -> Self {
        Array {
            def,
            byte_order,
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the same elements, declared as `def`.
    pub(crate) fn rebind(&self, def: Arc<CompiledArray>, byte_order: ByteOrder) -> Self {
        Array {
            def,
            byte_order,
            items: self.items.clone(),
        }
    }

    /// True when `other` can share storage with this array's declaration.
    pub(crate) fn accepts(&self, other: &Array) -> bool {
        if Arc::ptr_eq(&self.def, &other.def) {
            return true;
        }

        match (&self.def.element, &other.def.element) {
            (Element::Scalar(a), Element::Scalar(b)) => a.kind() == b.kind(),
            (Element::Record(a), Element::Record(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn element(&self) -> &Element {
        &self.def.element
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn values(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn get(&self, index: usize) -> Result<Value, Error> {
        let items = self.lock();
        items.get(index).cloned().ok_or(Error::Index {
            index,
            len: items.len(),
        })
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), Error> {
        let len = self.len();
        if index >= len {
            return Err(Error::Index { index, len });
        }

        let value = self.checked(value)?;
        let mut items = self.lock();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::Index {
                index,
                len: items.len(),
            }),
        }
    }

    pub fn get_slice(&self, range: impl RangeBounds<usize>) -> Vec<Value> {
        let items = self.lock();
        let range = clamp(range, items.len());
        items[range].to_vec()
    }

    /// Writes `values` over the elements in `range`; both must have the same length.
    pub fn set_slice(&self, range: impl RangeBounds<usize>, values: Vec<Value>) -> Result<(), Error> {
        let range = clamp(range, self.len());
        if range.len() != values.len() {
            return Err(Error::LengthMismatch {
                expected: range.len(),
                given: values.len(),
            });
        }

        for (index, value) in range.zip(values) {
            self.set(index, value)?;
        }

        Ok(())
    }

    /// Appends one element.
    ///
    /// Scalar elements go through the element's write checks. Record elements accept a record of
    /// exactly the element type, a [Value::List] of positional values or a [Value::Map] of named
    /// values.
    pub fn append(&self, value: impl Into<Value>) -> Result<(), Error> {
        let value = self.checked(value.into())?;
        self.lock().push(value);
        Ok(())
    }

    /// Appends a record element built from positional and named values.
    pub fn append_args(&self, positional: Vec<Value>, named: Vec<(String, Value)>) -> Result<(), Error> {
        match &self.def.element {
            Element::Record(schema) => {
                let record = Record::from_args(schema, positional, named)?;
                self.lock().push(Value::Record(record));
                Ok(())
            }
            Element::Scalar(_) => {
                if positional.len() != 1 || !named.is_empty() {
                    return Err(Error::LengthMismatch {
                        expected: 1,
                        given: positional.len() + named.len(),
                    });
                }
                self.append(positional.into_iter().next().unwrap_or_default())
            }
        }
    }

    pub fn extend<I>(&self, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Value>,
    {
        for value in values {
            self.append(value)?;
        }

        Ok(())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn checked(&self, value: Value) -> Result<Value, Error> {
        let schema = match &self.def.element {
            Element::Scalar(field) => return field.set(&self.def.name, value),
            Element::Record(schema) => schema,
        };

        let record = match value {
            Value::Record(record) if Arc::ptr_eq(record.schema(), schema) => record,
            Value::List(values) => Record::from_values(schema, values)?,
            Value::Map(named) => Record::from_map(schema, named)?,
            Value::None => Record::new(schema)?,
            other => {
                return Err(Error::TypeMismatch {
                    field: self.def.name.clone(),
                    expected: schema.name().to_string(),
                    given: type_label(&other),
                });
            }
        };

        Ok(Value::Record(record))
    }

    /// Number of elements written by [Array::pack_into] when `actual` are present.
    fn emitted_len(&self, actual: usize) -> usize {
        match self.def.length {
            CompiledLength::Fixed(count) => count,
            _ => actual,
        }
    }

    /// Element used to fill a fixed-length array that holds fewer elements than declared.
    fn filler(&self) -> Result<Value, Error> {
        match &self.def.element {
            Element::Scalar(field) => Ok(field.initial()),
            Element::Record(schema) => Record::new(schema).map(Value::Record),
        }
    }

    /// Encoded size of the elements [Array::pack_into] would write.
    pub fn size(&self) -> usize {
        let items = self.values();
        let count = self.emitted_len(items.len());

        match &self.def.element {
            Element::Scalar(field) => field.size(self.byte_order) * count,
            Element::Record(schema) => {
                let present: usize = items
                    .iter()
                    .take(count)
                    .filter_map(Value::as_record)
                    .map(Record::size)
                    .sum();
                let missing = count.saturating_sub(items.len());
                let filler = match missing {
                    0 => 0,
                    _ => schema
                        .size()
                        .or_else(|| Record::new(schema).ok().map(|r| r.size()))
                        .unwrap_or(0),
                };
                present + missing * filler
            }
        }
    }

    /// Appends the encoded elements to `out`.
    ///
    /// A fixed-length array always writes its declared number of elements, dropping extra ones and
    /// filling missing ones with defaults. Other arrays write exactly the elements they hold.
    pub fn pack_into(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let items = self.values();
        let count = self.emitted_len(items.len());
        if count != items.len() {
            debug!(
                array = %self.def.name,
                declared = count,
                actual = items.len(),
                "fitting array to its declared length"
            );
        }

        let start = out.len();
        match &self.def.element {
            Element::Scalar(field) => {
                let kind = field.kind();
                let width = kind.size(self.byte_order);
                out.resize(start + width * count, 0);

                for (i, chunk) in out[start..].chunks_exact_mut(width).enumerate() {
                    let value = match items.get(i) {
                        Some(value) => value.clone(),
                        None => field.initial(),
                    };
                    let value = field.prep(&self.def.name, value)?;
                    kind.encode(&value, self.byte_order, chunk)
                        .map_err(|source| Error::Encode {
                            field: format!("{}[{i}]", self.def.name),
                            source,
                        })?;
                }
            }
            Element::Record(_) => {
                for i in 0..count {
                    let value = match items.get(i) {
                        Some(value) => value.clone(),
                        None => self.filler()?,
                    };
                    match value {
                        Value::Record(record) => record.pack_into(out)?,
                        other => {
                            return Err(Error::TypeMismatch {
                                field: format!("{}[{i}]", self.def.name),
                                expected: "record".to_string(),
                                given: type_label(&other),
                            });
                        }
                    }
                }
            }
        }

        trace!(array = %self.def.name, elements = count, bytes = out.len() - start, "packed array");
        Ok(())
    }

    /// Number of elements to decode, or `None` to consume the rest of the buffer.
    fn resolve_len(&self, owner: &Record) -> Result<Option<usize>, Error> {
        match &self.def.length {
            CompiledLength::Fixed(count) => Ok(Some(*count)),
            CompiledLength::Greedy => Ok(None),
            CompiledLength::Computed(func) => func(owner).map(Some),
            CompiledLength::Field { index, .. } => {
                // the decoded value, not a generator's live one
                let value = owner.stored(*index);
                value
                    .as_u64()
                    .and_then(|count| usize::try_from(count).ok())
                    .map(Some)
                    .ok_or_else(|| Error::InvalidLength {
                        array: self.def.name.clone(),
                        value: format!("{value:?}"),
                    })
            }
        }
    }

    /// Decodes elements from the start of `data`, replacing the current ones. Returns the bytes consumed.
    ///
    /// Length fields are read from `owner`, which must already hold their decoded values.
    pub fn unpack_from(&self, data: &[u8], owner: &Record) -> Result<usize, Error> {
        let count = self.resolve_len(owner)?;

        let (items, consumed) = match &self.def.element {
            Element::Scalar(field) => {
                let kind = field.kind();
                let width = kind.size(self.byte_order);
                let count = count.unwrap_or(data.len() / width);
                let needed = count.saturating_mul(width);
                if data.len() < needed {
                    return Err(ReadError::PacketTooShort {
                        needed,
                        available: data.len(),
                    }
                    .into());
                }

                let items = data[..needed]
                    .chunks_exact(width)
                    .map(|chunk| {
                        let raw = kind.decode(chunk, self.byte_order);
                        Ok(field
                            .unprep(&self.def.name, raw)?
                            .unwrap_or_else(|| field.initial()))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                (items, needed)
            }
            Element::Record(schema) => {
                let count = match (count, schema.size()) {
                    (Some(count), _) => Some(count),
                    (None, Some(size)) if size > 0 => Some(data.len() / size),
                    (None, _) => None,
                };

                let mut items = Vec::with_capacity(count.unwrap_or_default().min(data.len()));
                let mut offset = 0;
                loop {
                    match count {
                        Some(count) if items.len() == count => break,
                        None if offset >= data.len() => break,
                        _ => {}
                    }

                    let record = Record::new(schema)?;
                    let consumed = record.unpack_from(&data[offset..])?;
                    offset += consumed;
                    items.push(Value::Record(record));

                    // zero-byte elements are bounded by the buffer length
                    if consumed == 0 {
                        match count {
                            None => break,
                            Some(count) if count > data.len() => {
                                return Err(Error::InvalidLength {
                                    array: self.def.name.clone(),
                                    value: count.to_string(),
                                });
                            }
                            Some(_) => {}
                        }
                    }
                }
                (items, offset)
            }
        };

        trace!(array = %self.def.name, elements = items.len(), bytes = consumed, "unpacked array");
        *self.lock() = items;
        Ok(consumed)
    }
}

/// Type name used in mismatch errors: the record type for records.
pub(crate) fn type_label(value: &Value) -> String {
    match value {
        Value::Record(record) => record.schema().name().to_string(),
        other => other.type_name().to_string(),
    }
}

/// Resolves `range` against a sequence of `len` items, clamping out-of-range bounds.
pub(crate) fn clamp(range: impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);

    start.min(end)..end
}
