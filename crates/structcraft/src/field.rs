//! Field declarations used to build a [crate::schema::Schema].

use std::{fmt, sync::Arc};

use tracing::warn;

use crate::{
    byte_order::ByteOrder,
    errors::Error,
    record::Record,
    scalar::ScalarKind,
    schema::Schema,
    transform::{Conversion, Transform, TransformError},
    value::{Value, ValueType},
};

/// Predicate run on every [Field::set].
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Computes a field's value from the record that owns it.
pub type Generator = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
/// Computes an array length from already-populated sibling fields.
pub type LengthFn = Arc<dyn Fn(&Record) -> Result<usize, Error> + Send + Sync>;

/// Descriptor of one scalar slot: wire type, default, static value and the value pipeline.
///
/// A field is declared once and shared read-only by every record of the schema it belongs to.
///
/// ```
/// use structcraft::field::Field;
/// use structcraft::value::Value;
///
/// let stx = Field::uchar().fixed(0x02);
/// assert!(stx.set("stx", Value::U64(0x02)).is_ok());
/// assert!(stx.set("stx", Value::U64(0x03)).is_err());
/// ```
#[derive(Clone)]
pub struct Field {
    kind: ScalarKind,
    default: Value,
    fixed: Option<Value>,
    setters: Vec<Transform>,
    getters: Vec<Transform>,
    validators: Vec<Validator>,
    generator: Option<Generator>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("fixed", &self.fixed)
            .field("setters", &self.setters.len())
            .field("getters", &self.getters.len())
            .field("validators", &self.validators.len())
            .field("generated", &self.generator.is_some())
            .finish()
    }
}

impl Field {
    pub fn new(kind: ScalarKind) -> Self {
        Field {
            kind,
            default: kind.default_value(),
            fixed: None,
            setters: Vec::new(),
            getters: Vec::new(),
            validators: Vec::new(),
            generator: None,
        }
    }

    pub fn pad() -> Self {
        Self::new(ScalarKind::Pad)
    }

    pub fn char() -> Self {
        Self::new(ScalarKind::Char)
    }

    pub fn schar() -> Self {
        Self::new(ScalarKind::SChar)
    }

    pub fn uchar() -> Self {
        Self::new(ScalarKind::UChar)
    }

    pub fn bool() -> Self {
        Self::new(ScalarKind::Bool)
    }

    pub fn short() -> Self {
        Self::new(ScalarKind::Short)
    }

    pub fn ushort() -> Self {
        Self::new(ScalarKind::UShort)
    }

    pub fn int() -> Self {
        Self::new(ScalarKind::Int)
    }

    pub fn uint() -> Self {
        Self::new(ScalarKind::UInt)
    }

    pub fn long() -> Self {
        Self::new(ScalarKind::Long)
    }

    pub fn ulong() -> Self {
        Self::new(ScalarKind::ULong)
    }

    pub fn float() -> Self {
        Self::new(ScalarKind::Float)
    }

    pub fn double() -> Self {
        Self::new(ScalarKind::Double)
    }

    /// Fixed-length byte string of `len` bytes.
    pub fn string(len: usize) -> Self {
        Self::new(ScalarKind::Bytes(len))
    }

    /// Value used when a record is built without one for this field.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Makes the field static: it always holds `value`, and decoding verifies it.
    pub fn fixed(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = value.clone();
        self.fixed = Some(value);
        self
    }

    /// Appends a function to the setter chain (run before encoding).
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.setters.push(Arc::new(f));
        self
    }

    /// Appends a function to the getter chain (run after decoding).
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.getters.push(Arc::new(f));
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    /// Derives the value from the owning record. Generated fields reject writes.
    pub fn generator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(f));
        self
    }

    /// Installs a getter/setter pair.
    ///
    /// The getter runs after the ones already installed and the setter before them, so stacked
    /// conversions invert in reverse order.
    pub fn convert<C: Conversion + 'static>(mut self, conversion: C) -> Self {
        let conversion = Arc::new(conversion);
        let decoder = conversion.clone();
        let encoder: Transform = Arc::new(move |value| conversion.encode(value));
        self.setters.insert(0, encoder);
        self.getter(move |raw| decoder.decode(raw))
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.kind.value_type()
    }

    pub fn size(&self, order: ByteOrder) -> usize {
        self.kind.size(order)
    }

    pub fn is_static(&self) -> bool {
        self.fixed.is_some()
    }

    pub fn static_value(&self) -> Option<&Value> {
        self.fixed.as_ref()
    }

    pub fn is_generated(&self) -> bool {
        self.generator.is_some()
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Value a fresh record stores in this field.
    pub(crate) fn initial(&self) -> Value {
        self.fixed.clone().unwrap_or_else(|| self.default.clone())
    }

    /// Current value: the stored one, or the generator's live computation over `owner`.
    pub fn get(&self, stored: &Value, owner: &Record) -> Value {
        match &self.generator {
            Some(generator) => generator(owner),
            None => stored.clone(),
        }
    }

    /// Checks a write and returns the value to store.
    ///
    /// [Value::None] restores the default without running validators.
    pub fn set(&self, name: &str, value: Value) -> Result<Value, Error> {
        if value.is_none() {
            return Ok(self.initial());
        }

        if self.kind == ScalarKind::Pad {
            return Err(Error::PaddingField {
                field: name.to_string(),
            });
        }

        if let Some(fixed) = &self.fixed {
            if *fixed == value {
                return Ok(value);
            }
            return Err(Error::StaticField {
                field: name.to_string(),
            });
        }

        if self.generator.is_some() {
            return Err(Error::GeneratedField {
                field: name.to_string(),
            });
        }

        if self.validators.iter().any(|validator| !validator(&value)) {
            return Err(Error::Validation {
                field: name.to_string(),
                value: format!("{value:?}"),
            });
        }

        Ok(value)
    }

    /// Produces the wire-ready value: setter chain, then coercion to the declared value type.
    pub fn prep(&self, name: &str, value: Value) -> Result<Value, Error> {
        let value = run_chain(&self.setters, name, value)?;

        let (value, coerced) = self.kind.coerce(value).map_err(|source| Error::Encode {
            field: name.to_string(),
            source,
        })?;
        if coerced {
            warn!(field = name, code = %self.kind.code(), value = ?value, "coerced value to the field's type");
        }

        Ok(value)
    }

    /// Runs the getter chain over a decoded value.
    ///
    /// Returns the value to store, or `None` for a static field whose value matched.
    pub fn unprep(&self, name: &str, raw: Value) -> Result<Option<Value>, Error> {
        let value = run_chain(&self.getters, name, raw)?;

        if let Some(fixed) = &self.fixed {
            if *fixed != value {
                return Err(Error::UnpackMismatch {
                    field: name.to_string(),
                    expected: format!("{fixed:?}"),
                    found: format!("{value:?}"),
                });
            }
            return Ok(None);
        }

        // decoding is not a write; generated fields keep the raw value
        if self.generator.is_some() {
            return Ok(Some(value));
        }

        self.set(name, value).map(Some)
    }
}

fn run_chain(chain: &[Transform], name: &str, mut value: Value) -> Result<Value, Error> {
    for f in chain {
        value = f(value).map_err(|source| Error::Transform {
            field: name.to_string(),
            source,
        })?;
    }

    Ok(value)
}

/// Element type of an array field.
#[derive(Debug, Clone)]
pub enum Element {
    Scalar(Field),
    Record(Arc<Schema>),
}

/// How many elements an array holds on the wire.
#[derive(Clone)]
pub enum Length {
    Fixed(usize),
    /// Value of an earlier integer field.
    Field(String),
    /// Function over earlier fields; every field it reads must be listed.
    Computed { fields: Vec<String>, func: LengthFn },
    /// Consumes the rest of the buffer on decode.
    Greedy,
}

impl fmt::Debug for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            Length::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Length::Computed { fields, .. } => {
                f.debug_struct("Computed").field("fields", fields).finish()
            }
            Length::Greedy => f.write_str("Greedy"),
        }
    }
}

impl Length {
    pub fn fixed(n: usize) -> Self {
        Length::Fixed(n)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Length::Field(name.into())
    }

    pub fn computed<I, S, F>(fields: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Record) -> Result<usize, Error> + Send + Sync + 'static,
    {
        Length::Computed {
            fields: fields.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }
}

/// Declaration of a repeated-element field.
#[derive(Debug, Clone)]
pub struct ArrayDef {
    pub element: Element,
    pub length: Length,
}

impl ArrayDef {
    pub fn new(element: Element, length: Length) -> Self {
        ArrayDef { element, length }
    }

    pub fn of_scalars(field: Field, length: Length) -> Self {
        Self::new(Element::Scalar(field), length)
    }

    pub fn of_records(schema: &Arc<Schema>, length: Length) -> Self {
        Self::new(Element::Record(schema.clone()), length)
    }
}

/// What a named member of a record is.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(Field),
    /// Nested record of exactly this schema.
    Record(Arc<Schema>),
    Array(ArrayDef),
    /// Declared but left for a derived record to define.
    Placeholder,
}

impl From<Field> for FieldKind {
    fn from(field: Field) -> Self {
        FieldKind::Scalar(field)
    }
}

impl From<Arc<Schema>> for FieldKind {
    fn from(schema: Arc<Schema>) -> Self {
        FieldKind::Record(schema)
    }
}

impl From<&Arc<Schema>> for FieldKind {
    fn from(schema: &Arc<Schema>) -> Self {
        FieldKind::Record(schema.clone())
    }
}

impl From<ArrayDef> for FieldKind {
    fn from(array: ArrayDef) -> Self {
        FieldKind::Array(array)
    }
}
