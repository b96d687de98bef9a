//! Error types for schema compilation, encoding, decoding and record access.

use thiserror::Error;

use crate::transform::TransformError;

/// Errors produced while compiling a [crate::schema::SchemaBuilder] into a [crate::schema::Schema].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A derived record tried to declare its own field order.
    #[error("record `{record}` may not redeclare the field order inherited from its base")]
    FieldOrderRedeclared { record: String },
    /// More than one base record was given.
    #[error("record `{record}` declares more than one base record")]
    MultipleBases { record: String },
    /// A name in the field order has no definition.
    #[error("`{field}` is listed in the field order of `{record}` but never defined")]
    UndefinedField { record: String, field: String },
    /// A defined field is missing from the field order.
    #[error("`{field}` is defined on `{record}` but is not part of its field order")]
    NotInFieldOrder { record: String, field: String },
    #[error("`{0}` is a reserved name")]
    ReservedName(String),
    /// Field name is empty or contains the path separator.
    #[error("`{0}` is not a valid field name")]
    InvalidFieldName(String),
    #[error("field `{field}` appears more than once in `{record}`")]
    DuplicateField { record: String, field: String },
    /// An array length reads a field that is not declared strictly before the array.
    #[error("array `{array}` takes its length from `{field}`, which is not declared before it")]
    ForwardReference { array: String, field: String },
    #[error("string fields must be at least one byte long")]
    InvalidStringLength,
    #[error("field `{field}` cannot be both static and generated")]
    ConflictingField { field: String },
    #[error("array `{array}` cannot hold generated elements")]
    GeneratedArrayElement { array: String },
    /// Array elements must take up at least one byte.
    #[error("array `{array}` has record elements that encode to zero bytes")]
    EmptyElement { array: String },
    /// The static encoded size does not fit in `usize`.
    #[error("encoded size of `{record}` overflows")]
    SizeOverflow { record: String },
    /// A record referenced by name is not in the registry.
    #[error("unknown record type `{0}`")]
    UnknownRecord(String),
    /// A JSON value in a schema description cannot become a field value.
    #[error("invalid value in schema description: {0}")]
    InvalidDefinitionValue(String),
}

/// Errors produced when decoding bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Input is shorter than the layout being decoded.
    #[error("buffer holds {available} bytes but {needed} are required")]
    PacketTooShort { needed: usize, available: usize },
}

/// Errors produced when encoding a single scalar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("{value} does not fit in a `{code}` field")]
    OutOfRange { code: char, value: String },
    #[error("a `{code}` field cannot hold a {found} value")]
    InvalidValue { code: char, found: &'static str },
    #[error("char fields hold exactly one byte, got {0}")]
    InvalidCharLength(usize),
}

/// Errors produced by [crate::record::Record] and [crate::array::Array] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The record type still has placeholder fields.
    #[error("record `{record}` has unresolved fields {fields:?} that a derived record must define")]
    Partial { record: String, fields: Vec<String> },
    #[error("`{field}` must be of type `{expected}`, given `{given}`")]
    TypeMismatch {
        field: String,
        expected: String,
        given: String,
    },
    #[error("static field `{field}` is not writeable")]
    StaticField { field: String },
    #[error("generated field `{field}` is not writeable")]
    GeneratedField { field: String },
    /// Padding takes up bytes but holds no value.
    #[error("padding field `{field}` holds no value")]
    PaddingField { field: String },
    #[error("validation of `{field}` failed for value {value}")]
    Validation { field: String, value: String },
    /// A decoded static field does not hold its declared value.
    #[error("`{field}` decoded as {found}, expected {expected}")]
    UnpackMismatch {
        field: String,
        expected: String,
        found: String,
    },
    #[error("index {index} out of range for length {len}")]
    Index { index: usize, len: usize },
    #[error("record `{record}` has no field `{field}`")]
    UnknownField { record: String, field: String },
    /// A dotted path walks through something that is not a record.
    #[error("`{path}` does not name a nested record")]
    NotARecord { path: String },
    /// A path that should name an array names something else.
    #[error("`{path}` does not name an array")]
    NotAnArray { path: String },
    #[error("{0}")]
    UpdateArgument(String),
    #[error("{given} values given but the record has {expected} fields")]
    TooManyValues { given: usize, expected: usize },
    #[error("expected {expected} values, given {given}")]
    LengthMismatch { expected: usize, given: usize },
    #[error("array `{array}` resolved an invalid length {value}")]
    InvalidLength { array: String, value: String },
    #[error("conversion of `{field}` failed: {source}")]
    Transform {
        field: String,
        #[source]
        source: TransformError,
    },
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("cannot encode `{field}`: {source}")]
    Encode {
        field: String,
        #[source]
        source: WriteError,
    },
}
