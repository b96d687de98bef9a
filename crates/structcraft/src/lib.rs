//! # structcraft
//!
//! Declarative binary record layouts with compiled pack/unpack.
//!
//! Declare a record type as an ordered list of typed fields (fixed-width scalars, nested records,
//! fixed or variable-length arrays) with a [SchemaBuilder]. Compiling it validates the field order
//! and merges runs of consecutive scalars into segments that are encoded and decoded in one pass.
//! [Record]s created from the schema hold the values and convert to and from bytes in native,
//! little-endian, big-endian or network byte order.
//!
//! Each scalar field runs a small value pipeline: defaults, static values verified on decode,
//! setter and getter chains, validators and generators computed from the rest of the record.
//!
//! ## Example
//!
//! ```
//! use structcraft::{ArrayDef, ByteOrder, Field, Length, Record, SchemaBuilder, Value};
//!
//! let point = SchemaBuilder::new("Point")
//!     .byte_order(ByteOrder::Little)
//!     .scalar("x", Field::double())
//!     .scalar("y", Field::double())
//!     .compile()
//!     .unwrap();
//!
//! let path = SchemaBuilder::new("Path")
//!     .byte_order(ByteOrder::Little)
//!     .scalar("count", Field::uint())
//!     .array("points", ArrayDef::of_records(&point, Length::field("count")))
//!     .compile()
//!     .unwrap();
//!
//! let record = Record::new(&path).unwrap();
//! record.set("count", 1u32).unwrap();
//! record
//!     .array("points")
//!     .unwrap()
//!     .append(Value::List(vec![0.0.into(), 10.0.into()]))
//!     .unwrap();
//!
//! let bytes = record.pack().unwrap();
//! assert_eq!(bytes.len(), 20);
//!
//! let decoded = Record::from_bytes(&path, &bytes).unwrap();
//! assert_eq!(decoded.get("count").unwrap(), Value::U64(1));
//! ```

pub mod array;
pub mod byte_order;
pub mod bytes;
pub mod compiled;
pub mod errors;
pub mod field;
pub mod record;
pub mod scalar;
pub mod schema;
#[cfg(feature = "serde")]
pub mod serde;
pub mod transform;
pub mod value;

pub use array::Array;
pub use byte_order::ByteOrder;
pub use errors::{CompileError, Error, ReadError, WriteError};
pub use field::{ArrayDef, Element, Field, FieldKind, Length};
pub use record::Record;
pub use scalar::ScalarKind;
pub use schema::{Schema, SchemaBuilder};
pub use transform::{Conversion, Encoding, EnumMap, Linear, Text, TransformError};
pub use value::{Value, ValueType};
