//! Value conversion functions run by a field's getter and setter chains.
//!
//! A getter turns a freshly decoded wire value into the value callers see; a setter does the
//! reverse right before encoding. Any `Fn(Value) -> Result<Value, TransformError>` can be used.
//!
//! A [`Conversion`] bundles a matching getter and setter. Three stock conversions cover common
//! protocol needs:
//! - [`Linear`]: `value * scale + offset` on read, the inverse (rounded) on write.
//! - [`EnumMap`]: integer codes to string labels and back.
//! - [`Text`]: byte strings to UTF-8 or ASCII text, optionally zero-terminated and trimmed.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::value::Value;

/// Getter or setter function.
pub type Transform = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;

/// Errors that can occur when converting a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The value type does not match what the conversion expects.
    #[error("expected a {expected} value, found {found}")]
    InvalidType {
        expected: &'static str,
        found: &'static str,
    },
    /// An integer value has no entry in the enum map.
    #[error("no label for enum value {0}")]
    InvalidEnumValue(i64),
    /// A label has no entry in the enum map.
    #[error("no enum value for label `{0}`")]
    UnknownLabel(String),
    /// Byte sequence is not valid for the chosen encoding (e.g. invalid UTF-8).
    #[error("bytes are not valid for the chosen encoding")]
    InvalidEncoding,
    /// An ASCII-encoded byte is outside 0..=0x7F.
    #[error("byte outside the ASCII range")]
    InvalidAsciiByteValue,
    /// Scale is zero or scale/offset is non-finite.
    #[error("scale and offset must be finite and the scale non-zero")]
    InvalidScaleOffset,
    #[error("{0}")]
    Custom(String),
}

/// A matching getter/setter pair.
pub trait Conversion: Send + Sync {
    /// Wire value to caller value (getter).
    fn decode(&self, raw: Value) -> Result<Value, TransformError>;
    /// Caller value to wire value (setter).
    fn encode(&self, value: Value) -> Result<Value, TransformError>;
}

/// Linear scaling of an integer wire value: `value * scale + offset`.
///
/// Writing rounds to the nearest integer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    pub scale: f64,
    pub offset: f64,
}

impl Linear {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    fn validate(&self) -> Result<(), TransformError> {
        if !self.scale.is_finite() || !self.offset.is_finite() || self.scale == 0.0 {
            return Err(TransformError::InvalidScaleOffset);
        }

        Ok(())
    }
}

impl Conversion for Linear {
    fn decode(&self, raw: Value) -> Result<Value, TransformError> {
        self.validate()?;
        let v = numeric(&raw)?;
        Ok(Value::F64(v * self.scale + self.offset))
    }

    fn encode(&self, value: Value) -> Result<Value, TransformError> {
        self.validate()?;
        let v = numeric(&value)?;
        Ok(Value::I64(((v - self.offset) / self.scale).round() as i64))
    }
}

/// Maps integer codes to string labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumMap {
    labels: HashMap<i64, String>,
}

impl EnumMap {
    pub fn new(labels: HashMap<i64, String>) -> Self {
        Self { labels }
    }
}

impl<S: Into<String>> FromIterator<(i64, S)> for EnumMap {
    fn from_iter<I: IntoIterator<Item = (i64, S)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl Conversion for EnumMap {
    fn decode(&self, raw: Value) -> Result<Value, TransformError> {
        let code = raw.as_i64().ok_or(TransformError::InvalidType {
            expected: "int",
            found: raw.type_name(),
        })?;

        self.labels
            .get(&code)
            .map(|s| Value::Str(s.clone()))
            .ok_or(TransformError::InvalidEnumValue(code))
    }

    fn encode(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Str(label) => self
                .labels
                .iter()
                .find(|(_, l)| **l == label)
                .map(|(code, _)| Value::I64(*code))
                .ok_or(TransformError::UnknownLabel(label)),
            // raw codes pass through
            v @ (Value::I64(_) | Value::U64(_)) => Ok(v),
            other => Err(TransformError::InvalidType {
                expected: "str",
                found: other.type_name(),
            }),
        }
    }
}

/// Character encoding for decoding byte strings to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8. Any valid UTF-8 byte sequence is accepted.
    Utf8,
    /// ASCII. Every byte must be in 0..=0x7F.
    Ascii,
}

#[cfg(feature = "serde")]
impl From<crate::serde::EncodingDef> for Encoding {
    fn from(value: crate::serde::EncodingDef) -> Self {
        match value {
            crate::serde::EncodingDef::Utf8 => Encoding::Utf8,
            crate::serde::EncodingDef::Ascii => Encoding::Ascii,
        }
    }
}

/// Decodes a byte string field to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Text {
    pub encoding: Encoding,
    /// Truncate at the first null byte before decoding.
    pub zero_terminated: bool,
    /// Trim leading and trailing whitespace from decoded text.
    pub trim: bool,
}

impl Text {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            zero_terminated: false,
            trim: false,
        }
    }

    pub fn zero_terminated(mut self, zero_terminated: bool) -> Self {
        self.zero_terminated = zero_terminated;
        self
    }

    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
}

impl Conversion for Text {
    fn decode(&self, raw: Value) -> Result<Value, TransformError> {
        let bytes = match raw {
            Value::Bytes(b) => b,
            other => {
                return Err(TransformError::InvalidType {
                    expected: "bytes",
                    found: other.type_name(),
                });
            }
        };

        decode_text(bytes, self.encoding, self.zero_terminated, self.trim).map(Value::Str)
    }

    fn encode(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Str(s) => {
                if self.encoding == Encoding::Ascii && !s.is_ascii() {
                    return Err(TransformError::InvalidAsciiByteValue);
                }
                Ok(Value::Bytes(s.into_bytes()))
            }
            v @ Value::Bytes(_) => Ok(v),
            other => Err(TransformError::InvalidType {
                expected: "str",
                found: other.type_name(),
            }),
        }
    }
}

fn numeric(value: &Value) -> Result<f64, TransformError> {
    value.as_f64().ok_or(TransformError::InvalidType {
        expected: "number",
        found: value.type_name(),
    })
}

/// Decodes bytes to a string (UTF-8 or ASCII), optionally zero-terminated and trimmed.
fn decode_text(
    mut bytes: Vec<u8>,
    encoding: Encoding,
    zero_terminated: bool,
    trim: bool,
) -> Result<String, TransformError> {
    if zero_terminated {
        if let Some(pos) = bytes.iter().position(|b| *b == 0) {
            bytes.truncate(pos);
        }
    }

    if encoding == Encoding::Ascii && bytes.iter().any(|b| *b > 0x7F) {
        return Err(TransformError::InvalidAsciiByteValue);
    }

    let mut s = String::from_utf8(bytes).map_err(|_| TransformError::InvalidEncoding)?;

    if trim {
        s = s.trim().to_string();
    }

    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let linear = Linear::new(2.0, 1.0);
        assert_eq!(linear.decode(Value::I64(10)).unwrap(), Value::F64(21.0));
        assert_eq!(linear.encode(Value::F64(21.0)).unwrap(), Value::I64(10));

        let offset_only = Linear::new(1.0, -10.0);
        assert_eq!(offset_only.decode(Value::U64(10)).unwrap(), Value::F64(0.0));
    }

    #[test]
    fn test_linear_invalid() {
        assert_eq!(
            Linear::new(0.0, 1.0).decode(Value::I64(1)),
            Err(TransformError::InvalidScaleOffset)
        );
        assert_eq!(
            Linear::new(f64::NAN, 1.0).encode(Value::I64(1)),
            Err(TransformError::InvalidScaleOffset)
        );
        assert!(Linear::new(1.0, 0.0).decode(Value::Str("x".into())).is_err());
    }

    #[test]
    fn test_enum() {
        let map: EnumMap = [(1i64, "one"), (2i64, "two")].into_iter().collect();

        assert_eq!(map.decode(Value::I64(1)).unwrap(), Value::Str("one".into()));
        assert_eq!(map.decode(Value::U64(2)).unwrap(), Value::Str("two".into()));
        assert_eq!(
            map.decode(Value::I64(3)),
            Err(TransformError::InvalidEnumValue(3))
        );
        assert_eq!(map.encode(Value::Str("two".into())).unwrap(), Value::I64(2));
        assert_eq!(
            map.encode(Value::Str("three".into())),
            Err(TransformError::UnknownLabel("three".into()))
        );
    }

    #[test]
    fn test_string() {
        let raw = Value::Bytes(b"Hello\n".to_vec());

        let utf8 = Text::new(Encoding::Utf8);
        assert_eq!(utf8.decode(raw.clone()).unwrap(), Value::Str("Hello\n".into()));

        let ascii = Text::new(Encoding::Ascii).trim(true);
        assert_eq!(ascii.decode(raw).unwrap(), Value::Str("Hello".into()));
    }

    #[test]
    fn test_string_zero_terminated() {
        let text = Text::new(Encoding::Utf8).zero_terminated(true);
        assert_eq!(
            text.decode(Value::Bytes(b"abc\0\0\0".to_vec())).unwrap(),
            Value::Str("abc".into())
        );
        assert_eq!(
            text.encode(Value::Str("abc".into())).unwrap(),
            Value::Bytes(b"abc".to_vec())
        );
    }

    #[test]
    fn test_string_ascii_failure() {
        let text = Text::new(Encoding::Ascii);
        let value = Value::Bytes("Hello❤️\n".as_bytes().to_vec());

        assert_eq!(text.decode(value), Err(TransformError::InvalidAsciiByteValue));
        assert_eq!(
            text.encode(Value::Str("❤️".into())),
            Err(TransformError::InvalidAsciiByteValue)
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let text = Text::new(Encoding::Utf8);
        assert_eq!(
            text.decode(Value::Bytes(vec![0xFF, 0xFE])),
            Err(TransformError::InvalidEncoding)
        );
    }
}
