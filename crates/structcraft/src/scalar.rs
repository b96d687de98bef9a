//! Scalar wire types: widths, defaults, coercion and single-value encode/decode.

use crate::{
    byte_order::ByteOrder,
    bytes::{read_uint, sign_extend, signed_range, unsigned_max, write_uint},
    errors::WriteError,
    value::{Value, ValueType},
};

/// Wire type of a single scalar slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Skipped padding byte.
    Pad,
    /// Raw byte, held as a one-byte [Value::Bytes].
    Char,
    SChar,
    UChar,
    Bool,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    /// Fixed-length byte string of exactly `n` bytes.
    Bytes(usize),
}

#[cfg(feature = "serde")]
impl From<crate::serde::ScalarDef> for ScalarKind {
    fn from(value: crate::serde::ScalarDef) -> Self {
        use crate::serde::ScalarDef;

        match value {
            ScalarDef::Pad => ScalarKind::Pad,
            ScalarDef::Char => ScalarKind::Char,
            ScalarDef::Schar => ScalarKind::SChar,
            ScalarDef::Uchar => ScalarKind::UChar,
            ScalarDef::Bool => ScalarKind::Bool,
            ScalarDef::Short => ScalarKind::Short,
            ScalarDef::Ushort => ScalarKind::UShort,
            ScalarDef::Int => ScalarKind::Int,
            ScalarDef::Uint => ScalarKind::UInt,
            ScalarDef::Long => ScalarKind::Long,
            ScalarDef::Ulong => ScalarKind::ULong,
            ScalarDef::Float => ScalarKind::Float,
            ScalarDef::Double => ScalarKind::Double,
            ScalarDef::String(n) => ScalarKind::Bytes(n),
        }
    }
}

impl ScalarKind {
    /// Format character in the `struct` module convention.
    pub fn code(self) -> char {
        match self {
            ScalarKind::Pad => 'x',
            ScalarKind::Char => 'c',
            ScalarKind::SChar => 'b',
            ScalarKind::UChar => 'B',
            ScalarKind::Bool => '?',
            ScalarKind::Short => 'h',
            ScalarKind::UShort => 'H',
            ScalarKind::Int => 'i',
            ScalarKind::UInt => 'I',
            ScalarKind::Long => 'l',
            ScalarKind::ULong => 'L',
            ScalarKind::Float => 'f',
            ScalarKind::Double => 'd',
            ScalarKind::Bytes(_) => 's',
        }
    }

    /// Format token, including the length prefix of byte strings.
    pub fn format(self) -> String {
        match self {
            ScalarKind::Bytes(n) => format!("{n}s"),
            other => other.code().to_string(),
        }
    }

    pub fn size(self, order: ByteOrder) -> usize {
        match self {
            ScalarKind::Pad
            | ScalarKind::Char
            | ScalarKind::SChar
            | ScalarKind::UChar
            | ScalarKind::Bool => 1,
            ScalarKind::Short | ScalarKind::UShort => 2,
            ScalarKind::Int | ScalarKind::UInt | ScalarKind::Float => 4,
            ScalarKind::Long | ScalarKind::ULong => order.long_width(),
            ScalarKind::Double => 8,
            ScalarKind::Bytes(n) => n,
        }
    }

    /// Alignment inside a segment. Always 1 for the standard byte orders.
    pub fn align(self, order: ByteOrder) -> usize {
        if order.is_standard() {
            return 1;
        }

        match self {
            ScalarKind::Pad | ScalarKind::Char | ScalarKind::Bytes(_) => 1,
            other => other.size(order),
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            ScalarKind::Pad => ValueType::None,
            ScalarKind::Char | ScalarKind::Bytes(_) => ValueType::Bytes,
            ScalarKind::Bool => ValueType::Bool,
            ScalarKind::Float | ScalarKind::Double => ValueType::Float,
            _ => ValueType::Int,
        }
    }

    fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::SChar | ScalarKind::Short | ScalarKind::Int | ScalarKind::Long
        )
    }

    /// Value a field of this kind holds when nothing else was given.
    pub fn default_value(self) -> Value {
        match self {
            ScalarKind::Pad => Value::None,
            ScalarKind::Char => Value::Bytes(vec![0]),
            ScalarKind::Bytes(n) => Value::Bytes(vec![0; n]),
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Float | ScalarKind::Double => Value::F64(0.0),
            kind if kind.is_signed() => Value::I64(0),
            _ => Value::U64(0),
        }
    }

    /// Converts `value` to this kind's [ValueType]. The flag is true when a conversion happened.
    pub fn coerce(self, value: Value) -> Result<(Value, bool), WriteError> {
        let invalid = |value: &Value| WriteError::InvalidValue {
            code: self.code(),
            found: value.type_name(),
        };

        match (self.value_type(), value) {
            (ValueType::None, _) => Ok((Value::None, false)),

            (ValueType::Int, v @ (Value::I64(_) | Value::U64(_))) => Ok((v, false)),
            (ValueType::Int, Value::Bool(b)) => Ok((Value::I64(b as i64), true)),
            (ValueType::Int, Value::F64(f)) => {
                let truncated = f.trunc();
                if !f.is_finite() || truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
                    return Err(WriteError::OutOfRange {
                        code: self.code(),
                        value: f.to_string(),
                    });
                }
                Ok((Value::I64(truncated as i64), true))
            }

            (ValueType::Float, v @ Value::F64(_)) => Ok((v, false)),
            (ValueType::Float, Value::I64(i)) => Ok((Value::F64(i as f64), true)),
            (ValueType::Float, Value::U64(u)) => Ok((Value::F64(u as f64), true)),

            (ValueType::Bool, v @ Value::Bool(_)) => Ok((v, false)),
            (ValueType::Bool, Value::I64(i)) => Ok((Value::Bool(i != 0), true)),
            (ValueType::Bool, Value::U64(u)) => Ok((Value::Bool(u != 0), true)),

            (ValueType::Bytes, v @ Value::Bytes(_)) => Ok((v, false)),
            (ValueType::Bytes, Value::Str(s)) => Ok((Value::Bytes(s.into_bytes()), true)),

            (_, other) => Err(invalid(&other)),
        }
    }

    /// Encodes `value` into `out`, which must be exactly [ScalarKind::size] bytes long.
    pub fn encode(self, value: &Value, order: ByteOrder, out: &mut [u8]) -> Result<(), WriteError> {
        let little = order.is_little_endian();
        let invalid = || WriteError::InvalidValue {
            code: self.code(),
            found: value.type_name(),
        };
        let out_of_range = |v: String| WriteError::OutOfRange {
            code: self.code(),
            value: v,
        };

        match self {
            ScalarKind::Pad => out.fill(0),
            ScalarKind::Char => match value {
                Value::Bytes(b) if b.len() == 1 => out[0] = b[0],
                Value::Bytes(b) => return Err(WriteError::InvalidCharLength(b.len())),
                _ => return Err(invalid()),
            },
            ScalarKind::Bytes(_) => {
                let bytes = value.as_bytes().ok_or_else(invalid)?;
                let n = bytes.len().min(out.len());
                out[..n].copy_from_slice(&bytes[..n]);
                out[n..].fill(0);
            }
            ScalarKind::Bool => match value {
                Value::Bool(b) => out[0] = *b as u8,
                _ => return Err(invalid()),
            },
            ScalarKind::Float => {
                let v = value.as_f64().ok_or_else(invalid)?;
                let single = v as f32;
                if v.is_finite() && single.is_infinite() {
                    return Err(out_of_range(v.to_string()));
                }
                write_uint(out, single.to_bits() as u64, little);
            }
            ScalarKind::Double => {
                let v = value.as_f64().ok_or_else(invalid)?;
                write_uint(out, v.to_bits(), little);
            }
            kind => {
                let v: i128 = match value {
                    Value::I64(i) => *i as i128,
                    Value::U64(u) => *u as i128,
                    _ => return Err(invalid()),
                };
                let width = out.len();
                let in_range = if kind.is_signed() {
                    let (min, max) = signed_range(width);
                    v >= min && v <= max
                } else {
                    v >= 0 && (v as u128) <= unsigned_max(width)
                };
                if !in_range {
                    return Err(out_of_range(v.to_string()));
                }
                write_uint(out, v as u64, little);
            }
        }

        Ok(())
    }

    /// Decodes one value from `data`, which must be exactly [ScalarKind::size] bytes long.
    pub fn decode(self, data: &[u8], order: ByteOrder) -> Value {
        let little = order.is_little_endian();

        match self {
            ScalarKind::Pad => Value::None,
            ScalarKind::Char | ScalarKind::Bytes(_) => Value::Bytes(data.to_vec()),
            ScalarKind::Bool => Value::Bool(data[0] != 0),
            ScalarKind::Float => {
                Value::F64(f32::from_bits(read_uint(data, little) as u32) as f64)
            }
            ScalarKind::Double => Value::F64(f64::from_bits(read_uint(data, little))),
            kind if kind.is_signed() => {
                Value::I64(sign_extend(read_uint(data, little), data.len() * 8))
            }
            _ => Value::U64(read_uint(data, little)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(kind: ScalarKind, value: Value, order: ByteOrder) -> Result<Vec<u8>, WriteError> {
        let mut out = vec![0u8; kind.size(order)];
        kind.encode(&value, order, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_standard_sizes() {
        let order = ByteOrder::Little;
        assert_eq!(ScalarKind::Pad.size(order), 1);
        assert_eq!(ScalarKind::Char.size(order), 1);
        assert_eq!(ScalarKind::Bool.size(order), 1);
        assert_eq!(ScalarKind::UShort.size(order), 2);
        assert_eq!(ScalarKind::Int.size(order), 4);
        assert_eq!(ScalarKind::Long.size(order), 4);
        assert_eq!(ScalarKind::ULong.size(order), 4);
        assert_eq!(ScalarKind::Float.size(order), 4);
        assert_eq!(ScalarKind::Double.size(order), 8);
        assert_eq!(ScalarKind::Bytes(5).size(order), 5);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(ScalarKind::Double.align(ByteOrder::Big), 1);
        assert_eq!(ScalarKind::Double.align(ByteOrder::Native), 8);
        assert_eq!(ScalarKind::Short.align(ByteOrder::Native), 2);
        assert_eq!(ScalarKind::Bytes(3).align(ByteOrder::Native), 1);
    }

    #[test]
    fn test_encode_integers() {
        assert_eq!(
            encode(ScalarKind::UInt, Value::U64(1), ByteOrder::Little).unwrap(),
            vec![1, 0, 0, 0]
        );
        assert_eq!(
            encode(ScalarKind::UInt, Value::U64(1), ByteOrder::Network).unwrap(),
            vec![0, 0, 0, 1]
        );
        assert_eq!(
            encode(ScalarKind::Short, Value::I64(-2), ByteOrder::Big).unwrap(),
            vec![0xFF, 0xFE]
        );
    }

    #[test]
    fn test_encode_out_of_range() {
        assert!(matches!(
            encode(ScalarKind::UChar, Value::I64(256), ByteOrder::Little),
            Err(WriteError::OutOfRange { code: 'B', .. })
        ));
        assert!(matches!(
            encode(ScalarKind::UShort, Value::I64(-1), ByteOrder::Little),
            Err(WriteError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode(ScalarKind::SChar, Value::I64(-129), ByteOrder::Little),
            Err(WriteError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode(ScalarKind::Float, Value::F64(1e300), ByteOrder::Little),
            Err(WriteError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_encode_invalid_value() {
        assert_eq!(
            encode(ScalarKind::Int, Value::Str("1".into()), ByteOrder::Little),
            Err(WriteError::InvalidValue {
                code: 'i',
                found: "str"
            })
        );
        assert_eq!(
            encode(ScalarKind::Char, Value::Bytes(vec![1, 2]), ByteOrder::Little),
            Err(WriteError::InvalidCharLength(2))
        );
    }

    #[test]
    fn test_byte_strings_pad_and_truncate() {
        assert_eq!(
            encode(ScalarKind::Bytes(4), Value::Bytes(b"ab".to_vec()), ByteOrder::Big).unwrap(),
            b"ab\0\0".to_vec()
        );
        assert_eq!(
            encode(ScalarKind::Bytes(2), Value::Bytes(b"abcd".to_vec()), ByteOrder::Big)
                .unwrap(),
            b"ab".to_vec()
        );
    }

    #[test]
    fn test_decode() {
        let order = ByteOrder::Little;
        assert_eq!(ScalarKind::SChar.decode(&[0xFF], order), Value::I64(-1));
        assert_eq!(ScalarKind::UChar.decode(&[0xFF], order), Value::U64(255));
        assert_eq!(ScalarKind::Bool.decode(&[2], order), Value::Bool(true));
        assert_eq!(ScalarKind::Char.decode(b"A", order), Value::Bytes(b"A".to_vec()));
        assert_eq!(ScalarKind::Pad.decode(&[9], order), Value::None);
        assert_eq!(
            ScalarKind::Double.decode(&300.5f64.to_le_bytes(), order),
            Value::F64(300.5)
        );
        assert_eq!(
            ScalarKind::Float.decode(&1.5f32.to_be_bytes(), ByteOrder::Big),
            Value::F64(1.5)
        );
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            ScalarKind::Double.coerce(Value::I64(3)).unwrap(),
            (Value::F64(3.0), true)
        );
        assert_eq!(
            ScalarKind::Int.coerce(Value::F64(3.9)).unwrap(),
            (Value::I64(3), true)
        );
        assert_eq!(
            ScalarKind::Int.coerce(Value::U64(3)).unwrap(),
            (Value::U64(3), false)
        );
        assert_eq!(
            ScalarKind::Bytes(2).coerce(Value::Str("hi".into())).unwrap(),
            (Value::Bytes(b"hi".to_vec()), true)
        );
        assert!(ScalarKind::Double.coerce(Value::Str("1".into())).is_err());
        assert!(ScalarKind::Int.coerce(Value::F64(f64::NAN)).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ScalarKind::Int.default_value(), Value::I64(0));
        assert_eq!(ScalarKind::UInt.default_value(), Value::U64(0));
        assert_eq!(ScalarKind::Bytes(3).default_value(), Value::Bytes(vec![0; 3]));
        assert_eq!(ScalarKind::Pad.default_value(), Value::None);
    }
}
