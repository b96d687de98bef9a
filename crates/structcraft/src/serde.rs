//! JSON-deserializable schema description.
//!
//! These types describe record layouts as data, for example a protocol definition file shipped with
//! an application. Compile a [SchemaDef] against a registry of already compiled schemas so that
//! nested records, array elements and base records can be referenced by name.
//!
//! Getters, setters, validators, generators and computed lengths are code and can only be attached
//! through [crate::schema::SchemaBuilder]. Scalar fields may still name one of the stock
//! conversions through [TransformDef].

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    errors::CompileError,
    field::{ArrayDef, Element, Field, FieldKind, Length},
    scalar::ScalarKind,
    schema::{Schema, SchemaBuilder},
    transform::{EnumMap, Linear, Text},
    value::{Value, ValueType},
};

/// Byte order of a record.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrderDef {
    Native,
    Little,
    Big,
    Network,
}

/// Top-level description of one record type.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchemaDef {
    pub name: String,
    /// Name of the record type this one derives from.
    #[serde(default)]
    pub base: Option<String>,
    /// Explicit field order; root records only.
    #[serde(default)]
    pub field_order: Option<Vec<String>>,
    #[serde(default)]
    pub byte_order: Option<ByteOrderDef>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKindDef,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKindDef {
    Scalar {
        scalar: ScalarDef,
        #[serde(default)]
        default: Option<serde_json::Value>,
        /// Static value; the field becomes read-only and is verified on decode.
        #[serde(default)]
        value: Option<serde_json::Value>,
        #[serde(default)]
        transform: Option<TransformDef>,
    },
    /// Nested record, by registry name.
    Record { record: String },
    Array {
        element: ElementDef,
        /// Element count or the name of an earlier count field. Absent means greedy.
        #[serde(default)]
        len: Option<LengthDef>,
    },
    Placeholder,
}

/// Scalar wire type; byte strings are written as `{"string": n}`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScalarDef {
    Pad,
    Char,
    Schar,
    Uchar,
    Bool,
    Short,
    Ushort,
    Int,
    Uint,
    Long,
    Ulong,
    Float,
    Double,
    String(usize),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum ElementDef {
    Scalar(ScalarDef),
    Record(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum LengthDef {
    Fixed(usize),
    Field(String),
}

/// Text encoding used when reading byte strings as text.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum EncodingDef {
    Utf8,
    Ascii,
}

/// Stock conversion attached to a scalar field.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TransformDef {
    /// Multiplicative scale applied on read.
    pub scale: Option<f64>,
    /// Additive offset applied after scaling.
    pub offset: Option<f64>,

    pub encoding: Option<EncodingDef>,
    /// Whether text stops at the first zero byte.
    pub zero_terminated: Option<bool>,
    pub trim: Option<bool>,

    /// Integer codes to labels. Keys are decimal strings, as JSON object keys are.
    pub enum_map: Option<HashMap<String, String>>,
}

impl TransformDef {
    fn apply(&self, mut field: Field) -> Result<Field, CompileError> {
        if self.scale.is_some() || self.offset.is_some() {
            field = field.convert(Linear::new(
                self.scale.unwrap_or(1.0),
                self.offset.unwrap_or(0.0),
            ));
        }

        if let Some(encoding) = self.encoding {
            field = field.convert(
                Text::new(encoding.into())
                    .zero_terminated(self.zero_terminated.unwrap_or(false))
                    .trim(self.trim.unwrap_or(false)),
            );
        }

        if let Some(labels) = &self.enum_map {
            let labels = labels
                .iter()
                .map(|(code, label)| {
                    code.trim()
                        .parse::<i64>()
                        .map(|code| (code, label.clone()))
                        .map_err(|_| CompileError::InvalidDefinitionValue(code.clone()))
                })
                .collect::<Result<HashMap<_, _>, _>>()?;
            field = field.convert(EnumMap::new(labels));
        }

        Ok(field)
    }
}

type Registry = HashMap<String, Arc<Schema>>;

fn lookup(registry: &Registry, name: &str) -> Result<Arc<Schema>, CompileError> {
    registry
        .get(name)
        .cloned()
        .ok_or_else(|| CompileError::UnknownRecord(name.to_string()))
}

/// Converts a JSON value to a field value of the given type.
fn json_value(value: &serde_json::Value, ty: ValueType) -> Result<Value, CompileError> {
    let invalid = || CompileError::InvalidDefinitionValue(value.to_string());

    Ok(match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(u), _, _) => Value::U64(u),
            (None, Some(i), _) => Value::I64(i),
            (None, None, Some(f)) => Value::F64(f),
            _ => return Err(invalid()),
        },
        serde_json::Value::String(s) if ty == ValueType::Bytes => Value::Bytes(s.as_bytes().to_vec()),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(
            items
                .iter()
                .map(|item| json_value(item, ty))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(_) => return Err(invalid()),
    })
}

fn scalar_field(
    scalar: ScalarDef,
    default: Option<&serde_json::Value>,
    value: Option<&serde_json::Value>,
    transform: Option<&TransformDef>,
) -> Result<Field, CompileError> {
    let mut field = Field::new(scalar.into());
    if let Some(transform) = transform {
        field = transform.apply(field)?;
    }

    let ty = field.value_type();
    if let Some(default) = default {
        field = field.with_default(json_value(default, ty)?);
    }
    if let Some(value) = value {
        field = field.fixed(json_value(value, ty)?);
    }

    Ok(field)
}

impl FieldKindDef {
    fn compile(&self, registry: &Registry) -> Result<FieldKind, CompileError> {
        Ok(match self {
            FieldKindDef::Scalar {
                scalar,
                default,
                value,
                transform,
            } => FieldKind::Scalar(scalar_field(
                *scalar,
                default.as_ref(),
                value.as_ref(),
                transform.as_ref(),
            )?),
            FieldKindDef::Record { record } => FieldKind::Record(lookup(registry, record)?),
            FieldKindDef::Array { element, len } => {
                let element = match element {
                    ElementDef::Scalar(scalar) => Element::Scalar(Field::new((*scalar).into())),
                    ElementDef::Record(record) => Element::Record(lookup(registry, record)?),
                };
                let length = match len {
                    Some(LengthDef::Fixed(n)) => Length::Fixed(*n),
                    Some(LengthDef::Field(name)) => Length::Field(name.clone()),
                    None => Length::Greedy,
                };
                FieldKind::Array(ArrayDef::new(element, length))
            }
            FieldKindDef::Placeholder => FieldKind::Placeholder,
        })
    }
}

impl SchemaDef {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Compiles the description. Record names are resolved in `registry`.
    pub fn compile(&self, registry: &Registry) -> Result<Arc<Schema>, CompileError> {
        let mut builder = SchemaBuilder::new(&self.name);

        if let Some(base) = &self.base {
            builder = builder.extends(&lookup(registry, base)?);
        }
        if let Some(order) = &self.field_order {
            builder = builder.field_order(order.iter().cloned());
        }
        if let Some(byte_order) = self.byte_order {
            builder = builder.byte_order(byte_order.into());
        }
        for field in &self.fields {
            builder = builder.member(&field.name, field.kind.compile(registry)?);
        }

        builder.compile()
    }
}

/// Compiles `defs` in order; each may reference the ones before it.
pub fn compile_all(defs: &[SchemaDef]) -> Result<Registry, CompileError> {
    let mut registry = Registry::with_capacity(defs.len());
    for def in defs {
        let schema = def.compile(&registry)?;
        registry.insert(def.name.clone(), schema);
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte_order::ByteOrder, errors::Error, record::Record};

    const SHAPES: &str = r#"[
        {
            "name": "Point",
            "byte_order": "little",
            "fields": [
                { "name": "x", "kind": { "type": "scalar", "scalar": "double" } },
                { "name": "y", "kind": { "type": "scalar", "scalar": "double" } }
            ]
        },
        {
            "name": "Path",
            "byte_order": "little",
            "fields": [
                { "name": "magic", "kind": { "type": "scalar", "scalar": { "string": 2 }, "value": "PT" } },
                { "name": "count", "kind": { "type": "scalar", "scalar": "ushort" } },
                { "name": "points", "kind": { "type": "array", "element": { "record": "Point" }, "len": "count" } }
            ]
        }
    ]"#;

    #[test]
    fn test_compile_from_json() {
        let defs: Vec<SchemaDef> = serde_json::from_str(SHAPES).unwrap();
        let registry = compile_all(&defs).unwrap();

        let point = &registry["Point"];
        assert_eq!(point.byte_order(), ByteOrder::Little);
        assert_eq!(point.size(), Some(16));

        let path = &registry["Path"];
        assert_eq!(path.field_order(), ["magic", "count", "points"]);

        let mut data = b"PT".to_vec();
        data.extend(1u16.to_le_bytes());
        data.extend(1.5f64.to_le_bytes());
        data.extend(2.5f64.to_le_bytes());

        let record = Record::from_bytes(path, &data).unwrap();
        assert_eq!(record.array("points").unwrap().len(), 1);
        assert_eq!(record.pack().unwrap(), data);

        data[0] = b'X';
        assert!(matches!(
            Record::from_bytes(path, &data),
            Err(Error::UnpackMismatch { .. })
        ));
    }

    #[test]
    fn test_base_and_placeholder() {
        let base = SchemaDef::from_json(
            r#"{
                "name": "Message",
                "byte_order": "big",
                "fields": [
                    { "name": "id", "kind": { "type": "scalar", "scalar": "uchar", "default": 7 } },
                    { "name": "body", "kind": { "type": "placeholder" } }
                ]
            }"#,
        )
        .unwrap();
        let derived = SchemaDef::from_json(
            r#"{
                "name": "Ping",
                "base": "Message",
                "fields": [
                    { "name": "body", "kind": { "type": "scalar", "scalar": "ushort" } }
                ]
            }"#,
        )
        .unwrap();

        let registry = compile_all(&[base, derived]).unwrap();
        assert!(registry["Message"].is_partial());

        let ping = Record::new(&registry["Ping"]).unwrap();
        ping.set("body", 0x0102).unwrap();
        assert_eq!(ping.pack().unwrap(), vec![7, 0x01, 0x02]);
    }

    #[test]
    fn test_transform() {
        let def = SchemaDef::from_json(
            r#"{
                "name": "Status",
                "byte_order": "network",
                "fields": [
                    {
                        "name": "state",
                        "kind": {
                            "type": "scalar",
                            "scalar": "uchar",
                            "transform": { "enum_map": { "0": "idle", "1": "busy" } }
                        }
                    },
                    {
                        "name": "temperature",
                        "kind": {
                            "type": "scalar",
                            "scalar": "short",
                            "transform": { "scale": 0.5, "offset": -40.0 }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();
        let schema = def.compile(&HashMap::new()).unwrap();

        let record = Record::from_bytes(&schema, &[1, 0x00, 0x64]).unwrap();
        assert_eq!(record.get("state").unwrap(), Value::Str("busy".into()));
        assert_eq!(record.get("temperature").unwrap(), Value::F64(10.0));

        record.set("state", "idle").unwrap();
        assert_eq!(record.pack().unwrap(), vec![0, 0x00, 0x64]);
    }

    #[test]
    fn test_unknown_record() {
        let def = SchemaDef::from_json(
            r#"{
                "name": "Outer",
                "fields": [ { "name": "inner", "kind": { "type": "record", "record": "Missing" } } ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            def.compile(&HashMap::new()).unwrap_err(),
            CompileError::UnknownRecord("Missing".into())
        );
    }

    #[test]
    fn test_invalid_value() {
        let def = SchemaDef::from_json(
            r#"{
                "name": "Bad",
                "fields": [ { "name": "v", "kind": { "type": "scalar", "scalar": "int", "default": { "a": 1 } } } ]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            def.compile(&HashMap::new()),
            Err(CompileError::InvalidDefinitionValue(_))
        ));
    }

    #[test]
    fn test_enum_map_bad_code() {
        let def = SchemaDef::from_json(
            r#"{
                "name": "Bad",
                "fields": [ {
                    "name": "state",
                    "kind": { "type": "scalar", "scalar": "uchar", "transform": { "enum_map": { "one": "busy" } } }
                } ]
            }"#,
        )
        .unwrap();
        match def.compile(&HashMap::new()) {
            Err(CompileError::InvalidDefinitionValue(code)) => assert_eq!(code, "one"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_fixed_scalar_array() {
        let def = SchemaDef::from_json(
            r#"{
                "name": "Samples",
                "byte_order": "little",
                "fields": [
                    { "name": "values", "kind": { "type": "array", "element": { "scalar": "ushort" }, "len": 3 } }
                ]
            }"#,
        )
        .unwrap();
        let schema = def.compile(&HashMap::new()).unwrap();
        assert_eq!(schema.size(), Some(6));

        let record = Record::from_bytes(&schema, &[1, 0, 2, 0, 3, 0]).unwrap();
        assert_eq!(
            record.array("values").unwrap().values(),
            vec![Value::U64(1), Value::U64(2), Value::U64(3)]
        );
    }
}
