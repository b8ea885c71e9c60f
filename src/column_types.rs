// src/column_types.rs

//! Forced column types.
//!
//! Callers can describe forced types in several shapes (typed mapping, a
//! mapping of type-name strings, a full schema, a list of pairs, or JSON).
//! They all normalize into one ordered [`ColumnTypes`] list before a read
//! starts.

use arrow::datatypes::{DataType, Schema, SchemaRef, TimeUnit};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{CsvError, Result};

/// Map a type-describing string onto an Arrow `DataType`.
///
/// Covers:
/// - null                                   → Null
/// - bool, boolean                          → Boolean
/// - int8/tinyint, int16/smallint           → Int8, Int16
/// - int32/int/integer, int64/bigint        → Int32, Int64
/// - uint8 … uint64                         → UInt8 … UInt64
/// - float, float32                         → Float32
/// - double, float64                        → Float64
/// - string, str, utf8                      → Utf8
/// - large_string, large_utf8               → LargeUtf8
/// - binary, large_binary                   → Binary, LargeBinary
/// - date, date32, date32[day]              → Date32
/// - timestamp[s|ms|us|ns]                  → Timestamp(unit, None)
/// - decimal(p, s), decimal128(p, s)        → Decimal128(p, s)
pub fn parse_type_name(name: &str) -> Result<DataType> {
    let lower = name.trim().to_ascii_lowercase();
    let dt = match lower.as_str() {
        "null" => DataType::Null,
        "bool" | "boolean" => DataType::Boolean,
        "int8" | "tinyint" => DataType::Int8,
        "int16" | "smallint" => DataType::Int16,
        "int32" | "int" | "integer" => DataType::Int32,
        "int64" | "bigint" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float" | "float32" => DataType::Float32,
        "double" | "float64" => DataType::Float64,
        "string" | "str" | "utf8" => DataType::Utf8,
        "large_string" | "large_utf8" => DataType::LargeUtf8,
        "binary" => DataType::Binary,
        "large_binary" => DataType::LargeBinary,
        "date" | "date32" | "date32[day]" => DataType::Date32,
        "timestamp" | "timestamp[s]" => DataType::Timestamp(TimeUnit::Second, None),
        "timestamp[ms]" => DataType::Timestamp(TimeUnit::Millisecond, None),
        "timestamp[us]" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "timestamp[ns]" => DataType::Timestamp(TimeUnit::Nanosecond, None),
        other => {
            if let Some(args) = other
                .strip_prefix("decimal128(")
                .or_else(|| other.strip_prefix("decimal("))
                .and_then(|rest| rest.strip_suffix(')'))
            {
                parse_decimal_args(args)
                    .ok_or_else(|| CsvError::configuration(format!("invalid decimal type '{name}'")))?
            } else {
                return Err(CsvError::configuration(format!(
                    "DataType expected, got unknown type name '{name}'"
                )));
            }
        }
    };
    ensure_supported(&dt)?;
    Ok(dt)
}

fn parse_decimal_args(args: &str) -> Option<DataType> {
    let mut parts = args.split(',').map(str::trim);
    let precision: u8 = parts.next()?.parse().ok()?;
    let scale: i8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(DataType::Decimal128(precision, scale))
}

/// Short, Arrow-style display name for a type, used in error messages and
/// when serializing options.
pub fn type_name(dt: &DataType) -> String {
    match dt {
        DataType::Null => "null".into(),
        DataType::Boolean => "bool".into(),
        DataType::Int8 => "int8".into(),
        DataType::Int16 => "int16".into(),
        DataType::Int32 => "int32".into(),
        DataType::Int64 => "int64".into(),
        DataType::UInt8 => "uint8".into(),
        DataType::UInt16 => "uint16".into(),
        DataType::UInt32 => "uint32".into(),
        DataType::UInt64 => "uint64".into(),
        DataType::Float32 => "float".into(),
        DataType::Float64 => "double".into(),
        DataType::Utf8 => "string".into(),
        DataType::LargeUtf8 => "large_string".into(),
        DataType::Binary => "binary".into(),
        DataType::LargeBinary => "large_binary".into(),
        DataType::Date32 => "date32[day]".into(),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => "timestamp[s]".into(),
            TimeUnit::Millisecond => "timestamp[ms]".into(),
            TimeUnit::Microsecond => "timestamp[us]".into(),
            TimeUnit::Nanosecond => "timestamp[ns]".into(),
        },
        DataType::Decimal128(p, s) => format!("decimal128({p}, {s})"),
        other => format!("{other:?}"),
    }
}

/// Reject types the converter cannot produce.
pub(crate) fn ensure_supported(dt: &DataType) -> Result<()> {
    match dt {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::Date32
        | DataType::Timestamp(_, None) => Ok(()),
        DataType::Decimal128(p, s) => {
            if *p == 0 || *p > 38 || *s < 0 || *s as u8 > *p {
                Err(CsvError::configuration(format!(
                    "invalid decimal128 precision/scale ({p}, {s})"
                )))
            } else {
                Ok(())
            }
        }
        other => Err(CsvError::configuration(format!(
            "unsupported column type {other:?}"
        ))),
    }
}

/// The accepted input shapes for forced column types.
#[derive(Debug, Clone)]
pub enum ColumnTypeSpec {
    /// A mapping of column name to type, or an ordered sequence of pairs.
    Types(Vec<(String, DataType)>),
    /// A mapping of column name to a type-describing string.
    Names(Vec<(String, String)>),
    /// A full schema listing names in order.
    Schema(SchemaRef),
    /// A JSON object `{name: "type"}` or an array of `[name, "type"]` pairs.
    Json(Value),
}

/// Normalized, ordered name → type mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTypes {
    entries: Vec<(String, DataType)>,
}

impl ColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// From a typed mapping or list of pairs.
    pub fn from_types<I, K>(types: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, DataType)>,
        K: Into<String>,
    {
        let mut out = Self::new();
        for (name, dt) in types {
            ensure_supported(&dt)?;
            out.insert(name.into(), dt);
        }
        Ok(out)
    }

    /// From a mapping of names to type-describing strings.
    pub fn from_names<I, K, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for (name, ty) in names {
            let dt = parse_type_name(ty.as_ref())?;
            out.insert(name.into(), dt);
        }
        Ok(out)
    }

    pub fn from_schema(schema: &Schema) -> Result<Self> {
        Self::from_types(
            schema
                .fields()
                .iter()
                .map(|f| (f.name().clone(), f.data_type().clone())),
        )
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut out = Self::new();
                for (name, ty) in map {
                    out.insert(name.clone(), json_type(name, ty)?);
                }
                Ok(out)
            }
            Value::Array(items) => {
                let mut out = Self::new();
                for item in items {
                    match item.as_array().map(Vec::as_slice) {
                        Some([Value::String(name), ty]) => {
                            out.insert(name.clone(), json_type(name, ty)?);
                        }
                        _ => {
                            return Err(CsvError::configuration(format!(
                                "column_types: expected a [name, type] pair, got {item}"
                            )))
                        }
                    }
                }
                Ok(out)
            }
            other => Err(CsvError::configuration(format!(
                "column_types: expected a mapping, schema or sequence of pairs, got {other}"
            ))),
        }
    }

    /// Insert or replace; a replaced entry keeps its original position.
    fn insert(&mut self, name: String, dt: DataType) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = dt,
            None => self.entries.push((name, dt)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, dt)| dt)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataType)> {
        self.entries.iter().map(|(n, dt)| (n.as_str(), dt))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_type(name: &str, ty: &Value) -> Result<DataType> {
    match ty {
        Value::String(s) => parse_type_name(s),
        other => Err(CsvError::configuration(format!(
            "column_types['{name}']: DataType expected, got {other}"
        ))),
    }
}

impl TryFrom<ColumnTypeSpec> for ColumnTypes {
    type Error = CsvError;

    fn try_from(spec: ColumnTypeSpec) -> Result<Self> {
        match spec {
            ColumnTypeSpec::Types(types) => Self::from_types(types),
            ColumnTypeSpec::Names(names) => Self::from_names(names),
            ColumnTypeSpec::Schema(schema) => Self::from_schema(&schema),
            ColumnTypeSpec::Json(value) => Self::from_json(&value),
        }
    }
}

impl Serialize for ColumnTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (name, dt) in &self.entries {
            seq.serialize_element(&(name, type_name(dt)))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ColumnTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ColumnTypes::from_json(&value).map_err(D::Error::custom)
    }
}
