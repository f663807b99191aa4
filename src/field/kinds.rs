use serde_json::{Number, Value};

use super::{ColumnSpec, FieldKind};
use crate::{ErrorDetail, db::SqlValue};

macro_rules! mismatch {
    ($field:expr, $expected:expr, $got:expr) => {
        return Err(ErrorDetail::TypeMismatch {
            field: $field.to_owned(),
            expected: $expected,
            got: $got.clone(),
        })
    };
}

fn single(raw: Vec<SqlValue>) -> SqlValue {
    raw.into_iter().next().unwrap_or(SqlValue::Null)
}

fn raw_as_json(field: &str, raw: SqlValue, expected: &'static str) -> Result<Value, ErrorDetail> {
    match raw {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Ok(Value::from(i)),
        SqlValue::Real(r) => Ok(Number::from_f64(r).map(Value::Number).unwrap_or(Value::Null)),
        SqlValue::Text(s) => Ok(Value::String(s)),
        SqlValue::Blob(_) => Err(ErrorDetail::TypeMismatch {
            field: field.to_owned(),
            expected,
            got: Value::String("<blob>".into()),
        }),
    }
}

pub struct TextKind {
    column_type: &'static str,
}

impl TextKind {
    pub fn short() -> Self {
        Self {
            column_type: "VARCHAR(190)",
        }
    }

    pub fn code() -> Self {
        Self {
            column_type: "VARCHAR(10)",
        }
    }

    pub fn long() -> Self {
        Self {
            column_type: "LONGTEXT",
        }
    }
}

impl FieldKind for TextKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single(self.column_type)
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        match value {
            Value::Null => Ok(vec![SqlValue::Null]),
            Value::String(s) => Ok(vec![SqlValue::Text(s.clone())]),
            _ => mismatch!(field, "string", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        match single(raw) {
            SqlValue::Integer(i) => Ok(Value::String(i.to_string())),
            SqlValue::Real(r) => Ok(Value::String(r.to_string())),
            other => raw_as_json(field, other, "string"),
        }
    }
}

pub struct NumericKind;

impl FieldKind for NumericKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("DOUBLE")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        match value {
            Value::Null => Ok(vec![SqlValue::Null]),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(vec![SqlValue::Integer(i)]),
                None => Ok(vec![n.as_f64().map_or(SqlValue::Null, SqlValue::Real)]),
            },
            Value::String(s) if s.trim().is_empty() => Ok(vec![SqlValue::Null]),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(r) => Ok(vec![SqlValue::Real(r)]),
                Err(_) => mismatch!(field, "number", value),
            },
            _ => mismatch!(field, "number", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        match single(raw) {
            SqlValue::Text(s) => match s.parse::<f64>() {
                Ok(r) => Ok(Number::from_f64(r).map(Value::Number).unwrap_or(Value::Null)),
                Err(_) => mismatch!(field, "number", Value::String(s)),
            },
            other => raw_as_json(field, other, "number"),
        }
    }

    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }
}

pub struct CheckboxKind;

impl FieldKind for CheckboxKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("TINYINT(1)")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        match value {
            Value::Null => Ok(vec![SqlValue::Null]),
            Value::Bool(b) => Ok(vec![SqlValue::Integer(i64::from(*b))]),
            _ => mismatch!(field, "boolean", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        match single(raw) {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Integer(i) => Ok(Value::Bool(i != 0)),
            SqlValue::Real(r) => Ok(Value::Bool(r != 0.0)),
            SqlValue::Text(s) => Ok(Value::Bool(!matches!(s.as_str(), "" | "0" | "false"))),
            SqlValue::Blob(_) => mismatch!(field, "boolean", Value::String("<blob>".into())),
        }
    }
}

pub struct DateKind;

impl FieldKind for DateKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("DATE")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        match value {
            Value::Null => Ok(vec![SqlValue::Null]),
            Value::String(s) => {
                let date = s.parse::<chrono::NaiveDate>().map_err(|_| ErrorDetail::InvalidDate {
                    field: field.to_owned(),
                    value: s.clone(),
                })?;
                Ok(vec![SqlValue::Text(date.to_string())])
            }
            _ => mismatch!(field, "date", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        raw_as_json(field, single(raw), "date")
    }
}

pub struct MultiselectKind;

impl MultiselectKind {
    fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(values) => values.is_empty(),
            _ => false,
        }
    }
}

impl FieldKind for MultiselectKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("TEXT")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        let Value::Array(values) = value else {
            if value.is_null() {
                return Ok(vec![SqlValue::Null]);
            }
            mismatch!(field, "array of strings", value);
        };
        if values.is_empty() {
            return Ok(vec![SqlValue::Null]);
        }
        let mut joined = Vec::with_capacity(values.len());
        for v in values {
            match v {
                Value::String(s) if !s.contains(',') => joined.push(s.as_str()),
                _ => mismatch!(field, "array of strings without commas", value),
            }
        }
        Ok(vec![SqlValue::Text(joined.join(","))])
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        match single(raw) {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Text(s) if s.is_empty() => Ok(Value::Array(Vec::new())),
            SqlValue::Text(s) => Ok(Value::Array(
                s.split(',').map(|v| Value::String(v.to_owned())).collect(),
            )),
            other => raw_as_json(field, other, "array of strings"),
        }
    }

    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        (Self::is_empty(a) && Self::is_empty(b)) || a == b
    }
}

/// Stores structured values as JSON text.
pub struct JsonKind {
    expected: &'static str,
}

impl JsonKind {
    pub fn object() -> Self {
        Self { expected: "object" }
    }

    pub fn array() -> Self {
        Self { expected: "array" }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.expected {
            "object" => value.is_object(),
            _ => value.is_array(),
        }
    }
}

impl FieldKind for JsonKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("TEXT")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        if value.is_null() {
            return Ok(vec![SqlValue::Null]);
        }
        if !self.accepts(value) {
            mismatch!(field, self.expected, value);
        }
        Ok(vec![SqlValue::Text(value.to_string())])
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        match single(raw) {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Text(s) => serde_json::from_str(&s).map_err(|_| ErrorDetail::TypeMismatch {
                field: field.to_owned(),
                expected: self.expected,
                got: Value::String(s),
            }),
            other => raw_as_json(field, other, self.expected),
        }
    }
}

/// Asset reference, stored as the asset id.
pub struct ImageKind;

impl ImageKind {
    fn asset_id(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::Object(map) => map.get("id").and_then(Value::as_i64),
            _ => None,
        }
    }
}

impl FieldKind for ImageKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Single("INTEGER")
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        if value.is_null() {
            return Ok(vec![SqlValue::Null]);
        }
        match Self::asset_id(value) {
            Some(id) => Ok(vec![SqlValue::Integer(id)]),
            None => mismatch!(field, "asset id", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        raw_as_json(field, single(raw), "asset id")
    }

    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        Self::asset_id(a) == Self::asset_id(b)
    }
}

/// Single relation, stored as target id plus target type.
pub struct RelationKind;

impl FieldKind for RelationKind {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec::Set(vec![("id", "INTEGER"), ("type", "VARCHAR(50)")])
    }

    fn encode(&self, field: &str, value: &Value) -> Result<Vec<SqlValue>, ErrorDetail> {
        match value {
            Value::Null => Ok(vec![SqlValue::Null, SqlValue::Null]),
            Value::Object(map) => {
                let Some(id) = map.get("id").and_then(Value::as_i64) else {
                    mismatch!(field, "relation {id, type}", value);
                };
                let ty = map.get("type").and_then(Value::as_str).unwrap_or("object");
                Ok(vec![SqlValue::Integer(id), SqlValue::Text(ty.to_owned())])
            }
            _ => mismatch!(field, "relation {id, type}", value),
        }
    }

    fn decode(&self, field: &str, raw: Vec<SqlValue>) -> Result<Value, ErrorDetail> {
        let mut raw = raw.into_iter();
        let id = raw.next().unwrap_or(SqlValue::Null);
        let ty = raw.next().unwrap_or(SqlValue::Null);
        match (id, ty) {
            (SqlValue::Null, _) => Ok(Value::Null),
            (SqlValue::Integer(id), SqlValue::Text(ty)) => {
                Ok(serde_json::json!({ "id": id, "type": ty }))
            }
            (SqlValue::Integer(id), SqlValue::Null) => {
                Ok(serde_json::json!({ "id": id, "type": "object" }))
            }
            (id, _) => mismatch!(field, "relation {id, type}", raw_as_json(field, id, "relation")?),
        }
    }
}
