//! Key-value records exchanged with the storage layer.
//!
//! The storage and wire formats live outside this crate. They hand the core
//! a [`Record`]: a flat set of named fields holding booleans, integers,
//! doubles, strings, nested records and arrays. Reads take a default for
//! missing fields, so older records keep loading as fields are added.

use serde_json::{Map, Number, Value};

use crate::error::{SimError, SimResult};
use crate::types::{Position, SegmentKey};

/// A named-field record backed by a JSON object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> SimResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(SimError::RecordField("<root>".to_string())),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self { fields })
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.fields.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.fields.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.fields.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.fields.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Nested record, empty when missing.
    pub fn get_record(&self, key: &str) -> Record {
        match self.fields.get(key) {
            Some(Value::Object(fields)) => Record {
                fields: fields.clone(),
            },
            _ => Record::new(),
        }
    }

    /// Array of nested records. Non-object entries are skipped.
    pub fn get_records(&self, key: &str) -> Vec<Record> {
        self.array(key)
            .filter_map(|value| match value {
                Value::Object(fields) => Some(Record {
                    fields: fields.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Array of integers. Non-integer entries are skipped.
    pub fn get_i64_array(&self, key: &str) -> Vec<i64> {
        self.array(key).filter_map(Value::as_i64).collect()
    }

    /// Integer field that must be present.
    pub fn require_u64(&self, key: &str) -> SimResult<u64> {
        self.fields
            .get(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| SimError::RecordField(key.to_string()))
    }

    pub fn put_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.fields.insert(key.to_string(), Value::Bool(value));
        self
    }

    pub fn put_i64(&mut self, key: &str, value: i64) -> &mut Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn put_u64(&mut self, key: &str, value: u64) -> &mut Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    /// Non-finite values are written as null and read back as the default.
    pub fn put_f64(&mut self, key: &str, value: f64) -> &mut Self {
        let value = Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn put_str(&mut self, key: &str, value: &str) -> &mut Self {
        self.fields.insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn put_record(&mut self, key: &str, value: Record) -> &mut Self {
        self.fields.insert(key.to_string(), value.into_value());
        self
    }

    pub fn put_records(&mut self, key: &str, values: impl IntoIterator<Item = Record>) -> &mut Self {
        let array = values.into_iter().map(Record::into_value).collect();
        self.fields.insert(key.to_string(), Value::Array(array));
        self
    }

    pub fn put_i64_array(&mut self, key: &str, values: impl IntoIterator<Item = i64>) -> &mut Self {
        let array = values.into_iter().map(Value::from).collect();
        self.fields.insert(key.to_string(), Value::Array(array));
        self
    }

    fn array(&self, key: &str) -> impl Iterator<Item = &Value> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|array| array.iter())
            .into_iter()
            .flatten()
    }
}

/// Types that can be rebuilt from and flattened into a [`Record`].
pub trait Persist: Sized {
    fn from_record(record: &Record) -> SimResult<Self>;

    fn to_record(&self) -> Record;
}

pub(crate) fn position_to_record(position: &Position) -> Record {
    let mut record = Record::new();
    record
        .put_i64("x", position.x)
        .put_i64("y", position.y)
        .put_i64("z", position.z);
    record
}

pub(crate) fn position_from_record(record: &Record) -> Position {
    Position::new(
        record.get_i64("x", 0),
        record.get_i64("y", 0),
        record.get_i64("z", 0),
    )
}

pub(crate) fn segment_to_record(key: &SegmentKey) -> Record {
    let mut record = Record::new();
    record
        .put_record("start", position_to_record(&key.start))
        .put_record("end", position_to_record(&key.end));
    record
}

pub(crate) fn segment_from_record(record: &Record) -> SegmentKey {
    SegmentKey::new(
        position_from_record(&record.get_record("start")),
        position_from_record(&record.get_record("end")),
    )
}
