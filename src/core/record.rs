use crate::core::{DataType, PluginError, Result, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.data.insert(name.into(), value);
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Copies the fields named by `schema`; absent fields become null.
    pub fn project(&self, schema: &Schema) -> Record {
        schema
            .fields
            .iter()
            .map(|field| {
                let value = self.data.get(&field.name).cloned().unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect()
    }

    pub fn validate_against_schema(&self, schema: &Schema) -> Result<()> {
        for field in &schema.fields {
            match self.data.get(&field.name) {
                None | Some(Value::Null) if !field.nullable => {
                    return Err(PluginError::Schema(format!(
                        "Required field '{}' is missing",
                        field.name
                    )));
                }
                Some(value) if !value.is_null() && !is_compatible(value, field.data_type) => {
                    return Err(PluginError::Schema(format!(
                        "Field '{}' has incompatible type",
                        field.name
                    )));
                }
                _ => {}
            }
        }

        if let Some(extra) = self.data.keys().find(|name| schema.get_field(name).is_none()) {
            return Err(PluginError::Schema(format!(
                "Field '{}' is not part of the schema",
                extra
            )));
        }
        Ok(())
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::with_data(iter.into_iter().collect())
    }
}

fn is_compatible(value: &Value, expected: DataType) -> bool {
    match (value, expected) {
        (Value::String(_), DataType::String) => true,
        (Value::Number(n), DataType::Integer) => n.is_i64() || n.is_u64(),
        (Value::Number(_), DataType::Float) => true,
        (Value::Bool(_), DataType::Boolean) => true,
        // datetimes and bytes travel as strings (ISO-8601, base64)
        (Value::String(_), DataType::DateTime) => true,
        (Value::String(_), DataType::Bytes) => true,
        (_, DataType::Json) => true,
        _ => false,
    }
}

/// Finishes a record that the host is still building.
pub trait RecordBuilder {
    fn finalize_record(self: Box<Self>) -> Record;
}

impl<F> RecordBuilder for F
where
    F: FnOnce() -> Record,
{
    fn finalize_record(self: Box<Self>) -> Record {
        (*self)()
    }
}

/// Deferred reference to a single record.
///
/// A `Pending` handle is resolved by calling its builder exactly once, on the
/// first read; the result is cached in place and every later read returns it.
pub enum RecordHandle {
    Resolved(Record),
    Pending(Box<dyn RecordBuilder>),
}

impl RecordHandle {
    pub fn pending(builder: impl RecordBuilder + 'static) -> Self {
        Self::Pending(Box::new(builder))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The record, if it has already been resolved.
    pub fn resolved(&self) -> Option<&Record> {
        match self {
            Self::Resolved(record) => Some(record),
            Self::Pending(_) => None,
        }
    }

    pub fn resolve(&mut self) -> &Record {
        if let Self::Pending(_) = self {
            let resolved = match std::mem::replace(self, Self::Resolved(Record::new())) {
                Self::Pending(builder) => builder.finalize_record(),
                Self::Resolved(record) => record,
            };
            *self = Self::Resolved(resolved);
        }

        match self {
            Self::Resolved(record) => record,
            Self::Pending(_) => unreachable!("pending handles are resolved above"),
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Self::Resolved(record) => record,
            Self::Pending(builder) => builder.finalize_record(),
        }
    }
}

impl From<Record> for RecordHandle {
    fn from(record: Record) -> Self {
        Self::Resolved(record)
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(record) => f.debug_tuple("Resolved").field(record).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
