use std::collections::BTreeSet;

use crate::value::Value;

/// One unit of data flowing through a pipeline.
///
/// A record is usually an object, but intermediate stage results may be
/// any value (a `map` stage over `.a` produces whatever `.a` holds).
///
/// The `hidden` set carries field names a `hide(...)` stage marked for
/// exclusion. Hidden fields stay present in the value, so downstream
/// stages can still read them; they are only omitted when the record is
/// serialized at the output boundary. The mask is ephemeral pipeline
/// state and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub value: Value,
    pub hidden: BTreeSet<String>,
}

impl Record {
    pub fn new(value: Value) -> Self {
        Record {
            value,
            hidden: BTreeSet::new(),
        }
    }

    /// Replace the value, keeping the hidden mask.
    pub fn with_value(&self, value: Value) -> Self {
        Record {
            value,
            hidden: self.hidden.clone(),
        }
    }

    /// Mark a field as hidden at output time.
    pub fn hide(&mut self, field: &str) {
        self.hidden.insert(field.to_string());
    }

    /// The value with hidden top-level fields removed. What the output
    /// boundary serializes.
    pub fn visible_value(&self) -> Value {
        if self.hidden.is_empty() {
            return self.value.clone();
        }
        match &self.value {
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .filter(|(k, _)| !self.hidden.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record::new(value)
    }
}
