//! Client-side form state: values, validation errors and touched fields.
//!
//! No network access. Views feed field events in and read the state back.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

/// A change reported by an input field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEvent {
    pub name: String,
    pub value: Value,
}

impl FieldEvent {
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    initial: BTreeMap<String, Value>,
    values: BTreeMap<String, Value>,
    errors: BTreeMap<String, String>,
    touched: BTreeSet<String>,
}

impl FormState {
    pub fn new(initial: BTreeMap<String, Value>) -> Self {
        Self {
            values: initial.clone(),
            initial,
            errors: BTreeMap::new(),
            touched: BTreeSet::new(),
        }
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    /// Store the field value and mark it touched.
    pub fn handle_change(&mut self, event: &FieldEvent) {
        self.handle_direct_change(&event.name, event.value.clone());
    }

    /// Same as `handle_change`, for values set programmatically.
    pub fn handle_direct_change(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
        self.touched.insert(name.to_string());
    }

    pub fn handle_blur(&mut self, name: &str) {
        self.touched.insert(name.to_string());
    }

    pub fn set_values(&mut self, values: BTreeMap<String, Value>) {
        self.values = values;
    }

    pub fn set_errors(&mut self, errors: BTreeMap<String, String>) {
        self.errors = errors;
    }

    /// Back to the initial values with no errors and nothing touched.
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.errors.clear();
        self.touched.clear();
    }

    /// Serialize the current values as a JSON object (request body).
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone().into_iter().collect())
    }
}
