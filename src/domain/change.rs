//! Row-level change events delivered by a remote change feed.

use serde_json::Value;

use super::types::ChangeOperation;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: ChangeOperation,
    /// Row image before the mutation; feeds that only ship primary keys leave this empty.
    pub previous_row: Option<Value>,
    /// Row image after the mutation (`Null` for deletes).
    pub new_row: Value,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new_row: Value) -> Self {
        Self {
            table: table.into(),
            operation: ChangeOperation::Insert,
            previous_row: None,
            new_row,
        }
    }

    pub fn update(table: impl Into<String>, previous_row: Option<Value>, new_row: Value) -> Self {
        Self {
            table: table.into(),
            operation: ChangeOperation::Update,
            previous_row,
            new_row,
        }
    }

    pub fn delete(table: impl Into<String>, previous_row: Value) -> Self {
        Self {
            table: table.into(),
            operation: ChangeOperation::Delete,
            previous_row: Some(previous_row),
            new_row: Value::Null,
        }
    }

    pub fn new_field(&self, field: &str) -> Option<&Value> {
        self.new_row.get(field)
    }

    pub fn previous_field(&self, field: &str) -> Option<&Value> {
        self.previous_row.as_ref().and_then(|row| row.get(field))
    }

    /// Page key of the affected content row, from whichever image carries it.
    pub fn page_key(&self) -> Option<&str> {
        self.new_field("page_key")
            .or_else(|| self.previous_field("page_key"))
            .and_then(Value::as_str)
    }
}
