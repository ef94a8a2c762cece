// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Table,
    View,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }

    /// Views only support reading and exporting.
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: EntityKind,
}

impl EntityDescriptor {
    pub fn table(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: EntityKind::Table,
        }
    }

    pub fn view(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: EntityKind::View,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub tables: Vec<String>,
    pub views: Vec<String>,
}

impl Schema {
    /// Tables first, then views, each in backend order.
    pub fn entities(&self) -> Vec<EntityDescriptor> {
        self.tables
            .iter()
            .map(|name| EntityDescriptor::table(name))
            .chain(self.views.iter().map(|name| EntityDescriptor::view(name)))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<EntityDescriptor> {
        if self.tables.iter().any(|table| table == name) {
            return Some(EntityDescriptor::table(name));
        }
        if self.views.iter().any(|view| view == name) {
            return Some(EntityDescriptor::view(name));
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.views.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
}

impl ColumnMeta {
    pub fn new(name: &str, declared_type: &str) -> Self {
        Self {
            name: name.to_owned(),
            declared_type: declared_type.to_owned(),
            nullable: true,
            is_primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// SQLite affinity rules: INT, REAL, FLOA and DOUB declare numeric storage.
    pub fn is_numeric(&self) -> bool {
        let upper = self.declared_type.to_ascii_uppercase();
        ["INT", "REAL", "FLOA", "DOUB"]
            .iter()
            .any(|marker| upper.contains(marker))
    }

    pub fn is_date(&self) -> bool {
        self.declared_type.trim().eq_ignore_ascii_case("DATE")
    }
}

/// Column that addresses rows for delete: the primary key, else `id`, else
/// the first column.
pub fn key_column(columns: &[ColumnMeta]) -> Option<&str> {
    columns
        .iter()
        .find(|column| column.is_primary_key)
        .or_else(|| columns.iter().find(|column| column.name == "id"))
        .or_else(|| columns.first())
        .map(|column| column.name.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Integer(i64::from(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => Self::Integer(integer),
                None => number.as_f64().map_or(Self::Null, Self::Real),
            },
            Value::String(text) => Self::Text(text.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::from(*value),
            Self::Real(value) => {
                serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number)
            }
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integral interpretation, accepting whole reals and numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
                Some(*value as i64)
            }
            Self::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// One backend row; cell order follows the backend's key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: CellValue) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: &str, value: CellValue) {
        if let Some(slot) = self.cells.iter_mut().find(|(name, _)| name == column) {
            slot.1 = value;
        } else {
            self.cells.push((column.to_owned(), value));
        }
    }

    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        Self {
            cells: object
                .iter()
                .map(|(column, value)| (column.clone(), CellValue::from_json(value)))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn identifier(&self, key_column: &str) -> Option<RowId> {
        self.get(key_column)
            .filter(|value| !value.is_null())
            .map(|value| RowId::new(value.display()))
    }
}

/// Opaque row address sent back to the backend for deletes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a raw command: either a change summary or a result set.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Message(String),
    Rows { columns: Vec<String>, rows: Vec<Row> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Info,
    Error,
}

impl FeedbackKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl Feedback {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Error,
            message: message.into(),
        }
    }
}
