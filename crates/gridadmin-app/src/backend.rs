// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use serde_json::{Map, Value};

use crate::{ColumnMeta, CommandOutcome, Row, RowId, Schema};

/// Request/response contract of the data backend.
///
/// Every call is blocking. An `Err` is either a transport failure or a
/// failure the backend reported; in the latter case the error message is the
/// backend's text verbatim. Successful writes return the backend's message.
pub trait Backend {
    fn schema(&mut self) -> Result<Schema>;
    fn rows(&mut self, entity: &str) -> Result<Vec<Row>>;
    fn table_info(&mut self, table: &str) -> Result<Vec<ColumnMeta>>;
    fn insert(&mut self, table: &str, values: &Map<String, Value>) -> Result<String>;
    fn delete(&mut self, table: &str, id: &RowId) -> Result<String>;
    fn execute_command(&mut self, command: &str) -> Result<CommandOutcome>;
    /// Spreadsheet bytes; the format is opaque to the client.
    fn export_entity(&mut self, entity: &str) -> Result<Vec<u8>>;
    fn import_file(&mut self, table: &str, file_name: &str, contents: Vec<u8>) -> Result<String>;
}
