// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridadmin_app::{
    Backend, CellValue, ColumnLayout, ColumnLayoutStore, ColumnMeta, CommandOutcome, Row, RowId,
    Schema, Services, key_column,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use time::{Date, Month};

const PART_NAMES: [&str; 4] = ["Bolt M6", "Washer 6mm", "Hex nut M6", "Spring pin"];

const REFERENCE_NAMES: [(i64, &str); 4] = [
    (3, "Болт М6"),
    (5, "Шайба 6"),
    (7, "Гайка М6"),
    (7, "Hex nut M6"),
];

pub fn fixture_today() -> Date {
    Date::from_calendar_date(2026, Month::March, 14).unwrap_or(Date::MIN)
}

/// `parts`: integer primary key, free-text name and a required quantity.
pub fn parts_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("id", "INTEGER").primary_key(),
        ColumnMeta::new("name", "TEXT"),
        ColumnMeta::new("qty", "INTEGER").not_null(),
    ]
}

pub fn parts_rows() -> Vec<Row> {
    PART_NAMES
        .iter()
        .zip(1_i64..)
        .map(|(name, id)| {
            Row::new()
                .with("id", CellValue::Integer(id))
                .with("name", CellValue::Text((*name).to_owned()))
                .with("qty", CellValue::Integer(id * 10))
        })
        .collect()
}

pub fn reference_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("id", "INTEGER").not_null(),
        ColumnMeta::new("altname", "TEXT").not_null(),
    ]
}

pub fn reference_rows(entries: &[(i64, &str)]) -> Vec<Row> {
    entries
        .iter()
        .map(|(id, name)| {
            Row::new()
                .with("id", CellValue::Integer(*id))
                .with("altname", CellValue::Text((*name).to_owned()))
        })
        .collect()
}

pub fn default_reference() -> &'static [(i64, &'static str)] {
    &REFERENCE_NAMES
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeTable {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
}

/// In-memory backend that records every write.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    pub tables: BTreeMap<String, FakeTable>,
    pub views: BTreeMap<String, Vec<Row>>,
    pub inserts: Vec<(String, Map<String, Value>)>,
    pub deletes: Vec<(String, RowId)>,
    pub commands: Vec<String>,
    pub command_outcomes: VecDeque<Result<CommandOutcome, String>>,
    pub imports: Vec<(String, String, usize)>,
    pub export_bytes: Vec<u8>,
    pub row_fetches: Vec<String>,
    failures: BTreeMap<&'static str, String>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        self.tables
            .insert(name.to_owned(), FakeTable { columns, rows });
        self
    }

    pub fn with_view(mut self, name: &str, rows: Vec<Row>) -> Self {
        self.views.insert(name.to_owned(), rows);
        self
    }

    pub fn with_parts(self) -> Self {
        self.with_table("parts", parts_columns(), parts_rows())
    }

    pub fn with_reference(self, entries: &[(i64, &str)]) -> Self {
        self.with_table("altnames", reference_columns(), reference_rows(entries))
    }

    /// Makes every later call of `operation` fail with `message`, as the
    /// backend would report it.
    pub fn fail(&mut self, operation: &'static str, message: &str) {
        self.failures.insert(operation, message.to_owned());
    }

    pub fn recover(&mut self, operation: &'static str) {
        self.failures.remove(operation);
    }

    pub fn queue_command(&mut self, outcome: Result<CommandOutcome, String>) {
        self.command_outcomes.push_back(outcome);
    }

    pub fn rows_of(&self, entity: &str) -> Vec<Row> {
        self.tables
            .get(entity)
            .map(|table| table.rows.clone())
            .or_else(|| self.views.get(entity).cloned())
            .unwrap_or_default()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if let Some(message) = self.failures.get(operation) {
            bail!("{message}");
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut FakeTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("Table not found"))
    }
}

impl Backend for FakeBackend {
    fn schema(&mut self) -> Result<Schema> {
        self.check("schema")?;
        Ok(Schema {
            tables: self.tables.keys().cloned().collect(),
            views: self.views.keys().cloned().collect(),
        })
    }

    fn rows(&mut self, entity: &str) -> Result<Vec<Row>> {
        self.check("rows")?;
        self.row_fetches.push(entity.to_owned());
        if !self.tables.contains_key(entity) && !self.views.contains_key(entity) {
            bail!("Table or view not found");
        }
        Ok(self.rows_of(entity))
    }

    fn table_info(&mut self, table: &str) -> Result<Vec<ColumnMeta>> {
        self.check("table_info")?;
        Ok(self.table_mut(table)?.columns.clone())
    }

    fn insert(&mut self, table: &str, values: &Map<String, Value>) -> Result<String> {
        self.check("insert")?;
        let target = self.table_mut(table)?;
        let mut row = Row::new();
        for column in &target.columns {
            let value = values.get(&column.name).map_or(CellValue::Null, CellValue::from_json);
            row.push(&column.name, value);
        }
        if let Some(key) = key_column(&target.columns).map(str::to_owned)
            && target.columns.iter().any(|column| column.is_primary_key)
            && row.get(&key).is_none_or(CellValue::is_null)
        {
            let next = target
                .rows
                .iter()
                .filter_map(|existing| existing.get(&key).and_then(CellValue::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            row.push(&key, CellValue::Integer(next));
        }
        target.rows.push(row);
        self.inserts.push((table.to_owned(), values.clone()));
        Ok("Record added".to_owned())
    }

    fn delete(&mut self, table: &str, id: &RowId) -> Result<String> {
        self.check("delete")?;
        let target = self.table_mut(table)?;
        let key = key_column(&target.columns)
            .map(str::to_owned)
            .context("table has no columns")?;
        target
            .rows
            .retain(|row| row.identifier(&key).as_ref() != Some(id));
        self.deletes.push((table.to_owned(), id.clone()));
        Ok(format!("Row {id} deleted"))
    }

    fn execute_command(&mut self, command: &str) -> Result<CommandOutcome> {
        self.check("execute_command")?;
        self.commands.push(command.to_owned());
        match self.command_outcomes.pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => bail!("{message}"),
            None => Ok(CommandOutcome::Message("rows changed: 0".to_owned())),
        }
    }

    fn export_entity(&mut self, entity: &str) -> Result<Vec<u8>> {
        self.check("export_entity")?;
        if !self.tables.contains_key(entity) && !self.views.contains_key(entity) {
            bail!("Table or view not found");
        }
        Ok(self.export_bytes.clone())
    }

    fn import_file(&mut self, table: &str, file_name: &str, contents: Vec<u8>) -> Result<String> {
        self.check("import_file")?;
        self.table_mut(table)?;
        self.imports
            .push((table.to_owned(), file_name.to_owned(), contents.len()));
        Ok("Imported".to_owned())
    }
}

/// Layout store kept in memory; counts saves for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryLayouts {
    pub saved: BTreeMap<String, ColumnLayout>,
    pub saves: usize,
    pub fail_saves: bool,
}

impl ColumnLayoutStore for MemoryLayouts {
    fn load_layout(&mut self, entity: &str) -> Result<ColumnLayout> {
        Ok(self.saved.get(entity).cloned().unwrap_or_default())
    }

    fn save_layout(&mut self, entity: &str, layout: &ColumnLayout) -> Result<()> {
        if self.fail_saves {
            bail!("layout store is read-only");
        }
        self.saves += 1;
        self.saved.insert(entity.to_owned(), layout.clone());
        Ok(())
    }
}

pub fn services<'a>(backend: &'a mut FakeBackend, layouts: &'a mut MemoryLayouts) -> Services<'a> {
    Services {
        backend,
        layouts,
        today: fixture_today(),
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("gridadmin.db");
    Ok((dir, db_path))
}
