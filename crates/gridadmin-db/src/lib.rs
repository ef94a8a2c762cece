// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Local preference store. Holds UI state that outlives a session, such as
//! per-entity column widths, in a small SQLite key/value table.

use anyhow::{Context, Result, anyhow, bail};
use gridadmin_app::{ColumnLayout, ColumnLayoutStore, layout_key};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const APP_NAME: &str = "gridadmin";
pub const STATE_PATH_ENV: &str = "GRIDADMIN_STATE_PATH";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const REQUIRED_COLUMNS: &[&str] = &["key", "value", "updated_at"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSetting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open state store at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory state store")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .context("create settings table")?;
        validate_schema(&self.conn)
    }

    pub fn get_setting_raw(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read setting {key}"))
    }

    pub fn put_setting_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("upsert setting {key}"))?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM settings WHERE key = ?", params![key])
            .with_context(|| format!("delete setting {key}"))?;
        Ok(removed > 0)
    }

    pub fn list_settings(&self) -> Result<Vec<StoredSetting>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM settings ORDER BY key ASC")
            .context("prepare settings listing")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredSetting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })
            .context("list settings")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect settings")
    }

    /// Widths saved for `entity`. A value that no longer parses is dropped
    /// with a warning and the entity falls back to intrinsic widths.
    pub fn column_layout(&self, entity: &str) -> Result<ColumnLayout> {
        let key = layout_key(entity);
        let Some(raw) = self.get_setting_raw(&key)? else {
            return Ok(ColumnLayout::default());
        };
        match serde_json::from_str::<ColumnLayout>(&raw) {
            Ok(layout) => Ok(layout),
            Err(error) => {
                log::warn!("[LAYOUT] discarding unreadable {key}: {error}");
                Ok(ColumnLayout::default())
            }
        }
    }

    pub fn put_column_layout(&self, entity: &str, layout: &ColumnLayout) -> Result<()> {
        let key = layout_key(entity);
        if layout.is_empty() {
            self.delete_setting(&key)?;
            return Ok(());
        }
        let raw = serde_json::to_string(layout)
            .with_context(|| format!("encode column widths for {entity}"))?;
        self.put_setting_raw(&key, &raw)
    }
}

impl ColumnLayoutStore for Store {
    fn load_layout(&mut self, entity: &str) -> Result<ColumnLayout> {
        self.column_layout(entity)
    }

    fn save_layout(&mut self, entity: &str, layout: &ColumnLayout) -> Result<()> {
        self.put_column_layout(entity, layout)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(STATE_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set {STATE_PATH_ENV} to a writable state path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("state.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("state path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "state path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("state path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "state path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn validate_schema(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, "settings")?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !columns.contains(*column))
        .collect();
    if !missing.is_empty() {
        bail!(
            "table `settings` is missing required columns: {}; delete the state file to start fresh",
            missing.join(", ")
        );
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}
