// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use gridadmin_app::{ColumnLayout, ColumnLayoutStore, MIN_COLUMN_WIDTH, layout_key};
use gridadmin_db::{Store, validate_db_path};
use gridadmin_testkit::temp_db_path;

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:state.db").is_err());
    assert!(validate_db_path("https://example.com/state.sqlite").is_err());
    assert!(validate_db_path("state.sqlite?mode=ro").is_err());
    assert!(validate_db_path("/tmp/gridadmin-state.db").is_ok());
}

#[test]
fn bootstrap_is_idempotent() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.put_setting_raw("theme", "dark")?;
    store.bootstrap()?;

    assert_eq!(store.get_setting_raw("theme")?.as_deref(), Some("dark"));
    Ok(())
}

#[test]
fn bootstrap_rejects_settings_table_missing_columns() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL);")?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    assert!(err.to_string().contains("updated_at"));
    Ok(())
}

#[test]
fn put_setting_overwrites_previous_value() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    store.put_setting_raw("columnWidths_parts", "{\"name\":10}")?;
    store.put_setting_raw("columnWidths_parts", "{\"name\":12}")?;

    let settings = store.list_settings()?;
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].value, "{\"name\":12}");
    Ok(())
}

#[test]
fn column_layout_round_trips_through_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    let mut layout = ColumnLayout::default();
    layout.set("name", 24);
    layout.set("qty", 6);

    {
        let mut store = Store::open(&path)?;
        store.bootstrap()?;
        store.save_layout("parts", &layout)?;
    }

    let mut reopened = Store::open(&path)?;
    reopened.bootstrap()?;
    assert_eq!(reopened.load_layout("parts")?, layout);
    assert_eq!(reopened.load_layout("orders")?, ColumnLayout::default());
    Ok(())
}

#[test]
fn layouts_are_keyed_per_entity() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    let mut layout = ColumnLayout::default();
    layout.set("name", 1);
    store.save_layout("parts", &layout)?;

    let raw = store
        .get_setting_raw(&layout_key("parts"))?
        .expect("layout stored under entity key");
    assert!(raw.contains(&format!("\"name\":{MIN_COLUMN_WIDTH}")));
    Ok(())
}

#[test]
fn unreadable_layout_falls_back_to_defaults() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    store.put_setting_raw(&layout_key("parts"), "not json")?;

    assert!(store.load_layout("parts")?.is_empty());
    Ok(())
}

#[test]
fn saving_empty_layout_clears_the_entry() -> Result<()> {
    let mut store = Store::open_memory()?;
    store.bootstrap()?;
    let mut layout = ColumnLayout::default();
    layout.set("name", 9);
    store.save_layout("parts", &layout)?;

    store.save_layout("parts", &ColumnLayout::default())?;

    assert_eq!(store.get_setting_raw(&layout_key("parts"))?, None);
    Ok(())
}
