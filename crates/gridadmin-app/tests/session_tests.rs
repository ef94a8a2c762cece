// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use gridadmin_app::{
    ACTIONS_COLUMN, AppCommand, AppEvent, CellValue, ColumnLayout, CommandOutcome,
    EMPTY_RESULT_PLACEHOLDER, FeedbackKind, GridBodyRow, MIN_COLUMN_WIDTH, ReferenceTable, Row,
    RowId, Session, View,
};
use gridadmin_testkit::{FakeBackend, MemoryLayouts, services};
use serde_json::json;
use std::path::Path;

fn new_session(export_dir: &Path) -> Session {
    Session::new(ReferenceTable::default(), Vec::new(), export_dir)
}

fn open_parts(
    session: &mut Session,
    backend: &mut FakeBackend,
    layouts: &mut MemoryLayouts,
) -> Vec<AppEvent> {
    let mut services = services(backend, layouts);
    session.dispatch(&mut services, AppCommand::LoadSchema);
    session.dispatch(&mut services, AppCommand::SelectEntity("parts".to_owned()))
}

fn failed(events: &[AppEvent]) -> Option<&str> {
    events.iter().find_map(|event| match event {
        AppEvent::Failed(message) => Some(message.as_str()),
        _ => None,
    })
}

#[test]
fn selecting_a_table_builds_grid_with_actions() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));

    let events = open_parts(&mut session, &mut backend, &mut layouts);

    assert_eq!(
        events,
        vec![AppEvent::EntityLoaded {
            entity: "parts".to_owned(),
            rows: 4,
        }],
    );
    let active = session.active.as_ref().expect("parts is active");
    assert_eq!(
        active.grid.column_names(),
        vec!["id", "name", "qty", ACTIONS_COLUMN]
    );
    assert_eq!(active.grid.data_row_count(), 4);
}

#[test]
fn views_render_read_only_in_first_row_key_order() {
    let rows = vec![
        Row::new()
            .with("total", CellValue::Integer(5))
            .with("name", CellValue::Text("Bolt M6".to_owned())),
    ];
    let mut backend = FakeBackend::new().with_parts().with_view("stock", rows);
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    let mut services = services(&mut backend, &mut layouts);

    session.dispatch(&mut services, AppCommand::LoadSchema);
    session.dispatch(&mut services, AppCommand::SelectEntity("stock".to_owned()));

    let active = session.active.as_ref().expect("stock is active");
    assert_eq!(active.grid.column_names(), vec!["total", "name"]);

    let events = session.dispatch(&mut services, AppCommand::OpenInsertForm);
    assert_eq!(failed(&events), Some("stock is a view and is read-only"));
    assert!(session.form.is_none());
}

#[test]
fn committed_width_survives_a_fresh_render() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    {
        let mut services = services(&mut backend, &mut layouts);
        session.dispatch(
            &mut services,
            AppCommand::StartResize {
                column: "name".to_owned(),
                x: 20,
            },
        );
        let moved = session.dispatch(&mut services, AppCommand::DragResize { x: 30 });
        assert!(matches!(
            moved.as_slice(),
            [AppEvent::ColumnWidthChanged { column, .. }] if column == "name"
        ));
        session.dispatch(&mut services, AppCommand::EndResize);
    }
    let committed = layouts.saved["parts"].get("name").expect("width saved");
    assert_eq!(layouts.saves, 1);

    let mut fresh = new_session(Path::new("."));
    open_parts(&mut fresh, &mut backend, &mut layouts);
    let active = fresh.active.as_ref().expect("parts is active");
    assert_eq!(active.grid.column_width("name"), Some(committed));
}

#[test]
fn uncommitted_drag_is_not_persisted() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    session.dispatch(
        &mut services,
        AppCommand::StartResize {
            column: "qty".to_owned(),
            x: 50,
        },
    );
    session.dispatch(&mut services, AppCommand::DragResize { x: -500 });
    let active = session.active.as_ref().expect("parts is active");
    assert_eq!(active.grid.column_width("qty"), Some(MIN_COLUMN_WIDTH));
    drop(services);

    assert_eq!(layouts.saves, 0);
}

#[test]
fn stale_saved_widths_are_ignored() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut layout = ColumnLayout::default();
    layout.set("qty", 14);
    layout.set("retired", 22);
    layouts.saved.insert("parts".to_owned(), layout);
    let mut session = new_session(Path::new("."));

    let events = open_parts(&mut session, &mut backend, &mut layouts);

    assert!(failed(&events).is_none());
    let active = session.active.as_ref().expect("parts is active");
    assert_eq!(active.grid.column_width("qty"), Some(14));
    assert_eq!(session.layout.get("retired"), None);
}

#[test]
fn keyboard_resize_commits_only_current_columns() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut stale = ColumnLayout::default();
    stale.set("retired", 22);
    layouts.saved.insert("parts".to_owned(), stale);
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    let events = session.dispatch(
        &mut services,
        AppCommand::ResizeColumnBy {
            column: "id".to_owned(),
            delta: 4,
        },
    );
    drop(services);

    assert!(events.contains(&AppEvent::ColumnWidthCommitted {
        column: "id".to_owned(),
        width: 7,
    }));
    let saved = &layouts.saved["parts"];
    assert_eq!(saved.get("id"), Some(7));
    assert_eq!(saved.get("retired"), None);
}

#[test]
fn visibility_resets_on_reload_and_keeps_actions() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    session.dispatch(&mut services, AppCommand::SetVisibleColumns(Vec::new()));
    let grid = &session.active.as_ref().expect("parts is active").grid;
    assert_eq!(grid.is_hidden("name"), Some(true));
    assert_eq!(grid.is_hidden(ACTIONS_COLUMN), Some(false));

    let refused = session.dispatch(
        &mut services,
        AppCommand::ToggleColumn(ACTIONS_COLUMN.to_owned()),
    );
    assert!(failed(&refused).is_some());

    session.dispatch(&mut services, AppCommand::ReloadEntity);
    let grid = &session.active.as_ref().expect("parts is active").grid;
    assert_eq!(grid.is_hidden("name"), Some(false));
}

#[test]
fn insert_submits_coerced_values_and_reloads() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    session.dispatch(&mut services, AppCommand::OpenInsertForm);
    let form = session.form.as_ref().expect("form open");
    assert_eq!(form.fields.len(), 2);

    session.dispatch(
        &mut services,
        AppCommand::SetFormValue {
            column: "name".to_owned(),
            value: "Cotter pin".to_owned(),
        },
    );
    session.dispatch(
        &mut services,
        AppCommand::SetFormValue {
            column: "qty".to_owned(),
            value: "15".to_owned(),
        },
    );
    let events = session.dispatch(&mut services, AppCommand::SubmitInsert);
    drop(services);

    assert!(events.contains(&AppEvent::RowInserted));
    assert!(session.form.is_none());
    assert_eq!(
        backend.inserts,
        vec![(
            "parts".to_owned(),
            json!({"name": "Cotter pin", "qty": 15})
                .as_object()
                .cloned()
                .expect("object literal"),
        )],
    );
    let active = session.active.as_ref().expect("parts is active");
    assert_eq!(active.grid.data_row_count(), 5);
}

#[test]
fn backend_insert_failure_keeps_form_open_with_verbatim_message() {
    let mut backend = FakeBackend::new().with_parts();
    backend.fail("insert", "Поле 'qty' является обязательным");
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    session.dispatch(&mut services, AppCommand::OpenInsertForm);
    session.dispatch(
        &mut services,
        AppCommand::SetFormValue {
            column: "qty".to_owned(),
            value: "1".to_owned(),
        },
    );
    let events = session.dispatch(&mut services, AppCommand::SubmitInsert);

    assert_eq!(failed(&events), Some("Поле 'qty' является обязательным"));
    assert!(session.form.is_some());
    let status = session.status_line.as_ref().expect("status set");
    assert_eq!(status.kind, FeedbackKind::Error);
}

#[test]
fn delete_requires_confirmation() {
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    session.dispatch(&mut services, AppCommand::RequestDelete(RowId::new("2")));
    session.dispatch(&mut services, AppCommand::CancelDelete);
    let events = session.dispatch(&mut services, AppCommand::ConfirmDelete);
    assert!(failed(&events).is_some());

    session.dispatch(&mut services, AppCommand::RequestDelete(RowId::new("2")));
    let events = session.dispatch(&mut services, AppCommand::ConfirmDelete);
    drop(services);

    assert!(events.contains(&AppEvent::RowDeleted(RowId::new("2"))));
    assert_eq!(backend.deletes, vec![("parts".to_owned(), RowId::new("2"))]);
    let active = session.active.as_ref().expect("parts is active");
    assert_eq!(active.grid.data_row_count(), 3);
}

#[test]
fn command_rows_render_read_only_with_placeholder_when_empty() {
    let mut backend = FakeBackend::new().with_parts();
    backend.queue_command(Ok(CommandOutcome::Rows {
        columns: vec!["name".to_owned(), "qty".to_owned()],
        rows: Vec::new(),
    }));
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    let mut services = services(&mut backend, &mut layouts);

    let events = session.dispatch(
        &mut services,
        AppCommand::ExecuteCommand("SELECT name, qty FROM parts WHERE 0".to_owned()),
    );

    assert!(events.contains(&AppEvent::CommandRows { count: 0 }));
    assert_eq!(session.view, View::CommandResult);
    let grid = session.command_result.as_ref().expect("result grid");
    assert_eq!(grid.column_names(), vec!["name", "qty"]);
    assert_eq!(
        grid.body,
        vec![GridBodyRow::Placeholder {
            message: EMPTY_RESULT_PLACEHOLDER.to_owned(),
            span: 2,
        }],
    );
}

#[test]
fn command_rows_have_one_body_row_per_result() {
    let mut backend = FakeBackend::new();
    let rows = gridadmin_testkit::parts_rows();
    backend.queue_command(Ok(CommandOutcome::Rows {
        columns: vec!["id".to_owned(), "name".to_owned(), "qty".to_owned()],
        rows,
    }));
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    let mut services = services(&mut backend, &mut layouts);

    session.dispatch(
        &mut services,
        AppCommand::ExecuteCommand("SELECT * FROM parts".to_owned()),
    );

    let grid = session.command_result.as_ref().expect("result grid");
    assert_eq!(grid.head.len(), 3);
    assert_eq!(grid.data_row_count(), 4);
}

#[test]
fn non_row_command_reloads_schema_and_active_entity() {
    let mut backend = FakeBackend::new().with_parts();
    backend.queue_command(Ok(CommandOutcome::Message("rows changed: 1".to_owned())));
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    open_parts(&mut session, &mut backend, &mut layouts);
    let fetches_before = backend.row_fetches.len();

    let mut services = services(&mut backend, &mut layouts);
    let events = session.dispatch(
        &mut services,
        AppCommand::ExecuteCommand("UPDATE parts SET qty = 0 WHERE id = 1".to_owned()),
    );
    drop(services);

    assert!(events.contains(&AppEvent::CommandApplied));
    assert!(events.iter().any(|event| matches!(event, AppEvent::SchemaLoaded { .. })));
    assert_eq!(backend.row_fetches.len(), fetches_before + 1);
    assert_eq!(session.view, View::Entity);
}

#[test]
fn command_failure_is_shown_verbatim() {
    let mut backend = FakeBackend::new();
    backend.queue_command(Err(
        "Опасные команды \"DROP\" и \"DELETE\" без \"WHERE\" запрещены.".to_owned(),
    ));
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));
    let mut services = services(&mut backend, &mut layouts);

    let events = session.dispatch(
        &mut services,
        AppCommand::ExecuteCommand("DELETE FROM parts".to_owned()),
    );

    assert_eq!(
        failed(&events),
        Some("Опасные команды \"DROP\" и \"DELETE\" без \"WHERE\" запрещены.")
    );
}

#[test]
fn export_writes_spreadsheet_into_export_dir() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut backend = FakeBackend::new().with_parts();
    backend.export_bytes = b"PK\x03\x04sheet".to_vec();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(dir.path());
    open_parts(&mut session, &mut backend, &mut layouts);

    let mut services = services(&mut backend, &mut layouts);
    let events = session.dispatch(&mut services, AppCommand::ExportEntity);

    let path = dir.path().join("parts_export.xlsx");
    assert!(events.contains(&AppEvent::Exported(path.clone())));
    assert_eq!(std::fs::read(path)?, b"PK\x03\x04sheet");
    Ok(())
}

#[test]
fn import_validates_file_before_upload() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut backend = FakeBackend::new().with_parts();
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(dir.path());
    open_parts(&mut session, &mut backend, &mut layouts);

    let missing = dir.path().join("missing.xlsx");
    let sheet = dir.path().join("parts.xlsx");
    std::fs::write(&sheet, b"sheet-bytes")?;

    let mut services = services(&mut backend, &mut layouts);
    let events = session.dispatch(&mut services, AppCommand::ImportFile(missing));
    assert!(failed(&events).is_some_and(|message| message.contains("not found")));

    let events = session.dispatch(&mut services, AppCommand::ImportFile(sheet));
    drop(services);

    assert!(events.contains(&AppEvent::Imported));
    assert_eq!(
        backend.imports,
        vec![("parts".to_owned(), "parts.xlsx".to_owned(), 11)]
    );
    Ok(())
}

#[test]
fn transport_failure_does_not_end_the_session() {
    let mut backend = FakeBackend::new().with_parts();
    backend.fail("rows", "cannot reach http://127.0.0.1:5000/api");
    let mut layouts = MemoryLayouts::default();
    let mut session = new_session(Path::new("."));

    let events = open_parts(&mut session, &mut backend, &mut layouts);
    assert!(failed(&events).is_some());
    assert!(session.active.is_none());

    backend.recover("rows");
    let events = open_parts(&mut session, &mut backend, &mut layouts);
    assert!(failed(&events).is_none());
    assert!(session.active.is_some());
}
