// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::path::{Path, PathBuf};
use time::Date;

use crate::{
    ACTIONS_COLUMN, Backend, Choice, ColumnLayout, ColumnLayoutStore, ColumnMeta, CommandConsole,
    ConsoleOutcome, EntityDescriptor, EntityKind, Feedback, FeedbackKind, GridMode, GridView,
    IngestReport, InsertForm, Reconciliation, ReferenceId, ReferenceTable, ResizeGesture, Row,
    RowId, Schema, VisibleColumns, forms, key_column,
};

/// Collaborators the dispatcher talks to for one command.
pub struct Services<'a> {
    pub backend: &'a mut dyn Backend,
    pub layouts: &'a mut dyn ColumnLayoutStore,
    pub today: Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Entity,
    CommandResult,
}

/// The entity currently open in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEntity {
    pub descriptor: EntityDescriptor,
    pub columns: Vec<String>,
    pub metadata: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub grid: GridView,
}

impl ActiveEntity {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_table(&self) -> bool {
        self.descriptor.kind.is_writable()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub schema: Schema,
    pub active: Option<ActiveEntity>,
    pub layout: ColumnLayout,
    pub visible: VisibleColumns,
    pub resize: ResizeGesture,
    pub form: Option<InsertForm>,
    pub console: CommandConsole,
    pub command_result: Option<GridView>,
    pub reconciliation: Reconciliation,
    pub pending_delete: Option<RowId>,
    pub view: View,
    pub status_line: Option<Feedback>,
    export_dir: PathBuf,
}

impl Session {
    pub fn new(reference: ReferenceTable, unmatched: Vec<String>, export_dir: &Path) -> Self {
        Self {
            schema: Schema::default(),
            active: None,
            layout: ColumnLayout::default(),
            visible: VisibleColumns::default(),
            resize: ResizeGesture::default(),
            form: None,
            console: CommandConsole::default(),
            command_result: None,
            reconciliation: Reconciliation::new(reference, unmatched),
            pending_delete: None,
            view: View::Entity,
            status_line: None,
            export_dir: export_dir.to_path_buf(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(ActiveEntity::name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    LoadSchema,
    SelectEntity(String),
    ReloadEntity,
    ToggleColumn(String),
    SetVisibleColumns(Vec<String>),
    ShowAllColumns,
    StartResize { column: String, x: i32 },
    DragResize { x: i32 },
    EndResize,
    /// Keyboard resize: a complete drag of `delta` cells.
    ResizeColumnBy { column: String, delta: i32 },
    OpenInsertForm,
    SetFormValue { column: String, value: String },
    SubmitInsert,
    CloseForm,
    RequestDelete(RowId),
    ConfirmDelete,
    CancelDelete,
    ExecuteCommand(String),
    CloseCommandResult,
    ExportEntity,
    ImportFile(PathBuf),
    BuildPrompt,
    IngestSuggestions(String),
    ConfirmSuggestion { item: usize, choice: Choice },
    SetStatus(Feedback),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    SchemaLoaded { tables: usize, views: usize },
    EntityLoaded { entity: String, rows: usize },
    ColumnsChanged,
    ColumnWidthChanged { column: String, width: u16 },
    ColumnWidthCommitted { column: String, width: u16 },
    FormOpened,
    FormClosed,
    RowInserted,
    DeleteRequested(RowId),
    DeleteCancelled,
    RowDeleted(RowId),
    CommandApplied,
    CommandRows { count: usize },
    Exported(PathBuf),
    Imported,
    PromptReady(String),
    SuggestionsIngested(IngestReport),
    SuggestionConfirmed { item: usize, id: ReferenceId },
    StatusUpdated(Feedback),
    StatusCleared,
    Failed(String),
}

impl Session {
    /// Runs one operator intent. Failures never escape: they become
    /// [`AppEvent::Failed`] plus an error status line.
    pub fn dispatch(&mut self, services: &mut Services<'_>, command: AppCommand) -> Vec<AppEvent> {
        let result = match command {
            AppCommand::LoadSchema => self.load_schema(services),
            AppCommand::SelectEntity(name) => self.select_entity(services, &name),
            AppCommand::ReloadEntity => self.reload_entity(services),
            AppCommand::ToggleColumn(column) => self.toggle_column(&column),
            AppCommand::SetVisibleColumns(columns) => self.set_visible_columns(&columns),
            AppCommand::ShowAllColumns => self.show_all_columns(),
            AppCommand::StartResize { column, x } => self.start_resize(&column, x),
            AppCommand::DragResize { x } => Ok(self.drag_resize(x)),
            AppCommand::EndResize => self.end_resize(services),
            AppCommand::ResizeColumnBy { column, delta } => {
                self.resize_column_by(services, &column, delta)
            }
            AppCommand::OpenInsertForm => self.open_insert_form(services),
            AppCommand::SetFormValue { column, value } => self.set_form_value(&column, &value),
            AppCommand::SubmitInsert => self.submit_insert(services),
            AppCommand::CloseForm => {
                self.form = None;
                Ok(vec![AppEvent::FormClosed])
            }
            AppCommand::RequestDelete(row_id) => self.request_delete(row_id),
            AppCommand::ConfirmDelete => self.confirm_delete(services),
            AppCommand::CancelDelete => {
                self.pending_delete = None;
                Ok(vec![
                    AppEvent::DeleteCancelled,
                    self.set_status(Feedback::info("delete cancelled")),
                ])
            }
            AppCommand::ExecuteCommand(text) => self.execute_command(services, &text),
            AppCommand::CloseCommandResult => {
                self.view = View::Entity;
                Ok(Vec::new())
            }
            AppCommand::ExportEntity => self.export_entity(services),
            AppCommand::ImportFile(path) => self.import_file(services, &path),
            AppCommand::BuildPrompt => self.build_prompt(services),
            AppCommand::IngestSuggestions(raw) => self.ingest_suggestions(services, &raw),
            AppCommand::ConfirmSuggestion { item, choice } => {
                self.confirm_suggestion(services, item, choice)
            }
            AppCommand::SetStatus(feedback) => Ok(vec![self.set_status(feedback)]),
            AppCommand::ClearStatus => {
                self.status_line = None;
                Ok(vec![AppEvent::StatusCleared])
            }
        };

        match result {
            Ok(events) => events,
            Err(error) => {
                let message = format!("{error:#}");
                log::debug!("[DISPATCH] failed: {message}");
                vec![
                    AppEvent::Failed(message.clone()),
                    self.set_status(Feedback::error(message)),
                ]
            }
        }
    }

    fn load_schema(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        self.schema = services.backend.schema()?;
        log::info!(
            "[SCHEMA] {} tables, {} views",
            self.schema.tables.len(),
            self.schema.views.len()
        );
        if let Some(name) = self.active_name()
            && self.schema.find(name).is_none()
        {
            self.active = None;
            self.form = None;
            self.pending_delete = None;
        }
        Ok(vec![AppEvent::SchemaLoaded {
            tables: self.schema.tables.len(),
            views: self.schema.views.len(),
        }])
    }

    fn select_entity(&mut self, services: &mut Services<'_>, name: &str) -> Result<Vec<AppEvent>> {
        let descriptor = self
            .schema
            .find(name)
            .ok_or_else(|| anyhow!("unknown entity {name:?} -- reload the schema and retry"))?;

        let rows = services.backend.rows(name)?;
        let (columns, metadata): (Vec<String>, Vec<ColumnMeta>) = match descriptor.kind {
            EntityKind::Table => {
                let metadata = services.backend.table_info(name)?;
                let columns = metadata.iter().map(|column| column.name.clone()).collect();
                (columns, metadata)
            }
            EntityKind::View => {
                let columns = rows
                    .first()
                    .map(|row| row.columns().map(str::to_owned).collect())
                    .unwrap_or_default();
                (columns, Vec::new())
            }
        };

        let (mode, key) = match descriptor.kind {
            EntityKind::Table => (GridMode::Table, key_column(&metadata)),
            EntityKind::View => (GridMode::ReadOnly, None),
        };
        let mut grid = GridView::build(&columns, &rows, mode, key);

        self.visible = VisibleColumns::all(&columns);
        self.visible.apply(&mut grid);

        self.layout = match services.layouts.load_layout(name) {
            Ok(layout) => layout,
            Err(error) => {
                log::warn!("[LAYOUT] ignoring unreadable widths for {name}: {error:#}");
                ColumnLayout::default()
            }
        };
        self.layout.retain_columns(&columns);
        grid.apply_layout(&self.layout);

        log::debug!("[DATA] {name}: {} rows, {} columns", rows.len(), columns.len());
        let event = AppEvent::EntityLoaded {
            entity: name.to_owned(),
            rows: rows.len(),
        };
        self.active = Some(ActiveEntity {
            descriptor,
            columns,
            metadata,
            rows,
            grid,
        });
        self.resize.cancel();
        self.form = None;
        self.pending_delete = None;
        self.view = View::Entity;
        Ok(vec![event])
    }

    fn reload_entity(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let Some(name) = self.active_name().map(str::to_owned) else {
            return Ok(Vec::new());
        };
        self.select_entity(services, &name)
    }

    fn active(&self) -> Result<&ActiveEntity> {
        self.active
            .as_ref()
            .ok_or_else(|| anyhow!("no entity selected -- pick a table or view first"))
    }

    fn active_table(&self) -> Result<&ActiveEntity> {
        let active = self.active()?;
        if !active.is_table() {
            bail!("{} is a view and is read-only", active.name());
        }
        Ok(active)
    }

    fn toggle_column(&mut self, column: &str) -> Result<Vec<AppEvent>> {
        if column == ACTIONS_COLUMN {
            bail!("the {ACTIONS_COLUMN} column is always shown");
        }
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("no entity selected -- pick a table or view first"))?;
        if !active.columns.iter().any(|name| name == column) {
            bail!("{} has no column {column:?}", active.descriptor.name);
        }
        let shown = self.visible.toggle(column);
        self.visible.apply(&mut active.grid);
        let label = if shown { "shown" } else { "hidden" };
        Ok(vec![
            AppEvent::ColumnsChanged,
            self.set_status(Feedback::info(format!("{column} {label}"))),
        ])
    }

    fn set_visible_columns(&mut self, columns: &[String]) -> Result<Vec<AppEvent>> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("no entity selected -- pick a table or view first"))?;
        self.visible.set_visible(columns);
        self.visible.apply(&mut active.grid);
        Ok(vec![AppEvent::ColumnsChanged])
    }

    fn show_all_columns(&mut self) -> Result<Vec<AppEvent>> {
        let columns = self.active()?.columns.clone();
        let mut events = self.set_visible_columns(&columns)?;
        events.push(self.set_status(Feedback::info("all columns shown")));
        Ok(events)
    }

    fn start_resize(&mut self, column: &str, x: i32) -> Result<Vec<AppEvent>> {
        let active = self.active()?;
        let width = active
            .grid
            .column_width(column)
            .ok_or_else(|| anyhow!("{} has no column {column:?}", active.name()))?;
        if !self.resize.pointer_down(column, x, width) {
            log::debug!("[LAYOUT] ignoring resize of {column}: another drag is active");
        }
        Ok(Vec::new())
    }

    fn drag_resize(&mut self, x: i32) -> Vec<AppEvent> {
        let Some((column, width)) = self.resize.pointer_move(x) else {
            return Vec::new();
        };
        let column = column.to_owned();
        let Some(active) = self.active.as_mut() else {
            self.resize.cancel();
            return Vec::new();
        };
        active.grid.set_column_width(&column, width);
        vec![AppEvent::ColumnWidthChanged { column, width }]
    }

    fn end_resize(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let Some((column, width)) = self.resize.pointer_up() else {
            return Ok(Vec::new());
        };
        let active = self.active()?;
        let entity = active.name().to_owned();
        let columns = active.columns.clone();

        self.layout.set(&column, width);
        self.layout.retain_columns(&columns);
        services
            .layouts
            .save_layout(&entity, &self.layout)
            .with_context(|| format!("save column widths for {entity}"))?;
        log::debug!("[LAYOUT] {entity}.{column} = {width}");
        Ok(vec![AppEvent::ColumnWidthCommitted { column, width }])
    }

    fn resize_column_by(
        &mut self,
        services: &mut Services<'_>,
        column: &str,
        delta: i32,
    ) -> Result<Vec<AppEvent>> {
        if self.resize.is_dragging() {
            return Ok(Vec::new());
        }
        self.start_resize(column, 0)?;
        let mut events = self.drag_resize(delta);
        events.extend(self.end_resize(services)?);
        Ok(events)
    }

    fn open_insert_form(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let table = self.active_table()?.name().to_owned();
        let metadata = services.backend.table_info(&table)?;
        self.form = Some(forms::synthesize(&table, &metadata, services.today));
        Ok(vec![AppEvent::FormOpened])
    }

    fn set_form_value(&mut self, column: &str, value: &str) -> Result<Vec<AppEvent>> {
        let form = self
            .form
            .as_mut()
            .ok_or_else(|| anyhow!("no insert form is open"))?;
        form.set_value(column, value)?;
        Ok(Vec::new())
    }

    fn submit_insert(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let form = self
            .form
            .as_ref()
            .ok_or_else(|| anyhow!("no insert form is open"))?;
        let values = form.submission()?;
        let table = form.table.clone();

        let message = services.backend.insert(&table, &values)?;
        log::info!("[INSERT] {table}: {message}");
        self.form = None;

        let mut events = vec![AppEvent::RowInserted, AppEvent::FormClosed];
        events.extend(self.reload_entity(services)?);
        events.push(self.set_status(Feedback::success(message)));
        Ok(events)
    }

    fn request_delete(&mut self, row_id: RowId) -> Result<Vec<AppEvent>> {
        let table = self.active_table()?.name().to_owned();
        self.pending_delete = Some(row_id.clone());
        Ok(vec![
            AppEvent::DeleteRequested(row_id.clone()),
            self.set_status(Feedback::info(format!(
                "delete row {row_id} from {table}? y to confirm, n to cancel"
            ))),
        ])
    }

    fn confirm_delete(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let table = self.active_table()?.name().to_owned();
        let row_id = self
            .pending_delete
            .take()
            .ok_or_else(|| anyhow!("no delete is pending -- choose a row first"))?;

        let message = services.backend.delete(&table, &row_id)?;
        log::info!("[DELETE] {table} row {row_id}: {message}");

        let mut events = vec![AppEvent::RowDeleted(row_id)];
        events.extend(self.reload_entity(services)?);
        events.push(self.set_status(Feedback::success(message)));
        Ok(events)
    }

    fn execute_command(&mut self, services: &mut Services<'_>, text: &str) -> Result<Vec<AppEvent>> {
        match self.console.execute(services.backend, text)? {
            ConsoleOutcome::Changed { message } => {
                let mut events = vec![AppEvent::CommandApplied];
                events.extend(self.load_schema(services)?);
                events.extend(self.reload_entity(services)?);
                self.view = View::Entity;
                events.push(self.set_status(Feedback::success(message)));
                Ok(events)
            }
            ConsoleOutcome::Rows { grid, count } => {
                self.command_result = Some(grid);
                self.view = View::CommandResult;
                Ok(vec![
                    AppEvent::CommandRows { count },
                    self.set_status(Feedback::success(format!("query returned {count} row(s)"))),
                ])
            }
        }
    }

    fn export_entity(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let entity = self.active()?.name().to_owned();
        let bytes = services.backend.export_entity(&entity)?;
        let path = self.export_dir.join(format!("{entity}_export.xlsx"));
        fs::write(&path, bytes).with_context(|| format!("write export {}", path.display()))?;
        log::info!("[EXPORT] {entity} -> {}", path.display());
        Ok(vec![
            AppEvent::Exported(path.clone()),
            self.set_status(Feedback::success(format!("exported to {}", path.display()))),
        ])
    }

    fn import_file(&mut self, services: &mut Services<'_>, path: &Path) -> Result<Vec<AppEvent>> {
        let table = self.active_table()?.name().to_owned();
        if !path.is_file() {
            bail!(
                "import file {} not found -- choose an existing spreadsheet",
                path.display()
            );
        }
        let contents =
            fs::read(path).with_context(|| format!("read import file {}", path.display()))?;
        if contents.is_empty() {
            bail!("import file {} is empty", path.display());
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "import.xlsx".to_owned());

        let message = services.backend.import_file(&table, &file_name, contents)?;
        log::info!("[IMPORT] {table} <- {}: {message}", path.display());

        let mut events = vec![AppEvent::Imported];
        events.extend(self.reload_entity(services)?);
        events.push(self.set_status(Feedback::success(message)));
        Ok(events)
    }

    fn build_prompt(&mut self, services: &mut Services<'_>) -> Result<Vec<AppEvent>> {
        let prompt = self.reconciliation.prepare_prompt(services.backend)?;
        Ok(vec![
            AppEvent::PromptReady(prompt),
            self.set_status(Feedback::info(format!(
                "prompt ready for {} name(s)",
                self.reconciliation.items.len()
            ))),
        ])
    }

    fn ingest_suggestions(&mut self, services: &mut Services<'_>, raw: &str) -> Result<Vec<AppEvent>> {
        if self.reconciliation.entries.is_empty()
            && let Err(error) = self.reconciliation.refresh_reference(services.backend)
        {
            log::warn!("[RECONCILE] labels fall back to raw ids: {error:#}");
        }
        let report = self.reconciliation.ingest(raw)?;

        let mut message = format!("{} suggestion(s) loaded", report.suggested);
        if report.without_suggestion > 0 {
            message.push_str(&format!(
                "; {} name(s) still without a suggestion",
                report.without_suggestion
            ));
        }
        let kind = if report.suggested > 0 {
            FeedbackKind::Success
        } else {
            FeedbackKind::Info
        };
        Ok(vec![
            AppEvent::SuggestionsIngested(report),
            self.set_status(Feedback { kind, message }),
        ])
    }

    fn confirm_suggestion(
        &mut self,
        services: &mut Services<'_>,
        item: usize,
        choice: Choice,
    ) -> Result<Vec<AppEvent>> {
        let id = self.reconciliation.confirm(services.backend, item, choice)?;
        let name = self.reconciliation.items[item].name.clone();

        let mut events = vec![AppEvent::SuggestionConfirmed { item, id }];
        if self.active_name() == Some(self.reconciliation.reference.entity.as_str()) {
            events.extend(self.reload_entity(services)?);
        }
        events.push(self.set_status(Feedback::success(format!("{name} linked to group {id}"))));
        Ok(events)
    }

    fn set_status(&mut self, feedback: Feedback) -> AppEvent {
        self.status_line = Some(feedback.clone());
        AppEvent::StatusUpdated(feedback)
    }
}
