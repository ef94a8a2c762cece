// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use gridadmin_app::{
    ACTIONS_COLUMN, AppCommand, AppEvent, Choice, DELETE_LABEL, EntityKind, Feedback, FeedbackKind,
    GridBodyRow, GridView, InputKind, ItemState, ReconciliationItem, Services, Session, View,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

const STATUS_FADE: Duration = Duration::from_secs(5);
const SIDEBAR_WIDTH: u16 = 26;
const COLUMN_SPACING: u16 = 1;
const PROMPT_FILE: &str = "reconcile_prompt.txt";

/// Supplies the collaborators a command needs. Implemented by the binary over
/// the HTTP client and the SQLite store, and by fakes in tests.
pub trait AppRuntime {
    fn services(&mut self) -> Services<'_>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Focus {
    #[default]
    Sidebar,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ReconcileUiState {
    cursor: usize,
    pasting: bool,
    buffer: String,
    prompt_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Overlay {
    Help,
    Columns { cursor: usize },
    Form { field: usize },
    Console,
    Import { path: String },
    Reconcile(ReconcileUiState),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    focus: Focus,
    sidebar_cursor: usize,
    selected_row: usize,
    selected_col: usize,
    overlay: Option<Overlay>,
    status_token: u64,
    screen: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenLayout {
    sidebar: Rect,
    main: Rect,
    status: Rect,
}

pub fn run_app<R: AppRuntime>(session: &mut Session, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        terminal::EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )
    .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    load_initial_entity(session, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(session, runtime, &mut view_data, &internal_rx);

        match terminal.size() {
            Ok(size) => view_data.screen = Rect::new(0, 0, size.width, size.height),
            Err(error) => {
                result = Err(error).context("read terminal size");
                break;
            }
        }

        if let Err(error) = terminal.draw(|frame| render(frame, session, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(session, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse_event(session, runtime, &mut view_data, &internal_tx, mouse);
                }
                Event::Paste(text) => handle_paste(session, &mut view_data, &text),
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        DisableBracketedPaste,
        DisableMouseCapture,
        terminal::LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    result
}

fn load_initial_entity<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    dispatch(session, runtime, view_data, internal_tx, AppCommand::LoadSchema);
    if let Some(first) = session.schema.entities().into_iter().next() {
        let events = dispatch(
            session,
            runtime,
            view_data,
            internal_tx,
            AppCommand::SelectEntity(first.name),
        );
        if loaded_entity(&events) {
            view_data.focus = Focus::Grid;
        }
    }
}

fn process_internal_events<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                let mut services = runtime.services();
                session.dispatch(&mut services, AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_FADE);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

/// Runs one command and arms the fade timer when it changed the status line.
fn dispatch<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) -> Vec<AppEvent> {
    let events = {
        let mut services = runtime.services();
        session.dispatch(&mut services, command)
    };
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
    clamp_cursors(session, view_data);
    events
}

fn emit_status<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    feedback: Feedback,
) {
    dispatch(
        session,
        runtime,
        view_data,
        internal_tx,
        AppCommand::SetStatus(feedback),
    );
}

fn failed(events: &[AppEvent]) -> bool {
    events
        .iter()
        .any(|event| matches!(event, AppEvent::Failed(_)))
}

fn loaded_entity(events: &[AppEvent]) -> bool {
    events
        .iter()
        .any(|event| matches!(event, AppEvent::EntityLoaded { .. }))
}

fn handle_key_event<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if session.pending_delete.is_some() {
        handle_delete_confirmation_key(session, runtime, view_data, internal_tx, key);
        return false;
    }

    match view_data.overlay {
        Some(Overlay::Help) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
                view_data.overlay = None;
            }
            return false;
        }
        Some(Overlay::Columns { .. }) => {
            handle_columns_key(session, runtime, view_data, internal_tx, key);
            return false;
        }
        Some(Overlay::Form { .. }) => {
            handle_form_key(session, runtime, view_data, internal_tx, key);
            return false;
        }
        Some(Overlay::Console) => {
            handle_console_key(session, runtime, view_data, internal_tx, key);
            return false;
        }
        Some(Overlay::Import { .. }) => {
            handle_import_key(session, runtime, view_data, internal_tx, key);
            return false;
        }
        Some(Overlay::Reconcile(_)) => {
            handle_reconcile_key(session, runtime, view_data, internal_tx, key);
            return false;
        }
        None => {}
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => view_data.overlay = Some(Overlay::Help),
        KeyCode::Tab => {
            view_data.focus = match view_data.focus {
                Focus::Sidebar => Focus::Grid,
                Focus::Grid => Focus::Sidebar,
            };
        }
        KeyCode::Char(':') => view_data.overlay = Some(Overlay::Console),
        KeyCode::Char('r') => {
            view_data.overlay = Some(Overlay::Reconcile(ReconcileUiState::default()));
        }
        KeyCode::Char('g') => {
            dispatch(session, runtime, view_data, internal_tx, AppCommand::LoadSchema);
            dispatch(session, runtime, view_data, internal_tx, AppCommand::ReloadEntity);
        }
        KeyCode::Char('c') if session.active.is_some() && session.view == View::Entity => {
            view_data.overlay = Some(Overlay::Columns { cursor: 0 });
        }
        KeyCode::Char('a') => {
            let events = dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::OpenInsertForm,
            );
            if events.contains(&AppEvent::FormOpened) {
                view_data.overlay = Some(Overlay::Form { field: 0 });
            }
        }
        KeyCode::Char('e') => {
            dispatch(session, runtime, view_data, internal_tx, AppCommand::ExportEntity);
        }
        KeyCode::Char('i') => {
            view_data.overlay = Some(Overlay::Import {
                path: String::new(),
            });
        }
        _ => match view_data.focus {
            Focus::Sidebar => handle_sidebar_key(session, runtime, view_data, internal_tx, key),
            Focus::Grid => handle_grid_key(session, runtime, view_data, internal_tx, key),
        },
    }
    false
}

fn handle_sidebar_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let entities = session.schema.entities();
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            if view_data.sidebar_cursor + 1 < entities.len() {
                view_data.sidebar_cursor += 1;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.sidebar_cursor = view_data.sidebar_cursor.saturating_sub(1);
        }
        KeyCode::Enter => {
            let Some(entity) = entities.get(view_data.sidebar_cursor) else {
                return;
            };
            let events = dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::SelectEntity(entity.name.clone()),
            );
            if loaded_entity(&events) {
                view_data.focus = Focus::Grid;
                view_data.selected_row = 0;
                view_data.selected_col = 0;
            }
        }
        _ => {}
    }
}

fn handle_grid_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(grid) = current_grid(session) else {
        return;
    };
    let row_count = grid.data_row_count();
    let visible: Vec<String> = grid
        .visible_headers()
        .map(|header| header.column.clone())
        .collect();
    let row_id = grid.row_id(view_data.selected_row).cloned();
    let selected_column = visible.get(view_data.selected_col).cloned();

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            if view_data.selected_row + 1 < row_count {
                view_data.selected_row += 1;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.selected_row = view_data.selected_row.saturating_sub(1);
        }
        KeyCode::Char('l') | KeyCode::Right => {
            if view_data.selected_col + 1 < visible.len() {
                view_data.selected_col += 1;
            }
        }
        KeyCode::Char('h') | KeyCode::Left => {
            view_data.selected_col = view_data.selected_col.saturating_sub(1);
        }
        KeyCode::Char('<') | KeyCode::Char('>') if session.view == View::Entity => {
            let Some(column) = selected_column else {
                return;
            };
            let delta = if key.code == KeyCode::Char('<') { -1 } else { 1 };
            dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::ResizeColumnBy { column, delta },
            );
        }
        KeyCode::Esc if session.view == View::CommandResult => {
            dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::CloseCommandResult,
            );
        }
        KeyCode::Char('d') | KeyCode::Enter if session.view == View::Entity => {
            if key.code == KeyCode::Enter && selected_column.as_deref() != Some(ACTIONS_COLUMN) {
                return;
            }
            match row_id {
                Some(row_id) => {
                    dispatch(
                        session,
                        runtime,
                        view_data,
                        internal_tx,
                        AppCommand::RequestDelete(row_id),
                    );
                }
                None if row_count > 0 => emit_status(
                    session,
                    runtime,
                    view_data,
                    internal_tx,
                    Feedback::error("this row has no identifier and cannot be deleted"),
                ),
                None => {}
            }
        }
        _ => {}
    }
}

fn handle_delete_confirmation_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let command = match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => AppCommand::ConfirmDelete,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => AppCommand::CancelDelete,
        _ => return,
    };
    dispatch(session, runtime, view_data, internal_tx, command);
}

fn column_choices(session: &Session) -> Vec<String> {
    session
        .active
        .as_ref()
        .map(|active| {
            active
                .columns
                .iter()
                .filter(|column| column.as_str() != ACTIONS_COLUMN)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn handle_columns_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(Overlay::Columns { cursor }) = view_data.overlay else {
        return;
    };
    let choices = column_choices(session);
    match key.code {
        KeyCode::Esc | KeyCode::Char('c') => view_data.overlay = None,
        KeyCode::Char('j') | KeyCode::Down => {
            let next = (cursor + 1).min(choices.len().saturating_sub(1));
            view_data.overlay = Some(Overlay::Columns { cursor: next });
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.overlay = Some(Overlay::Columns {
                cursor: cursor.saturating_sub(1),
            });
        }
        KeyCode::Char(' ') | KeyCode::Enter => {
            if let Some(column) = choices.get(cursor) {
                dispatch(
                    session,
                    runtime,
                    view_data,
                    internal_tx,
                    AppCommand::ToggleColumn(column.clone()),
                );
            }
        }
        KeyCode::Char('a') => {
            dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::ShowAllColumns,
            );
        }
        _ => {}
    }
}

fn handle_form_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(Overlay::Form { field }) = view_data.overlay else {
        return;
    };
    let Some(form) = session.form.as_ref() else {
        view_data.overlay = None;
        return;
    };
    let field_count = form.fields.len();
    let Some(current) = form.fields.get(field).cloned() else {
        if key.code == KeyCode::Esc {
            close_form(session, runtime, view_data, internal_tx);
        } else if key.code == KeyCode::Enter {
            submit_form(session, runtime, view_data, internal_tx);
        }
        return;
    };

    match key.code {
        KeyCode::Esc => close_form(session, runtime, view_data, internal_tx),
        KeyCode::Enter => submit_form(session, runtime, view_data, internal_tx),
        KeyCode::Tab | KeyCode::Down => {
            view_data.overlay = Some(Overlay::Form {
                field: (field + 1) % field_count.max(1),
            });
        }
        KeyCode::BackTab | KeyCode::Up => {
            view_data.overlay = Some(Overlay::Form {
                field: (field + field_count.max(1) - 1) % field_count.max(1),
            });
        }
        KeyCode::Left | KeyCode::Right if matches!(current.kind, InputKind::Select(_)) => {
            if let Some(form) = session.form.as_mut() {
                form.cycle_option(&current.column);
            }
        }
        KeyCode::Backspace if !matches!(current.kind, InputKind::Select(_)) => {
            let mut value = current.value;
            value.pop();
            set_form_value(session, runtime, view_data, internal_tx, current.column, value);
        }
        KeyCode::Char(ch) if !matches!(current.kind, InputKind::Select(_)) => {
            let mut value = current.value;
            value.push(ch);
            set_form_value(session, runtime, view_data, internal_tx, current.column, value);
        }
        _ => {}
    }
}

fn set_form_value<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: String,
    value: String,
) {
    dispatch(
        session,
        runtime,
        view_data,
        internal_tx,
        AppCommand::SetFormValue { column, value },
    );
}

fn close_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    dispatch(session, runtime, view_data, internal_tx, AppCommand::CloseForm);
    view_data.overlay = None;
}

fn submit_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = dispatch(session, runtime, view_data, internal_tx, AppCommand::SubmitInsert);
    if events.contains(&AppEvent::RowInserted) {
        view_data.overlay = None;
    }
}

fn handle_console_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => view_data.overlay = None,
        KeyCode::Up => session.console.recall_previous(),
        KeyCode::Down => session.console.recall_next(),
        KeyCode::Backspace => {
            session.console.input.pop();
        }
        KeyCode::Char(ch) => session.console.input.push(ch),
        KeyCode::Enter => {
            let text = session.console.input.clone();
            let events = dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::ExecuteCommand(text),
            );
            if failed(&events) {
                return;
            }
            session.console.input.clear();
            view_data.overlay = None;
            if events
                .iter()
                .any(|event| matches!(event, AppEvent::CommandRows { .. }))
            {
                view_data.focus = Focus::Grid;
                view_data.selected_row = 0;
                view_data.selected_col = 0;
            }
        }
        _ => {}
    }
}

fn handle_import_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(Overlay::Import { path }) = view_data.overlay.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => view_data.overlay = None,
        KeyCode::Backspace => {
            path.pop();
        }
        KeyCode::Char(ch) => path.push(ch),
        KeyCode::Enter => {
            let target = PathBuf::from(path.trim());
            let events = dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::ImportFile(target),
            );
            if events.contains(&AppEvent::Imported) {
                view_data.overlay = None;
            }
        }
        _ => {}
    }
}

fn handle_reconcile_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(Overlay::Reconcile(ui)) = view_data.overlay.as_mut() else {
        return;
    };

    if ui.pasting {
        match key.code {
            KeyCode::Esc => {
                ui.pasting = false;
                ui.buffer.clear();
            }
            KeyCode::Backspace => {
                ui.buffer.pop();
            }
            KeyCode::Char(ch) => ui.buffer.push(ch),
            KeyCode::Enter => {
                let raw = std::mem::take(&mut ui.buffer);
                let events = dispatch(
                    session,
                    runtime,
                    view_data,
                    internal_tx,
                    AppCommand::IngestSuggestions(raw.clone()),
                );
                if let Some(Overlay::Reconcile(ui)) = view_data.overlay.as_mut() {
                    if failed(&events) {
                        ui.buffer = raw;
                    } else {
                        ui.pasting = false;
                    }
                }
            }
            _ => {}
        }
        return;
    }

    let item_count = session.reconciliation.items.len();
    let cursor = ui.cursor;
    match key.code {
        KeyCode::Esc | KeyCode::Char('r') => view_data.overlay = None,
        KeyCode::Char('j') | KeyCode::Down => {
            ui.cursor = (cursor + 1).min(item_count.saturating_sub(1));
        }
        KeyCode::Char('k') | KeyCode::Up => ui.cursor = cursor.saturating_sub(1),
        KeyCode::Char('v') => {
            ui.pasting = true;
            ui.buffer.clear();
        }
        KeyCode::Char('p') => {
            let events = dispatch(session, runtime, view_data, internal_tx, AppCommand::BuildPrompt);
            let prompt = events.iter().find_map(|event| match event {
                AppEvent::PromptReady(prompt) => Some(prompt.clone()),
                _ => None,
            });
            if let Some(prompt) = prompt {
                save_prompt(session, runtime, view_data, internal_tx, &prompt);
            }
        }
        KeyCode::Char('n') => confirm_item(
            session,
            runtime,
            view_data,
            internal_tx,
            cursor,
            Choice::CreateNew,
        ),
        KeyCode::Char(digit @ '1'..='3') => {
            let slot = usize::from(digit as u8 - b'1');
            confirm_item(
                session,
                runtime,
                view_data,
                internal_tx,
                cursor,
                Choice::Alternative(slot),
            );
        }
        _ => {}
    }
}

fn save_prompt<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    prompt: &str,
) {
    let path = session.export_dir().join(PROMPT_FILE);
    let feedback = match fs::write(&path, prompt) {
        Ok(()) => {
            log::info!("[RECONCILE] prompt written to {}", path.display());
            if let Some(Overlay::Reconcile(ui)) = view_data.overlay.as_mut() {
                ui.prompt_path = Some(path.clone());
            }
            Feedback::success(format!("prompt saved to {}", path.display()))
        }
        Err(error) => Feedback::error(format!(
            "write prompt {}: {error} -- fix [storage].export_dir",
            path.display()
        )),
    };
    emit_status(session, runtime, view_data, internal_tx, feedback);
}

fn confirm_item<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    item: usize,
    choice: Choice,
) {
    if item >= session.reconciliation.items.len() {
        return;
    }
    dispatch(
        session,
        runtime,
        view_data,
        internal_tx,
        AppCommand::ConfirmSuggestion { item, choice },
    );
}

fn handle_paste(session: &mut Session, view_data: &mut ViewData, text: &str) {
    match view_data.overlay.as_mut() {
        Some(Overlay::Reconcile(ui)) if ui.pasting => ui.buffer.push_str(text),
        Some(Overlay::Console) => session.console.input.push_str(text.trim_end_matches('\n')),
        Some(Overlay::Import { path }) => path.push_str(text.trim()),
        _ => {}
    }
}

fn handle_mouse_event<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
) {
    if view_data.overlay.is_some()
        || session.pending_delete.is_some()
        || session.view != View::Entity
    {
        return;
    }
    let x = i32::from(mouse.column);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let main = screen_layout(view_data.screen).main;
            let column = session
                .active
                .as_ref()
                .and_then(|active| header_border_at(&active.grid, main, mouse.column, mouse.row));
            if let Some(column) = column {
                dispatch(
                    session,
                    runtime,
                    view_data,
                    internal_tx,
                    AppCommand::StartResize { column, x },
                );
            }
        }
        MouseEventKind::Drag(MouseButton::Left) if session.resize.is_dragging() => {
            dispatch(
                session,
                runtime,
                view_data,
                internal_tx,
                AppCommand::DragResize { x },
            );
        }
        MouseEventKind::Up(MouseButton::Left) if session.resize.is_dragging() => {
            dispatch(session, runtime, view_data, internal_tx, AppCommand::EndResize);
        }
        _ => {}
    }
}

/// Column whose right header border sits under the pointer.
fn header_border_at(grid: &GridView, area: Rect, x: u16, y: u16) -> Option<String> {
    let inner = Block::default().borders(Borders::ALL).inner(area);
    if y != inner.y {
        return None;
    }
    let mut right = inner.x;
    for header in grid.visible_headers() {
        right = right.saturating_add(header.effective_width());
        if x == right || x.saturating_add(1) == right {
            return Some(header.column.clone());
        }
        right = right.saturating_add(COLUMN_SPACING);
    }
    None
}

fn current_grid(session: &Session) -> Option<&GridView> {
    match session.view {
        View::CommandResult => session.command_result.as_ref(),
        View::Entity => session.active.as_ref().map(|active| &active.grid),
    }
}

fn clamp_cursors(session: &Session, view_data: &mut ViewData) {
    let entities = session.schema.entities().len();
    view_data.sidebar_cursor = view_data.sidebar_cursor.min(entities.saturating_sub(1));
    if let Some(grid) = current_grid(session) {
        view_data.selected_row = view_data
            .selected_row
            .min(grid.data_row_count().saturating_sub(1));
        view_data.selected_col = view_data
            .selected_col
            .min(grid.visible_headers().count().saturating_sub(1));
    } else {
        view_data.selected_row = 0;
        view_data.selected_col = 0;
    }
    if let Some(Overlay::Reconcile(ui)) = view_data.overlay.as_mut() {
        ui.cursor = ui
            .cursor
            .min(session.reconciliation.items.len().saturating_sub(1));
    }
}

fn screen_layout(area: Rect) -> ScreenLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(rows[0]);
    ScreenLayout {
        sidebar: columns[0],
        main: columns[1],
        status: rows[1],
    }
}

fn render(frame: &mut ratatui::Frame<'_>, session: &Session, view_data: &ViewData) {
    let layout = screen_layout(frame.area());

    render_sidebar(frame, layout.sidebar, session, view_data);

    match (session.view, current_grid(session)) {
        (View::CommandResult, Some(grid)) => {
            render_grid(frame, layout.main, grid, "query result".to_owned(), view_data);
        }
        (View::Entity, Some(grid)) => {
            let title = session
                .active
                .as_ref()
                .map(|active| {
                    let kind = match active.descriptor.kind {
                        EntityKind::Table => "table",
                        EntityKind::View => "view, read-only",
                    };
                    format!("{} ({kind})", active.name())
                })
                .unwrap_or_default();
            render_grid(frame, layout.main, grid, title, view_data);
        }
        (_, None) => {
            let empty = Paragraph::new("select a table or view")
                .block(Block::default().borders(Borders::ALL).title("gridadmin"));
            frame.render_widget(empty, layout.main);
        }
    }

    let (text, color) = status_text(session, view_data);
    let status_widget = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout.status);

    if let Some(row_id) = &session.pending_delete {
        let area = centered_rect(44, 20, frame.area());
        frame.render_widget(Clear, area);
        let confirm = Paragraph::new(format!(
            "delete row {row_id}?\n\ny confirm | n cancel"
        ))
        .block(
            Block::default()
                .title("confirm delete")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Red)),
        );
        frame.render_widget(confirm, area);
    }

    let Some(overlay) = &view_data.overlay else {
        return;
    };
    let (title, text, percent_x, percent_y) = match overlay {
        Overlay::Help => ("help", help_overlay_text().to_owned(), 70, 60),
        Overlay::Columns { cursor } => (
            "columns",
            render_columns_overlay_text(session, *cursor),
            44,
            60,
        ),
        Overlay::Form { field } => ("add row", render_form_overlay_text(session, *field), 64, 60),
        Overlay::Console => ("command", render_console_overlay_text(session), 80, 40),
        Overlay::Import { path } => (
            "import spreadsheet",
            format!("file: {path}_\n\nenter upload | esc cancel"),
            60,
            24,
        ),
        Overlay::Reconcile(ui) => ("reconcile", render_reconcile_overlay_text(session, ui), 84, 80),
    };
    let area = centered_rect(percent_x, percent_y, frame.area());
    frame.render_widget(Clear, area);
    let widget = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn render_sidebar(frame: &mut ratatui::Frame<'_>, area: Rect, session: &Session, view_data: &ViewData) {
    let focused = view_data.focus == Focus::Sidebar && view_data.overlay.is_none();
    let lines = session
        .schema
        .entities()
        .into_iter()
        .enumerate()
        .map(|(index, entity)| {
            let marker = if index == view_data.sidebar_cursor && focused {
                "> "
            } else {
                "  "
            };
            let suffix = match entity.kind {
                EntityKind::Table => "",
                EntityKind::View => " (view)",
            };
            let mut style = Style::default();
            if session.active_name() == Some(entity.name.as_str()) {
                style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
            }
            Line::from(Span::styled(format!("{marker}{}{suffix}", entity.name), style))
        })
        .collect::<Vec<_>>();

    let border = if focused { Color::Cyan } else { Color::White };
    let sidebar = Paragraph::new(lines).block(
        Block::default()
            .title("entities")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border)),
    );
    frame.render_widget(sidebar, area);
}

fn render_grid(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    grid: &GridView,
    title: String,
    view_data: &ViewData,
) {
    let focused = view_data.focus == Focus::Grid && view_data.overlay.is_none();
    let border = if focused { Color::Cyan } else { Color::White };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);

    let headers = grid.visible_headers().collect::<Vec<_>>();
    let widths = headers
        .iter()
        .map(|header| Constraint::Length(header.effective_width()))
        .collect::<Vec<_>>();
    let header = Row::new(headers.iter().map(|header| {
        Cell::from(header.label.clone()).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let mut placeholder = None;
    let mut data_index = 0;
    let mut rows = Vec::with_capacity(grid.body.len());
    for body_row in &grid.body {
        match body_row {
            GridBodyRow::Placeholder { message, .. } => placeholder = Some(message.as_str()),
            GridBodyRow::Data { cells, .. } => {
                let selected_row = focused && data_index == view_data.selected_row;
                let cells = cells
                    .iter()
                    .filter(|cell| !cell.hidden)
                    .enumerate()
                    .map(|(column_index, cell)| {
                        let text = if cell.action.is_some() {
                            DELETE_LABEL.to_owned()
                        } else {
                            cell.value.display()
                        };
                        let mut style = Style::default();
                        if cell.action.is_some() {
                            style = style.fg(Color::Red);
                        }
                        if selected_row {
                            style = style.bg(Color::DarkGray);
                        }
                        if selected_row && column_index == view_data.selected_col {
                            style = Style::default()
                                .fg(Color::Black)
                                .bg(Color::Cyan)
                                .add_modifier(Modifier::BOLD);
                        }
                        Cell::from(text).style(style)
                    })
                    .collect::<Vec<_>>();
                rows.push(Row::new(cells));
                data_index += 1;
            }
        }
    }

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(COLUMN_SPACING)
        .flex(Flex::Start)
        .block(block);
    frame.render_widget(table, area);

    if let Some(message) = placeholder
        && inner.height > 1
    {
        let line = Rect::new(inner.x, inner.y + 1, inner.width, 1);
        let widget = Paragraph::new(message).style(Style::default().fg(Color::DarkGray));
        frame.render_widget(widget, line);
    }
}

fn render_columns_overlay_text(session: &Session, cursor: usize) -> String {
    let Some(active) = &session.active else {
        return String::new();
    };
    let mut lines = column_choices(session)
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let marker = if index == cursor { ">" } else { " " };
            let check = if session.visible.contains(column) {
                "[x]"
            } else {
                "[ ]"
            };
            let hidden = active.grid.is_hidden(column).unwrap_or(false);
            let width = active
                .grid
                .column_width(column)
                .map(|width| format!("  width {width}"))
                .unwrap_or_default();
            let note = if hidden { "" } else { width.as_str() };
            format!("{marker} {check} {column}{note}")
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("space toggle | a show all | esc close".to_owned());
    lines.join("\n")
}

fn render_form_overlay_text(session: &Session, selected: usize) -> String {
    let Some(form) = &session.form else {
        return String::new();
    };
    let mut lines = vec![format!("new row in {}", form.table), String::new()];
    if form.fields.is_empty() {
        lines.push("no editable columns".to_owned());
    }
    for (index, field) in form.fields.iter().enumerate() {
        let marker = if index == selected { ">" } else { " " };
        let value = match &field.kind {
            InputKind::Select(_) => format!("< {} >", field.value),
            _ if index == selected => format!("{}_", field.value),
            _ => field.value.clone(),
        };
        lines.push(format!(
            "{marker} {} [{}]: {value}",
            field.display_label(),
            field.kind.label()
        ));
    }
    lines.push(String::new());
    lines.push("tab/shift+tab field | left/right choose | enter save | esc cancel".to_owned());
    lines.join("\n")
}

fn render_console_overlay_text(session: &Session) -> String {
    format!(
        "> {}_\n\nenter run | up/down history | esc close",
        session.console.input
    )
}

fn render_reconcile_overlay_text(session: &Session, ui: &ReconcileUiState) -> String {
    let work = &session.reconciliation;
    let mut lines = vec![format!(
        "reference: {} ({}, {})",
        work.reference.entity, work.reference.id_column, work.reference.name_column
    )];
    if let Some(path) = &ui.prompt_path {
        lines.push(format!("prompt: {}", path.display()));
    }
    lines.push(String::new());

    if work.items.is_empty() {
        lines.push("no unmatched names configured".to_owned());
    }
    for (index, item) in work.items.iter().enumerate() {
        let marker = if index == ui.cursor { ">" } else { " " };
        lines.push(format!("{marker} {} [{}]", item.name, item.state.label()));
        lines.extend(reconcile_item_detail(item));
    }

    lines.push(String::new());
    if ui.pasting {
        lines.push(format!("paste suggestions, then enter:\n{}_", ui.buffer));
        lines.push("esc cancel".to_owned());
    } else {
        lines.push(
            "p prompt | v paste suggestions | 1-3 accept | n new group | j/k move | esc close"
                .to_owned(),
        );
    }
    lines.join("\n")
}

fn reconcile_item_detail(item: &ReconciliationItem) -> Vec<String> {
    let mut lines = Vec::new();
    match &item.state {
        ItemState::Pending => {}
        ItemState::Confirmed { id } => lines.push(format!("    linked to group {id}")),
        ItemState::Suggested { no_match: true, .. } => {
            lines.push("    no similar group; n creates a new one".to_owned());
        }
        ItemState::Suggested { alternatives, .. } => {
            for (slot, alternative) in alternatives.iter().enumerate() {
                let confidence = if alternative.confidence.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", alternative.confidence)
                };
                lines.push(format!(
                    "    {}. {} [id {}]{confidence}",
                    slot + 1,
                    alternative.label,
                    alternative.suggested_id
                ));
            }
            lines.push("    n. create new group".to_owned());
        }
    }
    if let Some(error) = &item.error {
        lines.push(format!("    error: {error}"));
    }
    lines
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | q quit | ? help | tab sidebar/grid\n\
sidebar: j/k move | enter open\n\
grid: j/k/h/l move | < > column width | drag header border to resize\n\
grid: d or enter on delete remove row | esc close query result\n\
edit: a add row | c columns | e export | i import | g reload\n\
command: : open | enter run | up/down history\n\
reconcile: r open | p prompt | v paste | 1-3 accept | n new group\n\
form: tab/shift+tab field | left/right choose | enter save | esc cancel"
}

fn status_text(session: &Session, view_data: &ViewData) -> (String, Color) {
    let hints = match (view_data.focus, session.view) {
        (_, View::CommandResult) => "esc back | j/k move | : command | ? help",
        (Focus::Sidebar, _) => "enter open | tab grid | : command | r reconcile | ? help | q quit",
        (Focus::Grid, _) => {
            "a add | d delete | c cols | < > width | e export | i import | : command | r reconcile | ? help"
        }
    };
    match &session.status_line {
        Some(status) => {
            let color = match status.kind {
                FeedbackKind::Success => Color::Green,
                FeedbackKind::Info => Color::Yellow,
                FeedbackKind::Error => Color::Red,
            };
            (
                format!("{}: {} | {hints}", status.kind.label(), status.message),
                color,
            )
        }
        None => (hints.to_owned(), Color::White),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
