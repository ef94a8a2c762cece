// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{CellValue, ColumnLayout, MIN_COLUMN_WIDTH, Row, RowId};

pub const ACTIONS_COLUMN: &str = "Actions";
pub const EMPTY_PLACEHOLDER: &str = "No data to display.";
pub const DELETE_LABEL: &str = "delete";

const MAX_INTRINSIC_WIDTH: u16 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    /// Writable table: rows carry a delete action.
    Table,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridHeaderCell {
    pub column: String,
    pub label: String,
    pub hidden: bool,
    pub width: Option<u16>,
    pub intrinsic_width: u16,
}

impl GridHeaderCell {
    pub fn effective_width(&self) -> u16 {
        self.width.unwrap_or(self.intrinsic_width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Delete(RowId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub column: String,
    pub value: CellValue,
    pub hidden: bool,
    pub width: Option<u16>,
    pub action: Option<RowAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridBodyRow {
    Data {
        row_id: Option<RowId>,
        cells: Vec<GridCell>,
    },
    Placeholder {
        message: String,
        span: usize,
    },
}

/// Head/body display structure for one entity or one command result.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView {
    pub head: Vec<GridHeaderCell>,
    pub body: Vec<GridBodyRow>,
    pub mode: GridMode,
}

impl GridView {
    pub fn build(
        columns: &[String],
        rows: &[Row],
        mode: GridMode,
        key_column: Option<&str>,
    ) -> Self {
        let mut head = columns
            .iter()
            .map(|column| GridHeaderCell {
                column: column.clone(),
                label: column.clone(),
                hidden: false,
                width: None,
                intrinsic_width: intrinsic_width(column, rows),
            })
            .collect::<Vec<_>>();

        if mode == GridMode::Table {
            head.push(GridHeaderCell {
                column: ACTIONS_COLUMN.to_owned(),
                label: ACTIONS_COLUMN.to_owned(),
                hidden: false,
                width: None,
                intrinsic_width: clamp_intrinsic(ACTIONS_COLUMN.chars().count()),
            });
        }

        let body = if rows.is_empty() {
            vec![GridBodyRow::Placeholder {
                message: EMPTY_PLACEHOLDER.to_owned(),
                span: head.len().max(1),
            }]
        } else {
            rows.iter()
                .map(|row| build_row(columns, row, mode, key_column))
                .collect()
        };

        Self { head, body, mode }
    }

    pub fn with_placeholder(mut self, message: &str) -> Self {
        for row in &mut self.body {
            if let GridBodyRow::Placeholder { message: text, .. } = row {
                *text = message.to_owned();
            }
        }
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.head.iter().map(|cell| cell.column.as_str()).collect()
    }

    pub fn header(&self, column: &str) -> Option<&GridHeaderCell> {
        self.head.iter().find(|cell| cell.column == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.header(column).is_some()
    }

    pub fn data_row_count(&self) -> usize {
        self.body
            .iter()
            .filter(|row| matches!(row, GridBodyRow::Data { .. }))
            .count()
    }

    /// Live width of a column, falling back to its intrinsic width.
    pub fn column_width(&self, column: &str) -> Option<u16> {
        self.header(column).map(GridHeaderCell::effective_width)
    }

    /// Sets the width on the header and every body cell of `column`.
    pub fn set_column_width(&mut self, column: &str, width: u16) -> bool {
        let Some(header) = self.head.iter_mut().find(|cell| cell.column == column) else {
            return false;
        };
        header.width = Some(width);
        for cell in self.cells_mut(column) {
            cell.width = Some(width);
        }
        true
    }

    /// Applies persisted widths; entries for unknown columns are skipped.
    pub fn apply_layout(&mut self, layout: &ColumnLayout) {
        for (column, width) in layout.iter() {
            if !self.set_column_width(column, width) {
                log::debug!("[LAYOUT] skipping stale width for column {column:?}");
            }
        }
    }

    pub fn set_hidden(&mut self, column: &str, hidden: bool) {
        for header in self.head.iter_mut().filter(|cell| cell.column == column) {
            header.hidden = hidden;
        }
        for cell in self.cells_mut(column) {
            cell.hidden = hidden;
        }
    }

    pub fn is_hidden(&self, column: &str) -> Option<bool> {
        self.header(column).map(|cell| cell.hidden)
    }

    pub fn visible_headers(&self) -> impl Iterator<Item = &GridHeaderCell> {
        self.head.iter().filter(|cell| !cell.hidden)
    }

    pub fn row_id(&self, index: usize) -> Option<&RowId> {
        match self.body.get(index) {
            Some(GridBodyRow::Data { row_id, .. }) => row_id.as_ref(),
            _ => None,
        }
    }

    fn cells_mut<'a>(
        &'a mut self,
        column: &'a str,
    ) -> impl Iterator<Item = &'a mut GridCell> + 'a {
        self.body
            .iter_mut()
            .filter_map(|row| match row {
                GridBodyRow::Data { cells, .. } => Some(cells),
                GridBodyRow::Placeholder { .. } => None,
            })
            .flat_map(|cells| cells.iter_mut())
            .filter(move |cell| cell.column == column)
    }
}

fn build_row(
    columns: &[String],
    row: &Row,
    mode: GridMode,
    key_column: Option<&str>,
) -> GridBodyRow {
    let row_id = key_column.and_then(|key| row.identifier(key));
    let mut cells = columns
        .iter()
        .map(|column| GridCell {
            column: column.clone(),
            value: row.get(column).cloned().unwrap_or(CellValue::Null),
            hidden: false,
            width: None,
            action: None,
        })
        .collect::<Vec<_>>();

    if mode == GridMode::Table {
        cells.push(GridCell {
            column: ACTIONS_COLUMN.to_owned(),
            value: CellValue::Text(DELETE_LABEL.to_owned()),
            hidden: false,
            width: None,
            action: row_id.clone().map(RowAction::Delete),
        });
    }

    GridBodyRow::Data { row_id, cells }
}

fn intrinsic_width(column: &str, rows: &[Row]) -> u16 {
    let widest_cell = rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|value| value.display().chars().count())
        .max()
        .unwrap_or(0);
    clamp_intrinsic(widest_cell.max(column.chars().count()))
}

fn clamp_intrinsic(width: usize) -> u16 {
    u16::try_from(width)
        .unwrap_or(MAX_INTRINSIC_WIDTH)
        .clamp(MIN_COLUMN_WIDTH, MAX_INTRINSIC_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::{ACTIONS_COLUMN, EMPTY_PLACEHOLDER, GridBodyRow, GridMode, GridView, RowAction};
    use crate::{CellValue, ColumnLayout, Row, RowId};

    fn parts_rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("id", CellValue::Integer(1))
                .with("name", CellValue::Text("Bolt M6".to_owned()))
                .with("qty", CellValue::Integer(40)),
            Row::new()
                .with("id", CellValue::Integer(2))
                .with("name", CellValue::Text("Washer".to_owned()))
                .with("qty", CellValue::Integer(100)),
        ]
    }

    fn parts_columns() -> Vec<String> {
        vec!["id".to_owned(), "name".to_owned(), "qty".to_owned()]
    }

    fn parts_grid() -> GridView {
        GridView::build(&parts_columns(), &parts_rows(), GridMode::Table, Some("id"))
    }

    #[test]
    fn table_grid_appends_actions_column_bound_to_row_ids() {
        let grid = parts_grid();

        assert_eq!(grid.column_names(), vec!["id", "name", "qty", ACTIONS_COLUMN]);
        assert_eq!(grid.data_row_count(), 2);
        let GridBodyRow::Data { cells, row_id } = &grid.body[1] else {
            panic!("expected data row");
        };
        assert_eq!(row_id, &Some(RowId::new("2")));
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[3].action, Some(RowAction::Delete(RowId::new("2"))));
        assert!(
            cells
                .iter()
                .zip(grid.column_names())
                .all(|(cell, name)| cell.column == name)
        );
    }

    #[test]
    fn read_only_grid_has_no_actions_column() {
        let grid = GridView::build(&parts_columns(), &parts_rows(), GridMode::ReadOnly, None);

        assert_eq!(grid.column_names(), vec!["id", "name", "qty"]);
        assert!(grid.row_id(0).is_none());
    }

    #[test]
    fn empty_rows_render_single_spanning_placeholder() {
        let grid = GridView::build(&parts_columns(), &[], GridMode::Table, Some("id"));
        assert_eq!(
            grid.body,
            vec![GridBodyRow::Placeholder {
                message: EMPTY_PLACEHOLDER.to_owned(),
                span: 4,
            }],
        );

        let bare = GridView::build(&[], &[], GridMode::ReadOnly, None).with_placeholder("nothing");
        assert_eq!(
            bare.body,
            vec![GridBodyRow::Placeholder {
                message: "nothing".to_owned(),
                span: 1,
            }],
        );
    }

    #[test]
    fn set_column_width_touches_header_and_body() {
        let mut grid = parts_grid();

        assert!(grid.set_column_width("name", 21));
        assert_eq!(grid.column_width("name"), Some(21));
        for row in &grid.body {
            let GridBodyRow::Data { cells, .. } = row else {
                continue;
            };
            let name = cells
                .iter()
                .find(|cell| cell.column == "name")
                .expect("name cell");
            assert_eq!(name.width, Some(21));
            let qty = cells
                .iter()
                .find(|cell| cell.column == "qty")
                .expect("qty cell");
            assert_eq!(qty.width, None);
        }
        assert!(!grid.set_column_width("gone", 9));
    }

    #[test]
    fn layout_skips_columns_that_no_longer_exist() {
        let mut grid = parts_grid();
        let mut layout = ColumnLayout::default();
        layout.set("qty", 12);
        layout.set("legacy", 30);

        grid.apply_layout(&layout);

        assert_eq!(grid.column_width("qty"), Some(12));
        assert!(!grid.has_column("legacy"));
    }

    #[test]
    fn intrinsic_width_covers_header_and_longest_value() {
        let grid = parts_grid();

        assert_eq!(grid.column_width("name"), Some(7));
        assert_eq!(grid.column_width("id"), Some(3));
    }
}
