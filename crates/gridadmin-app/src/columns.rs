// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{ACTIONS_COLUMN, GridView};

/// Narrowest width, in terminal cells, a column can be dragged to.
pub const MIN_COLUMN_WIDTH: u16 = 3;

const LAYOUT_KEY_PREFIX: &str = "columnWidths_";

pub fn layout_key(entity: &str) -> String {
    format!("{LAYOUT_KEY_PREFIX}{entity}")
}

/// Persisted column widths for one entity. A missing column means the
/// intrinsic width applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnLayout {
    widths: BTreeMap<String, u16>,
}

impl ColumnLayout {
    pub fn get(&self, column: &str) -> Option<u16> {
        self.widths.get(column).copied()
    }

    pub fn set(&mut self, column: &str, width: u16) {
        self.widths
            .insert(column.to_owned(), width.max(MIN_COLUMN_WIDTH));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.widths
            .iter()
            .map(|(column, width)| (column.as_str(), *width))
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Drops widths for columns absent from `columns` and raises widths left
    /// by older writers to the floor.
    pub fn retain_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        self.widths.retain(|column, width| {
            *width = (*width).max(MIN_COLUMN_WIDTH);
            columns.iter().any(|name| name.as_ref() == column)
        });
    }
}

/// Durable per-entity storage for [`ColumnLayout`]; last writer wins.
pub trait ColumnLayoutStore {
    fn load_layout(&mut self, entity: &str) -> Result<ColumnLayout>;
    fn save_layout(&mut self, entity: &str, layout: &ColumnLayout) -> Result<()>;
}

/// Columns currently shown in the grid. Rebuilt on every entity load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleColumns {
    shown: BTreeSet<String>,
}

impl VisibleColumns {
    pub fn all<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut visible = Self::default();
        visible.set_visible(columns);
        visible
    }

    pub fn set_visible<S: AsRef<str>>(&mut self, columns: &[S]) {
        self.shown = columns
            .iter()
            .map(|column| column.as_ref().to_owned())
            .collect();
    }

    /// Flips one column; returns whether it is now shown.
    pub fn toggle(&mut self, column: &str) -> bool {
        if self.shown.remove(column) {
            return false;
        }
        self.shown.insert(column.to_owned());
        true
    }

    pub fn contains(&self, column: &str) -> bool {
        column == ACTIONS_COLUMN || self.shown.contains(column)
    }

    /// Shows or hides every header and body cell by membership.
    pub fn apply(&self, grid: &mut GridView) {
        let columns: Vec<String> = grid.head.iter().map(|cell| cell.column.clone()).collect();
        for column in &columns {
            grid.set_hidden(column, !self.contains(column));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeDrag {
    pub column: String,
    pub start_x: i32,
    pub start_width: u16,
    pub current_width: u16,
}

/// Pointer-drag state machine for one column edge at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResizeGesture {
    #[default]
    Idle,
    Dragging(ResizeDrag),
}

impl ResizeGesture {
    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging(_))
    }

    pub fn drag(&self) -> Option<&ResizeDrag> {
        match self {
            Self::Dragging(drag) => Some(drag),
            Self::Idle => None,
        }
    }

    /// Starts a drag. Ignored (returns false) while another drag is active.
    pub fn pointer_down(&mut self, column: &str, x: i32, start_width: u16) -> bool {
        if self.is_dragging() {
            return false;
        }
        *self = Self::Dragging(ResizeDrag {
            column: column.to_owned(),
            start_x: x,
            start_width,
            current_width: start_width,
        });
        true
    }

    pub fn pointer_move(&mut self, x: i32) -> Option<(&str, u16)> {
        let Self::Dragging(drag) = self else {
            return None;
        };
        drag.current_width = resized_width(drag.start_width, x - drag.start_x);
        Some((drag.column.as_str(), drag.current_width))
    }

    /// Ends the drag, yielding the width to commit.
    pub fn pointer_up(&mut self) -> Option<(String, u16)> {
        match std::mem::take(self) {
            Self::Dragging(drag) => Some((drag.column, drag.current_width)),
            Self::Idle => None,
        }
    }

    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }
}

pub fn resized_width(start_width: u16, delta: i32) -> u16 {
    let width = i32::from(start_width).saturating_add(delta);
    u16::try_from(width.max(i32::from(MIN_COLUMN_WIDTH))).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        ColumnLayout, MIN_COLUMN_WIDTH, ResizeGesture, VisibleColumns, layout_key, resized_width,
    };
    use crate::{ACTIONS_COLUMN, CellValue, GridBodyRow, GridMode, GridView, Row};

    fn grid() -> GridView {
        let columns = vec!["id".to_owned(), "name".to_owned(), "qty".to_owned()];
        let rows = vec![
            Row::new()
                .with("id", CellValue::Integer(1))
                .with("name", CellValue::Text("Bolt".to_owned()))
                .with("qty", CellValue::Integer(3)),
        ];
        GridView::build(&columns, &rows, GridMode::Table, Some("id"))
    }

    fn assert_header_matches_body(grid: &GridView) {
        for header in &grid.head {
            for row in &grid.body {
                let GridBodyRow::Data { cells, .. } = row else {
                    continue;
                };
                let cell = cells
                    .iter()
                    .find(|cell| cell.column == header.column)
                    .expect("every header has a body cell");
                assert_eq!(cell.hidden, header.hidden, "column {}", header.column);
            }
        }
    }

    #[test]
    fn layout_key_uses_entity_name() {
        assert_eq!(layout_key("parts"), "columnWidths_parts");
    }

    #[test]
    fn layout_retain_drops_stale_columns() {
        let mut layout = ColumnLayout::default();
        layout.set("name", 20);
        layout.set("removed", 10);

        layout.retain_columns(&["id", "name"]);

        assert_eq!(layout.get("name"), Some(20));
        assert_eq!(layout.get("removed"), None);
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn stored_widths_below_the_floor_are_raised() -> anyhow::Result<()> {
        let mut layout: ColumnLayout = serde_json::from_str(r#"{"id":1,"name":0,"qty":2}"#)?;

        layout.retain_columns(&["id", "name", "qty"]);

        assert_eq!(layout.get("id"), Some(MIN_COLUMN_WIDTH));
        assert_eq!(layout.get("name"), Some(MIN_COLUMN_WIDTH));
        assert_eq!(layout.get("qty"), Some(MIN_COLUMN_WIDTH));

        let mut grid = grid();
        grid.apply_layout(&layout);
        assert!(
            grid.head
                .iter()
                .filter_map(|cell| cell.width)
                .all(|width| width >= MIN_COLUMN_WIDTH)
        );
        Ok(())
    }

    #[test]
    fn layout_serializes_as_plain_map() -> anyhow::Result<()> {
        let mut layout = ColumnLayout::default();
        layout.set("qty", 9);
        assert_eq!(serde_json::to_string(&layout)?, r#"{"qty":9}"#);

        let decoded: ColumnLayout = serde_json::from_str(r#"{"name":14}"#)?;
        assert_eq!(decoded.get("name"), Some(14));
        Ok(())
    }

    #[test]
    fn hiding_a_column_hides_header_and_cells_together() {
        let mut grid = grid();
        let mut visible = VisibleColumns::all(&["id", "name", "qty"]);

        assert!(!visible.toggle("name"));
        visible.apply(&mut grid);

        assert_eq!(grid.is_hidden("name"), Some(true));
        assert_eq!(grid.is_hidden("qty"), Some(false));
        assert_header_matches_body(&grid);

        assert!(visible.toggle("name"));
        visible.apply(&mut grid);
        assert_eq!(grid.is_hidden("name"), Some(false));
        assert_header_matches_body(&grid);
    }

    #[test]
    fn actions_column_is_never_hidden() {
        let mut grid = grid();
        let mut visible = VisibleColumns::default();
        visible.set_visible::<&str>(&[]);

        visible.apply(&mut grid);
        visible.apply(&mut grid);

        assert_eq!(grid.is_hidden(ACTIONS_COLUMN), Some(false));
        assert_eq!(grid.is_hidden("id"), Some(true));
        assert_header_matches_body(&grid);
    }

    #[test]
    fn toggling_visibility_keeps_widths() {
        let mut grid = grid();
        grid.set_column_width("qty", 11);
        let mut visible = VisibleColumns::all(&["id", "name", "qty"]);

        visible.toggle("name");
        visible.apply(&mut grid);

        assert_eq!(grid.column_width("qty"), Some(11));
    }

    #[test]
    fn drag_clamps_to_minimum_width() {
        let mut gesture = ResizeGesture::default();
        assert!(gesture.pointer_down("name", 40, 10));

        assert_eq!(gesture.pointer_move(45), Some(("name", 15)));
        assert_eq!(gesture.pointer_move(0), Some(("name", MIN_COLUMN_WIDTH)));
        assert_eq!(
            gesture.pointer_up(),
            Some(("name".to_owned(), MIN_COLUMN_WIDTH))
        );
        assert!(!gesture.is_dragging());
        assert_eq!(gesture.pointer_up(), None);
    }

    #[test]
    fn second_pointer_down_is_ignored_while_dragging() {
        let mut gesture = ResizeGesture::default();
        assert!(gesture.pointer_down("name", 10, 8));
        assert!(!gesture.pointer_down("qty", 30, 5));

        assert_eq!(gesture.drag().map(|drag| drag.column.as_str()), Some("name"));
    }

    #[test]
    fn resized_width_never_drops_below_floor() {
        for delta in [-10_000, -50, -1, 0, 1, 50] {
            assert!(resized_width(4, delta) >= MIN_COLUMN_WIDTH);
        }
        assert_eq!(resized_width(u16::MAX, 10), u16::MAX);
    }
}
