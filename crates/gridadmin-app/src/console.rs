// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::{Backend, CommandOutcome, GridMode, GridView};

pub const EMPTY_RESULT_PLACEHOLDER: &str = "Query returned no data.";

const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOutcome {
    /// Non-row command succeeded; schema and active entity need a reload.
    Changed { message: String },
    Rows { grid: GridView, count: usize },
}

/// Raw command entry. Command text goes to the backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandConsole {
    pub input: String,
    history: Vec<String>,
    cursor: Option<usize>,
}

impl CommandConsole {
    pub fn execute(&mut self, backend: &mut dyn Backend, command: &str) -> Result<ConsoleOutcome> {
        let command = command.trim();
        if command.is_empty() {
            bail!("command is empty -- type a query and retry");
        }
        self.remember(command);

        log::debug!("[COMMAND] executing: {command}");
        match backend.execute_command(command)? {
            CommandOutcome::Message(message) => {
                log::info!("[COMMAND] {message}");
                Ok(ConsoleOutcome::Changed { message })
            }
            CommandOutcome::Rows { columns, rows } => {
                let count = rows.len();
                let grid = GridView::build(&columns, &rows, GridMode::ReadOnly, None)
                    .with_placeholder(EMPTY_RESULT_PLACEHOLDER);
                Ok(ConsoleOutcome::Rows { grid, count })
            }
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Steps back through earlier commands into `input`.
    pub fn recall_previous(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.cursor {
            Some(index) => index.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.cursor = Some(index);
        self.input = self.history[index].clone();
    }

    pub fn recall_next(&mut self) {
        let Some(index) = self.cursor else {
            return;
        };
        if index + 1 >= self.history.len() {
            self.cursor = None;
            self.input.clear();
            return;
        }
        self.cursor = Some(index + 1);
        self.input = self.history[index + 1].clone();
    }

    fn remember(&mut self, command: &str) {
        self.cursor = None;
        if self.history.last().is_some_and(|last| last == command) {
            return;
        }
        self.history.push(command.to_owned());
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }
}
