// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Number, Value};
use time::Date;
use time::macros::format_description;

use crate::ColumnMeta;

pub const OPERATION_TYPE_COLUMN: &str = "type";
pub const DATE_COLUMN: &str = "date";

/// Values the backend accepts for the operation type column.
pub const OPERATION_TYPES: [&str; 5] = ["Заявка", "Приход", "Выдача", "Закрыто", "Списано"];

const FIELD_LABELS: [(&str, &str); 8] = [
    ("name", "Наименование"),
    ("article", "Артикул производителя"),
    ("quantity", "Количество"),
    ("unit", "Единицы измерения (шт, кг, м)"),
    ("date", "Дата операции"),
    ("note", "Примечание"),
    ("document", "Документ-основание"),
    ("type", "Тип операции"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Text,
    /// Decimal input with no step restriction.
    Number,
    Date,
    Select(Vec<String>),
}

impl InputKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Select(_) => "select",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub column: String,
    pub label: String,
    pub kind: InputKind,
    pub required: bool,
    pub value: String,
}

impl FormField {
    /// Label as shown to the operator, marked when the field is required.
    pub fn display_label(&self) -> String {
        if self.required {
            format!("{} *", self.label)
        } else {
            self.label.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertForm {
    pub table: String,
    pub fields: Vec<FormField>,
}

pub fn field_label(column: &str) -> String {
    FIELD_LABELS
        .iter()
        .find(|(name, _)| *name == column)
        .map_or_else(|| column.to_owned(), |(_, label)| (*label).to_owned())
}

/// Builds the insert form for `table` from its column metadata alone.
pub fn synthesize(table: &str, columns: &[ColumnMeta], today: Date) -> InsertForm {
    let fields = columns
        .iter()
        .filter(|column| !column.is_primary_key)
        .map(|column| {
            let kind = input_kind(column);
            let value = match &kind {
                InputKind::Select(options) => options.first().cloned().unwrap_or_default(),
                InputKind::Date if column.name == DATE_COLUMN => format_date(today),
                _ => String::new(),
            };
            FormField {
                column: column.name.clone(),
                label: field_label(&column.name),
                kind,
                required: !column.nullable,
                value,
            }
        })
        .collect();

    InsertForm {
        table: table.to_owned(),
        fields,
    }
}

fn input_kind(column: &ColumnMeta) -> InputKind {
    if column.name == OPERATION_TYPE_COLUMN {
        let options = OPERATION_TYPES.iter().map(|kind| (*kind).to_owned()).collect();
        return InputKind::Select(options);
    }
    if column.name == DATE_COLUMN || column.is_date() {
        return InputKind::Date;
    }
    if column.is_numeric() {
        return InputKind::Number;
    }
    InputKind::Text
}

fn format_date(date: Date) -> String {
    date.format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

impl InsertForm {
    pub fn field(&self, column: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.column == column)
    }

    pub fn set_value(&mut self, column: &str, value: &str) -> Result<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|field| field.column == column)
            .ok_or_else(|| anyhow!("{} has no input for column {column:?}", self.table))?;
        if let InputKind::Select(options) = &field.kind
            && !options.iter().any(|option| option == value)
        {
            bail!(
                "{value:?} is not a valid {} -- choose one of: {}",
                field.label,
                options.join(", ")
            );
        }
        field.value = value.to_owned();
        Ok(())
    }

    /// Cycles a select field to its next option.
    pub fn cycle_option(&mut self, column: &str) -> Option<&str> {
        let field = self.fields.iter_mut().find(|field| field.column == column)?;
        let InputKind::Select(options) = &field.kind else {
            return None;
        };
        let current = options.iter().position(|option| *option == field.value);
        let next = current.map_or(0, |index| (index + 1) % options.len().max(1));
        field.value = options.get(next)?.clone();
        Some(field.value.as_str())
    }

    /// Assembles the insert body. Numeric inputs become JSON numbers and
    /// blank optional inputs become null.
    pub fn submission(&self) -> Result<Map<String, Value>> {
        let mut values = Map::new();
        for field in &self.fields {
            let raw = field.value.trim();
            if raw.is_empty() {
                if field.required {
                    bail!("{} is required -- fill it in and retry", field.label);
                }
                values.insert(field.column.clone(), Value::Null);
                continue;
            }

            let value = match field.kind {
                InputKind::Number => Value::Number(parse_number(raw).ok_or_else(|| {
                    anyhow!("{} must be a number, got {raw:?}", field.label)
                })?),
                InputKind::Date => {
                    Date::parse(raw, &format_description!("[year]-[month]-[day]")).map_err(|_| {
                        anyhow!("{} must be a date like 2024-01-31, got {raw:?}", field.label)
                    })?;
                    Value::String(raw.to_owned())
                }
                InputKind::Text | InputKind::Select(_) => Value::String(field.value.clone()),
            };
            values.insert(field.column.clone(), value);
        }
        Ok(values)
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(integer) = raw.parse::<i64>() {
        return Some(Number::from(integer));
    }
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::{InputKind, OPERATION_TYPES, field_label, synthesize};
    use crate::ColumnMeta;
    use serde_json::{Value, json};
    use time::macros::date;

    fn parts_columns() -> Vec<ColumnMeta> {
        vec![
            ColumnMeta::new("id", "INTEGER").primary_key(),
            ColumnMeta::new("name", "TEXT"),
            ColumnMeta::new("qty", "INTEGER").not_null(),
        ]
    }

    #[test]
    fn parts_form_has_two_inputs() {
        let form = synthesize("parts", &parts_columns(), date!(2026 - 03 - 14));

        assert_eq!(form.fields.len(), 2);
        let name = form.field("name").expect("name input");
        assert_eq!(name.kind, InputKind::Text);
        assert!(!name.required);
        let qty = form.field("qty").expect("qty input");
        assert_eq!(qty.kind, InputKind::Number);
        assert!(qty.required);
        assert!(form.field("id").is_none());
    }

    #[test]
    fn operation_type_becomes_select_with_first_value_preselected() {
        let columns = vec![ColumnMeta::new("type", "TEXT").not_null()];
        let form = synthesize("moves", &columns, date!(2026 - 03 - 14));

        let field = form.field("type").expect("type input");
        assert_eq!(
            field.kind,
            InputKind::Select(OPERATION_TYPES.iter().map(|kind| (*kind).to_owned()).collect())
        );
        assert_eq!(field.value, "Заявка");
        assert_eq!(field.display_label(), "Тип операции *");
    }

    #[test]
    fn date_column_defaults_to_today() {
        let columns = vec![
            ColumnMeta::new("date", "TEXT"),
            ColumnMeta::new("shipped", "DATE"),
        ];
        let form = synthesize("moves", &columns, date!(2026 - 03 - 04));

        assert_eq!(form.field("date").map(|field| field.value.as_str()), Some("2026-03-04"));
        let shipped = form.field("shipped").expect("shipped input");
        assert_eq!(shipped.kind, InputKind::Date);
        assert_eq!(shipped.value, "");
    }

    #[test]
    fn submission_coerces_numbers_and_nulls_blanks() -> anyhow::Result<()> {
        let mut form = synthesize("parts", &parts_columns(), date!(2026 - 03 - 14));
        form.set_value("qty", "12")?;

        let values = form.submission()?;
        assert_eq!(Value::Object(values), json!({"name": null, "qty": 12}));

        form.set_value("qty", "2.5")?;
        form.set_value("name", "Bolt M6")?;
        let values = form.submission()?;
        assert_eq!(Value::Object(values), json!({"name": "Bolt M6", "qty": 2.5}));
        Ok(())
    }

    #[test]
    fn submission_rejects_missing_required_and_bad_numbers() -> anyhow::Result<()> {
        let mut form = synthesize("parts", &parts_columns(), date!(2026 - 03 - 14));

        let error = form.submission().expect_err("qty is required");
        assert!(error.to_string().contains("qty is required"));

        form.set_value("qty", "many")?;
        let error = form.submission().expect_err("qty must be numeric");
        assert!(error.to_string().contains("must be a number"));
        Ok(())
    }

    #[test]
    fn select_rejects_values_outside_vocabulary() {
        let columns = vec![ColumnMeta::new("type", "TEXT")];
        let mut form = synthesize("moves", &columns, date!(2026 - 03 - 14));

        assert!(form.set_value("type", "Возврат").is_err());
        assert_eq!(form.cycle_option("type"), Some("Приход"));
        assert!(form.set_value("missing", "x").is_err());
    }

    #[test]
    fn unknown_columns_keep_raw_names_as_labels() {
        assert_eq!(field_label("quantity"), "Количество");
        assert_eq!(field_label("qty"), "qty");
    }
}
