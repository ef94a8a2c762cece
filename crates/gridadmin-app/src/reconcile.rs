// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Backend, ReferenceId};

pub const DEFAULT_REFERENCE_ENTITY: &str = "altnames";
pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_NAME_COLUMN: &str = "altname";
pub const MAX_ALTERNATIVES: usize = 3;

/// Where canonical names live and which columns hold their id and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTable {
    pub entity: String,
    pub id_column: String,
    pub name_column: String,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self {
            entity: DEFAULT_REFERENCE_ENTITY.to_owned(),
            id_column: DEFAULT_ID_COLUMN.to_owned(),
            name_column: DEFAULT_NAME_COLUMN.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub id: ReferenceId,
    pub name: String,
}

impl ReferenceTable {
    pub fn fetch_entries(&self, backend: &mut dyn Backend) -> Result<Vec<ReferenceEntry>> {
        let rows = backend
            .rows(&self.entity)
            .with_context(|| format!("load reference list {}", self.entity))?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.get(&self.id_column).and_then(|value| value.as_i64()) else {
                log::warn!(
                    "[RECONCILE] skipping {} row without integer {}",
                    self.entity,
                    self.id_column
                );
                continue;
            };
            let name = row
                .get(&self.name_column)
                .map(|value| value.display())
                .unwrap_or_default();
            entries.push(ReferenceEntry {
                id: ReferenceId::new(id),
                name,
            });
        }
        Ok(entries)
    }

    /// Id for a brand-new group: one past the current maximum, or 1.
    pub fn next_id(&self, backend: &mut dyn Backend) -> Result<ReferenceId> {
        let entries = self.fetch_entries(backend)?;
        match entries.iter().map(|entry| entry.id).max() {
            None => Ok(ReferenceId::new(1)),
            Some(max) => max
                .next()
                .ok_or_else(|| anyhow!("reference id {max} has no successor")),
        }
    }

    fn insert_body(&self, id: ReferenceId, name: &str) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(self.id_column.clone(), Value::from(id.get()));
        body.insert(self.name_column.clone(), Value::String(name.to_owned()));
        body
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub suggested_id: ReferenceId,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub new_name: String,
    pub alternatives: Vec<Alternative>,
}

/// Instruction text handed to an external assistant.
pub fn build_prompt(unmatched: &[String], reference: &[ReferenceEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        "You match new item names against an existing list of canonical groups.\n",
    );
    out.push_str("\n## New names\n\n");
    for name in unmatched {
        out.push_str(&format!("- {name}\n"));
    }
    out.push_str("\n## Existing groups (id: name)\n\n");
    for entry in reference {
        out.push_str(&format!("- {}: {}\n", entry.id, entry.name));
    }
    out.push_str(PROMPT_RULES);
    out
}

const PROMPT_RULES: &str = r#"
## Output format

Return a JSON array with one object per new name:

[{"new_name": "<new name>", "alternatives": [{"suggested_id": <group id>, "confidence": "<high|medium|low>"}]}]

Rules:
1. List at most 3 alternatives per name, best match first.
2. Use only ids from the existing groups above.
3. If nothing is similar, return a single alternative with "suggested_id": -1.
4. Output only the JSON array, with no explanation.
"#;

#[derive(Debug, Deserialize)]
struct WireSuggestion {
    new_name: String,
    #[serde(alias = "alternativs")]
    alternatives: Vec<WireAlternative>,
}

#[derive(Debug, Deserialize)]
struct WireAlternative {
    suggested_id: Value,
    #[serde(default)]
    confidence: Option<Value>,
}

/// Parses a pasted suggestion document. Surrounding prose and code fences
/// are ignored; the span from the first `[` to the last `]` must be a JSON
/// array of `{new_name, alternatives}` objects.
pub fn parse_suggestions(raw: &str) -> Result<Vec<Suggestion>> {
    let start = raw
        .find('[')
        .ok_or_else(|| anyhow!("no JSON array found -- paste the assistant's JSON output"))?;
    let end = raw
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("JSON array is not closed -- paste the complete output"))?;
    let document: Value =
        serde_json::from_str(&raw[start..=end]).context("suggestions are not valid JSON")?;

    let Value::Array(items) = document else {
        bail!("suggestions must be a JSON array");
    };

    let mut suggestions = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let wire: WireSuggestion = serde_json::from_value(item).with_context(|| {
            format!("suggestion {} needs new_name and an alternatives array", index + 1)
        })?;
        let mut alternatives = Vec::with_capacity(wire.alternatives.len());
        for alternative in wire.alternatives {
            alternatives.push(Alternative {
                suggested_id: parse_suggested_id(&alternative.suggested_id).with_context(
                    || format!("suggestion for {:?} has a bad suggested_id", wire.new_name),
                )?,
                confidence: confidence_text(alternative.confidence),
            });
        }
        suggestions.push(Suggestion {
            new_name: wire.new_name,
            alternatives,
        });
    }
    Ok(suggestions)
}

fn parse_suggested_id(value: &Value) -> Result<ReferenceId> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(ReferenceId::new)
            .ok_or_else(|| anyhow!("{number} is not an integer")),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(ReferenceId::new)
            .map_err(|_| anyhow!("{text:?} is not an integer")),
        other => bail!("expected an integer, got {other}"),
    }
}

fn confidence_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAlternative {
    pub suggested_id: ReferenceId,
    /// Reference name for the id, or the raw id when unknown.
    pub label: String,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Suggested {
        alternatives: Vec<ResolvedAlternative>,
        /// Only "create new group" is offered.
        no_match: bool,
    },
    Confirmed {
        id: ReferenceId,
    },
}

impl ItemState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Suggested { .. } => "suggested",
            Self::Confirmed { .. } => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationItem {
    pub name: String,
    pub state: ItemState,
    pub error: Option<String>,
}

impl ReconciliationItem {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, ItemState::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Alternative(usize),
    CreateNew,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub suggested: usize,
    pub without_suggestion: usize,
    pub already_confirmed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub reference: ReferenceTable,
    pub items: Vec<ReconciliationItem>,
    pub entries: Vec<ReferenceEntry>,
    pub prompt: Option<String>,
}

impl Reconciliation {
    pub fn new(reference: ReferenceTable, unmatched: Vec<String>) -> Self {
        let mut seen = Vec::new();
        let items = unmatched
            .into_iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .filter(|name| {
                let fresh = !seen.contains(name);
                if fresh {
                    seen.push(name.clone());
                }
                fresh
            })
            .map(|name| ReconciliationItem {
                name,
                state: ItemState::Pending,
                error: None,
            })
            .collect();
        Self {
            reference,
            items,
            entries: Vec::new(),
            prompt: None,
        }
    }

    pub fn unmatched_names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }

    pub fn refresh_reference(&mut self, backend: &mut dyn Backend) -> Result<()> {
        self.entries = self.reference.fetch_entries(backend)?;
        Ok(())
    }

    pub fn prepare_prompt(&mut self, backend: &mut dyn Backend) -> Result<String> {
        if self.items.is_empty() {
            bail!("no unmatched names -- set [reconcile].unmatched or pass --unmatched <file>");
        }
        self.refresh_reference(backend)?;
        let prompt = build_prompt(&self.unmatched_names(), &self.entries);
        self.prompt = Some(prompt.clone());
        Ok(prompt)
    }

    /// Applies a pasted suggestion document. On a parse or shape error no
    /// item changes. Confirmed items are never touched.
    pub fn ingest(&mut self, raw: &str) -> Result<IngestReport> {
        let suggestions = match parse_suggestions(raw) {
            Ok(suggestions) => suggestions,
            Err(error) => {
                log::warn!("[RECONCILE] rejected suggestion document: {error:#}");
                return Err(error);
            }
        };

        let mut report = IngestReport::default();
        for item in &mut self.items {
            if item.is_confirmed() {
                report.already_confirmed += 1;
                continue;
            }
            let Some(suggestion) = suggestions
                .iter()
                .find(|suggestion| suggestion.new_name.trim() == item.name)
            else {
                if matches!(item.state, ItemState::Pending) {
                    report.without_suggestion += 1;
                }
                continue;
            };
            item.state = resolve(suggestion, &self.entries);
            item.error = None;
            report.suggested += 1;
        }
        Ok(report)
    }

    /// Records the operator's choice for one item with a single reference
    /// insert. Returns the id that was written.
    pub fn confirm(
        &mut self,
        backend: &mut dyn Backend,
        index: usize,
        choice: Choice,
    ) -> Result<ReferenceId> {
        let item = self
            .items
            .get(index)
            .ok_or_else(|| anyhow!("no reconciliation item #{}", index + 1))?;
        let name = item.name.clone();

        let id = match (item.state.clone(), choice) {
            (ItemState::Confirmed { id }, _) => {
                bail!("{name:?} is already confirmed as group {id}")
            }
            (ItemState::Pending, _) => {
                bail!("{name:?} has no suggestion yet -- paste suggestions first")
            }
            (ItemState::Suggested { no_match: true, .. }, Choice::Alternative(_)) => {
                bail!("{name:?} has no similar match -- create a new group instead")
            }
            (ItemState::Suggested { alternatives, .. }, Choice::Alternative(slot)) => alternatives
                .get(slot)
                .map(|alternative| alternative.suggested_id)
                .ok_or_else(|| anyhow!("{name:?} has no alternative #{}", slot + 1))?,
            (ItemState::Suggested { .. }, Choice::CreateNew) => {
                match self.reference.next_id(backend) {
                    Ok(id) => id,
                    Err(error) => {
                        let message = format!("{error:#}");
                        self.items[index].error = Some(message.clone());
                        bail!(message);
                    }
                }
            }
        };

        let body = self.reference.insert_body(id, &name);
        match backend.insert(&self.reference.entity, &body) {
            Ok(message) => {
                log::info!("[RECONCILE] linked {name:?} to group {id}: {message}");
                let item = &mut self.items[index];
                item.state = ItemState::Confirmed { id };
                item.error = None;
                if !self.entries.iter().any(|entry| entry.id == id) {
                    self.entries.push(ReferenceEntry { id, name });
                }
                Ok(id)
            }
            Err(error) => {
                let message = format!("{error:#}");
                log::warn!("[RECONCILE] linking {name:?} failed: {message}");
                self.items[index].error = Some(message.clone());
                bail!(message)
            }
        }
    }
}

fn resolve(suggestion: &Suggestion, entries: &[ReferenceEntry]) -> ItemState {
    let no_match = suggestion
        .alternatives
        .first()
        .is_none_or(|first| first.suggested_id.is_no_match());
    if no_match {
        return ItemState::Suggested {
            alternatives: Vec::new(),
            no_match: true,
        };
    }

    let alternatives = suggestion
        .alternatives
        .iter()
        .filter(|alternative| !alternative.suggested_id.is_no_match())
        .take(MAX_ALTERNATIVES)
        .map(|alternative| ResolvedAlternative {
            suggested_id: alternative.suggested_id,
            label: entries
                .iter()
                .find(|entry| entry.id == alternative.suggested_id)
                .map_or_else(|| alternative.suggested_id.to_string(), |entry| entry.name.clone()),
            confidence: alternative.confidence.clone(),
        })
        .collect();
    ItemState::Suggested {
        alternatives,
        no_match: false,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ItemState, Reconciliation, ReferenceEntry, ReferenceTable, build_prompt, parse_suggestions,
    };
    use crate::ReferenceId;

    fn entries() -> Vec<ReferenceEntry> {
        vec![
            ReferenceEntry {
                id: ReferenceId::new(3),
                name: "Болт М6".to_owned(),
            },
            ReferenceEntry {
                id: ReferenceId::new(42),
                name: "Washer 6mm".to_owned(),
            },
        ]
    }

    #[test]
    fn prompt_lists_names_groups_and_sentinel_rule() {
        let prompt = build_prompt(&["Bolt M6".to_owned()], &entries());

        assert!(prompt.contains("- Bolt M6"));
        assert!(prompt.contains("- 42: Washer 6mm"));
        assert!(prompt.contains("\"suggested_id\": -1"));
        assert!(prompt.contains("at most 3 alternatives"));
        assert!(prompt.contains("Output only the JSON array"));
    }

    #[test]
    fn parse_accepts_prose_fences_and_string_ids() -> anyhow::Result<()> {
        let raw = "Here you go:\n```json\n[{\"new_name\": \"Bolt M6\", \"alternatives\": [{\"suggested_id\": \"3\", \"confidence\": 0.9}]}]\n```";
        let suggestions = parse_suggestions(raw)?;

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alternatives[0].suggested_id, ReferenceId::new(3));
        assert_eq!(suggestions[0].alternatives[0].confidence, "0.9");
        Ok(())
    }

    #[test]
    fn parse_accepts_misspelled_alternatives_key() -> anyhow::Result<()> {
        let raw = r#"[{"new_name": "Nut", "alternativs": [{"suggested_id": -1, "confidence": "new"}]}]"#;
        let suggestions = parse_suggestions(raw)?;

        assert!(suggestions[0].alternatives[0].suggested_id.is_no_match());
        Ok(())
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        for raw in [
            "nothing here",
            "[not json]",
            r#"[{"alternatives": []}]"#,
            r#"[{"new_name": "Nut"}]"#,
            r#"[{"new_name": "Nut", "alternatives": {"suggested_id": 1}}]"#,
            r#"[{"new_name": "Nut", "alternatives": [{"suggested_id": "x"}]}]"#,
        ] {
            assert!(parse_suggestions(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn ingest_resolves_labels_and_falls_back_to_raw_id() -> anyhow::Result<()> {
        let mut session = Reconciliation::new(
            ReferenceTable::default(),
            vec!["Bolt M6".to_owned(), "Nut".to_owned(), "Bolt M6".to_owned()],
        );
        session.entries = entries();

        let report = session.ingest(
            r#"[{"new_name": "Bolt M6", "alternatives": [
                {"suggested_id": 3, "confidence": "high"},
                {"suggested_id": 77, "confidence": "low"}]}]"#,
        )?;

        assert_eq!(session.items.len(), 2);
        assert_eq!(report.suggested, 1);
        assert_eq!(report.without_suggestion, 1);
        let ItemState::Suggested {
            alternatives,
            no_match,
        } = &session.items[0].state
        else {
            panic!("expected suggested state");
        };
        assert!(!no_match);
        assert_eq!(alternatives[0].label, "Болт М6");
        assert_eq!(alternatives[1].label, "77");
        assert_eq!(session.items[1].state, ItemState::Pending);
        Ok(())
    }

    #[test]
    fn failed_ingest_leaves_state_untouched() -> anyhow::Result<()> {
        let mut session = Reconciliation::new(ReferenceTable::default(), vec!["Nut".to_owned()]);
        session.ingest(r#"[{"new_name": "Nut", "alternatives": [{"suggested_id": -1}]}]"#)?;
        let before = session.items.clone();

        assert!(session.ingest("[{broken").is_err());
        assert_eq!(session.items, before);
        Ok(())
    }
}
