// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridadmin_app::{Backend, CellValue, ColumnMeta, CommandOutcome, Row, RowId, Schema};
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api";

const SPREADSHEET_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Blocking client for the data-administration backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Option<Duration>,
    http: HttpClient,
}

impl Client {
    /// `timeout` of `None` waits for the backend indefinitely.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("backend.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed).with_context(|| {
            format!("backend.base_url {trimmed:?} is not a URL -- use e.g. {DEFAULT_BASE_URL}")
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            bail!("backend.base_url {trimmed:?} must be an http(s) URL like {DEFAULT_BASE_URL}");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Confirms the backend answers by fetching its schema.
    pub fn ping(&self) -> Result<Schema> {
        self.fetch_schema()
    }

    /// Appends percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("backend.base_url {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn fetch_schema(&self) -> Result<Schema> {
        let url = self.endpoint(&["schema"])?;
        let wire: WireSchema = self.send_json(self.http.get(url.clone()), &url)?;
        Ok(Schema {
            tables: wire.tables,
            views: wire.views,
        })
    }

    pub fn fetch_rows(&self, entity: &str) -> Result<Vec<Row>> {
        let url = self.endpoint(&["data", entity])?;
        let rows: Vec<Value> = self.send_json(self.http.get(url.clone()), &url)?;
        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                row.as_object()
                    .map(Row::from_json_object)
                    .ok_or_else(|| anyhow!("row {} of {entity} is not an object", index + 1))
            })
            .collect()
    }

    pub fn fetch_table_info(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let url = self.endpoint(&["table_info", table])?;
        let columns: Vec<WireColumn> = self.send_json(self.http.get(url.clone()), &url)?;
        Ok(columns
            .into_iter()
            .map(|column| ColumnMeta {
                name: column.name,
                declared_type: column.declared_type,
                nullable: column.notnull == 0,
                is_primary_key: column.pk > 0,
            })
            .collect())
    }

    pub fn insert_row(&self, table: &str, values: &Map<String, Value>) -> Result<String> {
        let url = self.endpoint(&["insert", table])?;
        let envelope: Envelope = self.send_json(self.http.post(url.clone()).json(values), &url)?;
        envelope.into_message()
    }

    pub fn delete_row(&self, table: &str, id: &RowId) -> Result<String> {
        let url = self.endpoint(&["delete", table, id.as_str()])?;
        let envelope: Envelope = self.send_json(self.http.delete(url.clone()), &url)?;
        envelope.into_message()
    }

    pub fn run_command(&self, command: &str) -> Result<CommandOutcome> {
        let url = self.endpoint(&["sql_command"])?;
        let reply: CommandReply =
            self.send_json(self.http.post(url.clone()).json(&json!({ "sql": command })), &url)?;
        reply.into_outcome()
    }

    pub fn download_export(&self, entity: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&["export_to_excel", entity])?;
        let response = self.send(self.http.get(url.clone()), &url)?;
        let bytes = response
            .bytes()
            .with_context(|| format!("read export of {entity}"))?;
        Ok(bytes.to_vec())
    }

    pub fn upload_import(&self, table: &str, file_name: &str, contents: Vec<u8>) -> Result<String> {
        let url = self.endpoint(&["import_from_excel", table])?;
        let part = Part::bytes(contents)
            .file_name(file_name.to_owned())
            .mime_str(SPREADSHEET_MIME)
            .context("build import upload")?;
        let form = Form::new().part("file", part);
        let envelope: Envelope =
            self.send_json(self.http.post(url.clone()).multipart(form), &url)?;
        envelope.into_message()
    }

    fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response> {
        let request = request
            .build()
            .with_context(|| format!("build request for {}", url.path()))?;
        log::debug!("[HTTP] {} {}", request.method(), url.path());
        let response = self
            .http
            .execute(request)
            .map_err(|error| connection_error(self.base_url.as_str(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log::debug!("[HTTP] {url} -> {}", status.as_u16());
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        let response = self.send(request, url)?;
        response
            .json()
            .with_context(|| format!("decode response from {}", url.path()))
    }
}

impl Backend for Client {
    fn schema(&mut self) -> Result<Schema> {
        self.fetch_schema()
    }

    fn rows(&mut self, entity: &str) -> Result<Vec<Row>> {
        self.fetch_rows(entity)
    }

    fn table_info(&mut self, table: &str) -> Result<Vec<ColumnMeta>> {
        self.fetch_table_info(table)
    }

    fn insert(&mut self, table: &str, values: &Map<String, Value>) -> Result<String> {
        self.insert_row(table, values)
    }

    fn delete(&mut self, table: &str, id: &RowId) -> Result<String> {
        self.delete_row(table, id)
    }

    fn execute_command(&mut self, command: &str) -> Result<CommandOutcome> {
        self.run_command(command)
    }

    fn export_entity(&mut self, entity: &str) -> Result<Vec<u8>> {
        self.download_export(entity)
    }

    fn import_file(&mut self, table: &str, file_name: &str, contents: Vec<u8>) -> Result<String> {
        self.upload_import(table, file_name, contents)
    }
}

#[derive(Debug, Deserialize)]
struct WireSchema {
    #[serde(default)]
    tables: Vec<String>,
    #[serde(default)]
    views: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireColumn {
    name: String,
    #[serde(rename = "type", default)]
    declared_type: String,
    #[serde(default)]
    notnull: i64,
    #[serde(default)]
    pk: i64,
}

/// `{status, message}` reply; some error paths send `{error}` instead.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Envelope {
    fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error") || self.error.is_some()
    }

    fn error_text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .filter(|text| !text.is_empty())
    }

    fn into_message(self) -> Result<String> {
        if self.is_error() {
            let text = self.error_text().unwrap_or("backend reported an error");
            bail!("{text}");
        }
        Ok(self.message.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(default)]
    results: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    columns: Option<Vec<String>>,
}

impl CommandReply {
    fn into_outcome(self) -> Result<CommandOutcome> {
        let Some(results) = self.results else {
            return self.envelope.into_message().map(CommandOutcome::Message);
        };
        if self.envelope.is_error() {
            return self.envelope.into_message().map(CommandOutcome::Message);
        }
        let columns = match self.columns {
            Some(columns) => columns,
            None => results
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default(),
        };
        let rows = results
            .iter()
            .map(|object| {
                let mut row = Row::new();
                for column in &columns {
                    let value = object.get(column).map_or(CellValue::Null, CellValue::from_json);
                    row.push(column, value);
                }
                row
            })
            .collect();
        Ok(CommandOutcome::Rows { columns, rows })
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!(
            "backend at {base_url} timed out -- raise [backend].timeout or retry ({error})"
        );
    }
    anyhow!("cannot reach {base_url} -- start the backend or fix [backend].base_url ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(body)
        && let Some(text) = envelope.error_text()
    {
        return anyhow!("{text}");
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{') && !trimmed.contains('<') {
        return anyhow!("server error ({}): {trimmed}", status.as_u16());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use reqwest::StatusCode;

    #[test]
    fn backend_message_is_returned_verbatim() {
        let error = clean_error_response(
            StatusCode::FORBIDDEN,
            r#"{"status":"error","message":"Опасные команды запрещены."}"#,
        );
        assert_eq!(error.to_string(), "Опасные команды запрещены.");

        let error = clean_error_response(StatusCode::NOT_FOUND, r#"{"error":"Table not found"}"#);
        assert_eq!(error.to_string(), "Table not found");
    }

    #[test]
    fn opaque_bodies_fall_back_to_status() {
        let error = clean_error_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(error.to_string(), "server returned 502");

        let error = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(error.to_string(), "server error (500): boom");
    }

    #[test]
    fn endpoint_encodes_entity_names() {
        let client = Client::new("http://127.0.0.1:5000/api/", None).expect("valid base url");
        let url = client
            .endpoint(&["data", "stock on hand"])
            .expect("base url takes a path");
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/api/data/stock%20on%20hand");
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(Client::new("", None).is_err());
        assert!(Client::new("ftp://example.com/api", None).is_err());
        assert!(Client::new("not a url", None).is_err());
    }
}
