// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridadmin_app::{
    DEFAULT_ID_COLUMN, DEFAULT_NAME_COLUMN, DEFAULT_REFERENCE_ENTITY, ReferenceTable,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
pub const CONFIG_PATH_ENV: &str = "GRIDADMIN_CONFIG_PATH";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub reconcile: Reconcile,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: Backend::default(),
            storage: Storage::default(),
            reconcile: Reconcile::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub base_url: Option<String>,
    /// Absent means requests wait for the backend indefinitely.
    pub timeout: Option<String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            base_url: Some(gridadmin_api::DEFAULT_BASE_URL.to_owned()),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub state_path: Option<String>,
    pub export_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reconcile {
    pub reference_entity: Option<String>,
    pub id_column: Option<String>,
    pub name_column: Option<String>,
    #[serde(default)]
    pub unmatched: Vec<String>,
    pub unmatched_file: Option<String>,
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            reference_entity: Some(DEFAULT_REFERENCE_ENTITY.to_owned()),
            id_column: Some(DEFAULT_ID_COLUMN.to_owned()),
            name_column: Some(DEFAULT_NAME_COLUMN.to_owned()),
            unmatched: Vec::new(),
            unmatched_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(gridadmin_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [backend], [storage], [reconcile], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.base_url().is_empty() {
            bail!("backend.base_url in {} must not be empty", path.display());
        }

        if let Some(timeout) = &self.backend.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "backend.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(state_path) = &self.storage.state_path {
            gridadmin_db::validate_db_path(state_path)?;
        }

        for (key, value) in [
            ("reconcile.reference_entity", &self.reconcile.reference_entity),
            ("reconcile.id_column", &self.reconcile.id_column),
            ("reconcile.name_column", &self.reconcile.name_column),
        ] {
            if let Some(value) = value
                && value.trim().is_empty()
            {
                bail!("{key} in {} must not be empty", path.display());
            }
        }

        let level = self.log_level();
        if !LOG_LEVELS.contains(&level) {
            bail!(
                "log.level in {} is {level:?}; use one of: {}",
                path.display(),
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.backend
            .base_url
            .as_deref()
            .unwrap_or(gridadmin_api::DEFAULT_BASE_URL)
            .trim()
            .trim_end_matches('/')
    }

    pub fn backend_timeout(&self) -> Result<Option<Duration>> {
        self.backend
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.storage.state_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => gridadmin_db::default_db_path(),
        }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.storage
            .export_dir
            .as_deref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    pub fn reference_table(&self) -> ReferenceTable {
        let defaults = ReferenceTable::default();
        ReferenceTable {
            entity: self
                .reconcile
                .reference_entity
                .clone()
                .unwrap_or(defaults.entity),
            id_column: self.reconcile.id_column.clone().unwrap_or(defaults.id_column),
            name_column: self
                .reconcile
                .name_column
                .clone()
                .unwrap_or(defaults.name_column),
        }
    }

    /// Inline names first, then the file's lines. Blank lines and repeats are dropped.
    pub fn unmatched_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut push = |name: &str| {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|seen: &String| seen == name) {
                names.push(name.to_owned());
            }
        };

        for name in &self.reconcile.unmatched {
            push(name);
        }
        if let Some(file) = &self.reconcile.unmatched_file {
            let raw = fs::read_to_string(file).with_context(|| {
                format!("read unmatched names {file} -- fix [reconcile].unmatched_file")
            })?;
            for line in raw.lines() {
                push(line);
            }
        }
        Ok(names)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL).trim()
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.file {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("cannot resolve data directory; set [log].file"))?;
        let app_dir = data_root.join(gridadmin_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create data directory {}", app_dir.display()))?;
        Ok(app_dir.join("gridadmin.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# gridadmin config\n# Place this file at: {}\n\nversion = 1\n\n[backend]\nbase_url = \"{}\"\n# Optional. Absent means no timeout.\n# timeout = \"30s\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/gridadmin/state.db)\n# state_path = \"/absolute/path/to/state.db\"\n# export_dir = \".\"\n\n[reconcile]\nreference_entity = \"{}\"\nid_column = \"{}\"\nname_column = \"{}\"\nunmatched = []\n# unmatched_file = \"/absolute/path/to/names.txt\"\n\n[log]\nlevel = \"{}\"\n# file = \"/absolute/path/to/gridadmin.log\"\n",
            path.display(),
            gridadmin_api::DEFAULT_BASE_URL,
            DEFAULT_REFERENCE_ENTITY,
            DEFAULT_ID_COLUMN,
            DEFAULT_NAME_COLUMN,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}
