// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading, validation and the on-disk data layout.
//!
//! The whole configuration lives in one JSON file, `<data_dir>/conf.json`.
//! A missing file means defaults; a malformed one is an error naming the path.
//! Environment overrides are applied on top after loading.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Default `location` sent with read-later pushes.
pub const DEFAULT_READER_LOCATION: &str = "feed";

/// Default login method for sites that offer more than one.
pub const DEFAULT_LOGIN_METHOD: &str = "otp_code";

/// Placeholder shown instead of stored passwords.
pub const REDACTED: &str = "********";

const ENV_DATA_DIR: &str = "PAYWIRE_DATA_DIR";
const ENV_ENABLED_SITES: &str = "PAYWIRE_ENABLED_SITES";
const ENV_SAVE_FIRST_FETCH: &str = "PAYWIRE_SAVE_FIRST_FETCH";
const ENV_READ_LATER_TOKEN: &str = "PAYWIRE_READ_LATER_TOKEN";

/// Global configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// API token for the read-later service.
    pub read_later_token: String,
    /// Where pushed articles land in the reader (`new`, `later`, `archive`, `feed`).
    pub reader_location: String,
    /// Fetch the backlog on an agent's first cycle instead of marking it saved.
    pub save_first_fetch: bool,
    /// Site names whose agents should be running.
    pub enabled_sites: Vec<String>,
    /// Run Chromium without a window.
    pub headless: bool,
    /// Per-site options keyed by site name.
    pub agents: BTreeMap<String, AgentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            read_later_token: String::new(),
            reader_location: DEFAULT_READER_LOCATION.to_string(),
            save_first_fetch: true,
            enabled_sites: Vec::new(),
            headless: true,
            agents: BTreeMap::new(),
        }
    }
}

/// Credentials and options for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub username: String,
    pub password: String,
    /// Lower-cased before matching against feed titles.
    pub title_block_list: Vec<String>,
    /// Overrides the site's default feeds when non-empty.
    pub rss_links: Vec<String>,
    pub include_premium_articles: bool,
    pub login_method: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            title_block_list: Vec::new(),
            rss_links: Vec::new(),
            include_premium_articles: false,
            login_method: DEFAULT_LOGIN_METHOD.to_string(),
        }
    }
}

impl AgentConfig {
    /// Current value of an option by schema key.
    pub fn value(&self, key: &str) -> Option<Value> {
        let v = match key {
            "username" => json!(self.username),
            "password" => json!(self.password),
            "title_block_list" => json!(self.title_block_list),
            "rss_links" => json!(self.rss_links),
            "include_premium_articles" => json!(self.include_premium_articles),
            "login_method" => json!(self.login_method),
            _ => return None,
        };
        Some(v)
    }

    /// Whether an option carries a non-empty value.
    pub fn is_set(&self, key: &str) -> bool {
        match self.value(key) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Kind of input an option takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Str,
    StrList,
    Bool,
    SingleSelection,
}

/// Schema entry for one configurable option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub key: String,
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Value,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub selections: Vec<String>,
}

impl ConfigOption {
    pub fn new(key: &str, name: &str, field_type: FieldType) -> Self {
        let default = match field_type {
            FieldType::Str | FieldType::SingleSelection => json!(""),
            FieldType::StrList => json!([]),
            FieldType::Bool => json!(false),
        };
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: String::new(),
            field_type,
            required: false,
            default,
            selections: Vec::new(),
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_selections(mut self, selections: &[&str]) -> Self {
        self.selections = selections.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Options shared by every site.
pub fn common_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::new("title_block_list", "Title block list", FieldType::StrList)
            .describe("Articles whose title contains any of these keywords are skipped"),
        ConfigOption::new("rss_links", "RSS links", FieldType::StrList)
            .describe("Feeds to poll instead of the site defaults"),
    ]
}

fn global_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::new("read_later_token", "Read-later token", FieldType::Str)
            .describe("Access token of the read-later service")
            .required(),
        ConfigOption::new("reader_location", "Reader location", FieldType::SingleSelection)
            .describe("Where new articles are filed")
            .with_default(json!(DEFAULT_READER_LOCATION))
            .with_selections(&["new", "later", "archive", "feed"]),
        ConfigOption::new("save_first_fetch", "Save first fetch", FieldType::Bool)
            .describe("Fetch the articles already in a feed when a site is first enabled")
            .with_default(json!(true)),
        ConfigOption::new("enabled_sites", "Enabled sites", FieldType::StrList),
        ConfigOption::new("headless", "Headless browser", FieldType::Bool)
            .with_default(json!(true)),
    ]
}

fn render_option(option: &ConfigOption, value: Value) -> Value {
    let value = if option.key == "password" && value.as_str().is_some_and(|s| !s.is_empty()) {
        json!(REDACTED)
    } else {
        value
    };
    let mut rendered = json!(option);
    if let Some(obj) = rendered.as_object_mut() {
        obj.insert("value".to_string(), value);
    }
    rendered
}

impl AppConfig {
    /// Load from disk. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed config file: {}", path.display()))
    }

    /// Overwrite the file with this configuration.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }

    /// Apply `PAYWIRE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(sites) = lookup(ENV_ENABLED_SITES) {
            self.enabled_sites = sites
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(flag) = lookup(ENV_SAVE_FIRST_FETCH) {
            self.save_first_fetch = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "1"
            );
        }
        if let Some(token) = lookup(ENV_READ_LATER_TOKEN) {
            self.read_later_token = token;
        }
    }

    /// Options for a site, defaulted when the site has no section yet.
    pub fn agent(&self, site: &str) -> AgentConfig {
        self.agents.get(site).cloned().unwrap_or_default()
    }

    /// Check the token and every required option of every enabled site.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.read_later_token.trim().is_empty() {
            problems.push("read_later_token is required".to_string());
        }
        for site in &self.enabled_sites {
            let Some(adapter) = crate::adapters::create(site) else {
                problems.push(format!("unknown site `{site}`"));
                continue;
            };
            let agent = self.agent(site);
            for option in adapter.config_options() {
                if option.required && !agent.is_set(&option.key) {
                    problems.push(format!("{site}: `{}` is required", option.key));
                }
            }
        }
        if !problems.is_empty() {
            bail!("invalid configuration: {}", problems.join("; "));
        }
        Ok(())
    }

    /// Render the global section and one section per site for the operator.
    pub fn export(&self) -> Value {
        let global = json!(self);
        let mut sections = vec![json!({
            "name": "global",
            "display_name": "Global",
            "options": global_options()
                .iter()
                .map(|o| render_option(o, global.get(&o.key).cloned().unwrap_or(Value::Null)))
                .collect::<Vec<_>>(),
        })];
        for adapter in crate::adapters::all() {
            let agent = self.agent(adapter.name());
            sections.push(json!({
                "name": adapter.name(),
                "display_name": adapter.display_name(),
                "enabled": self.enabled_sites.iter().any(|s| s == adapter.name()),
                "options": adapter
                    .config_options()
                    .iter()
                    .map(|o| render_option(o, agent.value(&o.key).unwrap_or(Value::Null)))
                    .collect::<Vec<_>>(),
            }));
        }
        json!({ "sections": sections })
    }
}

/// Shared, swappable configuration plus the file it persists to.
///
/// The supervisor takes a snapshot per reconcile tick; the operator channel
/// is the only writer.
pub struct ConfigHandle {
    path: PathBuf,
    inner: RwLock<AppConfig>,
}

impl ConfigHandle {
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            inner: RwLock::new(config),
        }
    }

    /// Load the file and apply environment overrides.
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut config = AppConfig::load(&path)?;
        config.apply_env();
        Ok(Self::new(path, config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> AppConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Validate, persist and swap in a new configuration.
    ///
    /// Passwords sent back as the redaction placeholder keep their stored value.
    pub fn replace(&self, mut config: AppConfig) -> Result<()> {
        let current = self.snapshot();
        for (site, agent) in config.agents.iter_mut() {
            if agent.password == REDACTED {
                agent.password = current.agent(site).password;
            }
        }
        config.validate()?;
        config.save(&self.path)?;
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        Ok(())
    }

    /// Mutate in place and persist, skipping validation.
    pub fn update(&self, f: impl FnOnce(&mut AppConfig)) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
        guard.save(&self.path)
    }
}

/// Resolve the data directory: explicit flag, then `PAYWIRE_DATA_DIR`, then `~/.paywire`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(ENV_DATA_DIR) {
        return PathBuf::from(env_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".paywire")
}

/// File layout under the data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and the HTML directory.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.html_dir())
            .with_context(|| format!("failed to create {}", self.html_dir().display()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("conf.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("paywire.db")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    pub fn cookie_dir(&self) -> PathBuf {
        self.root.clone()
    }
}
