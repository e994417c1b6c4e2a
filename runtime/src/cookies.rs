// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-agent cookie jar persisted as JSON.
//!
//! The jar is read once when an agent starts and rewritten in full after each
//! successful login. A missing file is an empty jar.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifetime given to every replayed cookie.
pub const REPLAY_LIFETIME_DAYS: i64 = 180;

/// A browser cookie in a browser-independent shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Seconds since the Unix epoch; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Cookie file of one agent.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    /// Jar for `site` under `dir` (`cookie_<site>.json`).
    pub fn for_site(dir: &Path, site: &str) -> Self {
        Self {
            path: dir.join(format!("cookie_{site}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<StoredCookie>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed cookie file {}", self.path.display()))
    }

    /// Overwrite the jar with `cookies`.
    pub async fn save(&self, cookies: &[StoredCookie]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_vec(cookies).context("failed to serialize cookies")?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Copy of the jar with every expiry pushed out to the replay lifetime.
pub fn with_extended_expiry(cookies: &[StoredCookie]) -> Vec<StoredCookie> {
    let expires = (Utc::now() + Duration::days(REPLAY_LIFETIME_DAYS)).timestamp() as f64;
    cookies
        .iter()
        .cloned()
        .map(|mut c| {
            c.expires = Some(expires);
            c
        })
        .collect()
}
