//! Bookkeeping collaborators: the article table and the local HTML archive.
//!
//! Both are keyed by the canonical (cleaned) article URL.

pub mod articles;
pub mod html;

pub use articles::SqliteArticleStore;
pub use html::HtmlArchive;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One processed article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub url: String,
    pub agent: String,
    /// URL the browser ended on after redirects.
    pub actual_url: Option<String>,
    pub saved: bool,
    pub save_time: Option<DateTime<Utc>>,
    /// Body returned by the read-later service.
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for [`ArticleStore::query`]. Empty `urls` matches every URL.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub urls: Vec<String>,
    /// `Some(true)` for saved only, `Some(false)` for unsaved only.
    pub saved: Option<bool>,
    pub has_actual_url: bool,
}

impl ArticleQuery {
    /// Saved records among `urls`.
    pub fn saved_among(urls: &[String]) -> Self {
        Self {
            urls: urls.to_vec(),
            saved: Some(true),
            has_actual_url: false,
        }
    }

    /// Fetched records still waiting for the read-later push.
    pub fn pending_push() -> Self {
        Self {
            urls: Vec::new(),
            saved: Some(false),
            has_actual_url: true,
        }
    }
}

/// Persistent article bookkeeping. Exactly one record per URL.
pub trait ArticleStore: Send + Sync {
    /// Insert the URL or update its agent, and its actual URL when given.
    fn upsert(&self, url: &str, agent: &str, actual_url: Option<&str>) -> Result<()>;
    /// Insert the URL or flag it saved, stamping the time and response.
    fn mark_saved(&self, url: &str, agent: &str, response: &str) -> Result<()>;
    fn query(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>>;
}
