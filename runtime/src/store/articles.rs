// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQLite-backed article table.

use super::{ArticleQuery, ArticleRecord, ArticleStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteArticleStore {
    db: Mutex<Connection>,
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl SqliteArticleStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open article db: {}", path.display()))?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("failed to open in-memory db")?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS article (
                url TEXT PRIMARY KEY,
                agent TEXT NOT NULL,
                actual_url TEXT,
                saved INTEGER NOT NULL DEFAULT 0,
                save_time TEXT,
                response TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_article_saved ON article (saved);",
        )
        .context("failed to create article table")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArticleStore for SqliteArticleStore {
    fn upsert(&self, url: &str, agent: &str, actual_url: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO article (url, agent, actual_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(url) DO UPDATE SET
                    agent = excluded.agent,
                    actual_url = COALESCE(excluded.actual_url, article.actual_url),
                    updated_at = excluded.updated_at",
                params![url, agent, actual_url, now],
            )
            .with_context(|| format!("failed to upsert {url}"))?;
        Ok(())
    }

    fn mark_saved(&self, url: &str, agent: &str, response: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO article (url, agent, saved, save_time, response, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?3, ?3)
                 ON CONFLICT(url) DO UPDATE SET
                    saved = 1,
                    save_time = excluded.save_time,
                    response = excluded.response,
                    updated_at = excluded.updated_at",
                params![url, agent, now, response],
            )
            .with_context(|| format!("failed to mark {url} saved"))?;
        Ok(())
    }

    fn query(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if !query.urls.is_empty() {
            let marks = vec!["?"; query.urls.len()].join(", ");
            clauses.push(format!("url IN ({marks})"));
            values.extend(query.urls.iter().cloned().map(SqlValue::Text));
        }
        if let Some(saved) = query.saved {
            clauses.push("saved = ?".to_string());
            values.push(SqlValue::Integer(i64::from(saved)));
        }
        if query.has_actual_url {
            clauses.push("actual_url IS NOT NULL AND actual_url != ''".to_string());
        }
        let mut sql = "SELECT url, agent, actual_url, saved, save_time, response, created_at, updated_at
                       FROM article"
            .to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at, url");

        let db = self.conn();
        let mut stmt = db.prepare(&sql).context("failed to prepare article query")?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            let created: String = row.get(6)?;
            let updated: String = row.get(7)?;
            Ok(ArticleRecord {
                url: row.get(0)?,
                agent: row.get(1)?,
                actual_url: row.get(2)?,
                saved: row.get::<_, i64>(3)? != 0,
                save_time: parse_time(row.get(4)?),
                response: row.get(5)?,
                created_at: parse_time(Some(created)).unwrap_or_default(),
                updated_at: parse_time(Some(updated)).unwrap_or_default(),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read article rows")
    }
}
