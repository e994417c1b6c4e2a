//! Local archive of fetched article HTML.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Directory of `<safe url>.html` files.
#[derive(Debug, Clone)]
pub struct HtmlArchive {
    dir: PathBuf,
}

/// Filesystem-safe name for a URL: `/` becomes `_`, `:` is removed.
pub fn file_name(url: &str) -> String {
    format!("{}.html", url.replace('/', "_").replace(':', ""))
}

impl HtmlArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(file_name(url))
    }

    pub async fn write(&self, url: &str, html: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(url);
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub async fn read(&self, url: &str) -> Result<String> {
        let path = self.path_for(url);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }

    pub async fn exists(&self, url: &str) -> bool {
        tokio::fs::try_exists(self.path_for(url))
            .await
            .unwrap_or(false)
    }
}
