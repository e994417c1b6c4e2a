// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! One running site: adapter, browser session, retry queue and close token.

use crate::adapters::{is_blocked, SiteAdapter};
use crate::config::AgentConfig;
use crate::cookies::{with_extended_expiry, CookieStore};
use crate::error::{FetchError, InitError};
use crate::feed::FeedSource;
use crate::otp::{OtpHandle, OtpRendezvous};
use crate::pipeline::{FetchPipeline, FetchTimings, FetchedPage};
use crate::renderer::{Renderer, NAVIGATION_TIMEOUT_MS};
use crate::retry::RetryQueue;
use crate::store::{ArticleStore, HtmlArchive};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process-wide collaborators handed to every agent.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ArticleStore>,
    pub html: HtmlArchive,
    pub feeds: Arc<dyn FeedSource>,
    pub otp: Arc<OtpRendezvous>,
    pub cookie_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    /// Stopped for good until the site is re-enabled.
    Offline(String),
}

/// Read-only view for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub display_name: String,
    pub domains: Vec<String>,
    pub status: AgentStatus,
    pub pending_retries: usize,
}

pub struct Agent {
    adapter: Box<dyn SiteAdapter>,
    config: AgentConfig,
    renderer: Arc<dyn Renderer>,
    session: tokio::sync::Mutex<()>,
    retry: RetryQueue,
    close: CancellationToken,
    status: RwLock<AgentStatus>,
    cookies: CookieStore,
    services: Services,
    timings: FetchTimings,
}

impl Agent {
    /// Initialise the adapter, then probe the test page and replay saved cookies.
    pub async fn start(
        mut adapter: Box<dyn SiteAdapter>,
        config: AgentConfig,
        renderer: Arc<dyn Renderer>,
        services: Services,
        timings: FetchTimings,
    ) -> Result<Self, InitError> {
        adapter.init(&config)?;
        let name = adapter.name().to_string();

        let cookies = CookieStore::for_site(&services.cookie_dir, &name);
        let jar = cookies.load().await.map_err(InitError::Cookies)?;

        let test_page = adapter.test_page().to_string();
        if test_page.is_empty() {
            return Err(InitError::MissingTestPage { site: name });
        }

        let mut ctx = renderer.new_context().await.map_err(InitError::Browser)?;
        let probe = async {
            ctx.navigate(&test_page, NAVIGATION_TIMEOUT_MS)
                .await
                .with_context(|| format!("failed to open {test_page}"))?;
            if !jar.is_empty() {
                ctx.set_cookies(&with_extended_expiry(&jar))
                    .await
                    .context("failed to replay cookies")?;
            }
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = ctx.close().await {
            warn!(agent = %name, "failed to close probe tab: {e:#}");
        }
        probe.map_err(InitError::Probe)?;
        info!(agent = %name, cookies = jar.len(), "agent initialised");

        Ok(Self {
            adapter,
            config,
            renderer,
            session: tokio::sync::Mutex::new(()),
            retry: RetryQueue::new(),
            close: CancellationToken::new(),
            status: RwLock::new(AgentStatus::Running),
            cookies,
            services,
            timings,
        })
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn display_name(&self) -> &str {
        self.adapter.display_name()
    }

    pub fn adapter(&self) -> &dyn SiteAdapter {
        self.adapter.as_ref()
    }

    pub fn base_domains(&self) -> Vec<String> {
        self.adapter.base_domains()
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn close_token(&self) -> &CancellationToken {
        &self.close
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        is_blocked(self.adapter.as_ref(), url)
    }

    /// Configured feeds, else the site's defaults.
    pub fn feed_links(&self) -> Vec<String> {
        if self.config.rss_links.is_empty() {
            self.adapter.default_rss_links()
        } else {
            self.config.rss_links.clone()
        }
    }

    /// Title block list, lower-cased.
    pub fn title_keywords(&self) -> Vec<String> {
        self.config
            .title_block_list
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.status(), AgentStatus::Offline(_))
    }

    /// Take the agent offline. The supervisor reaps it on its next tick.
    pub fn set_offline(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *status = AgentStatus::Offline(reason);
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            domains: self.base_domains(),
            status: self.status(),
            pending_retries: self.retry.len(),
        }
    }

    /// Run the fetch pipeline under the session lock.
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let _session = tokio::select! {
            guard = self.session.lock() => guard,
            _ = self.close.cancelled() => return Err(FetchError::Cancelled),
        };
        let otp = OtpHandle::new(Arc::clone(&self.services.otp), self.close.clone());
        let pipeline = FetchPipeline {
            adapter: self.adapter.as_ref(),
            renderer: self.renderer.as_ref(),
            cookies: &self.cookies,
            otp: &otp,
            timings: &self.timings,
        };
        tokio::select! {
            result = pipeline.fetch(url) => result,
            _ = self.close.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Fetch an article and record it under its canonical URL.
    pub async fn handle_article(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if self.is_blocked(url) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
            });
        }
        let canonical = self
            .adapter
            .clean_url(url)
            .map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;

        let page = self.fetch_page(&canonical).await?;
        self.services
            .html
            .write(&canonical, &page.html)
            .await
            .map_err(FetchError::Storage)?;
        self.services
            .store
            .upsert(&canonical, self.name(), Some(&page.url))
            .map_err(FetchError::Storage)?;
        debug!(agent = %self.name(), url = %canonical, actual = %page.url, "article stored");
        Ok(page)
    }

    /// Signal the poller, then close the browser.
    pub async fn shutdown(&self) {
        self.close.cancel();
        if let Err(e) = self.renderer.shutdown().await {
            warn!(agent = %self.name(), "browser shutdown failed: {e:#}");
        }
        info!(agent = %self.name(), "agent stopped");
    }
}
