// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fetch pipeline: one article URL through navigate, paywall/login and extract.
//!
//! The caller holds the agent's session lock for the whole run. The tab opened
//! here is closed on every exit path; a tab dropped mid-run (cancellation)
//! closes itself.

use crate::adapters::{is_blocked, SiteAdapter};
use crate::cookies::CookieStore;
use crate::error::FetchError;
use crate::otp::OtpHandle;
use crate::renderer::{RenderContext, Renderer, NAVIGATION_TIMEOUT_MS};
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pixels scrolled per step; scrolling stops once less than this remains.
pub const SCROLL_OFFSET: f64 = 200.0;

/// Title Chromium shows when the site is unreachable.
pub const BAD_CONNECTION_TITLE: &str = "Unable to connect";

const SCROLL_STEP_JS: &str = "window.scrollBy(0, 200)";
const SCROLL_METRICS_JS: &str = "[Math.max(document.body.scrollHeight, document.body.offsetHeight, \
     document.documentElement.clientHeight, document.documentElement.scrollHeight, \
     document.documentElement.offsetHeight), window.pageYOffset, window.innerHeight]";

/// Delays of one fetch. Tests shrink them.
#[derive(Debug, Clone)]
pub struct FetchTimings {
    /// Pause on `about:blank` before the real navigation.
    pub settle_delay: Duration,
    /// Pause after each scroll step.
    pub scroll_pause: Duration,
    /// Upper bound on scroll steps for pages that keep growing.
    pub max_scroll_steps: usize,
}

impl Default for FetchTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            scroll_pause: Duration::from_millis(300),
            max_scroll_steps: 500,
        }
    }
}

/// Extracted article page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL the tab ended on.
    pub url: String,
    pub html: String,
}

#[derive(Debug, Deserialize)]
struct ScrollMetrics(f64, f64, f64);

impl ScrollMetrics {
    fn remaining(&self) -> f64 {
        self.0 - self.1 - self.2
    }
}

/// Borrowed view of one agent's collaborators for a single fetch.
pub struct FetchPipeline<'a> {
    pub adapter: &'a dyn SiteAdapter,
    pub renderer: &'a dyn Renderer,
    pub cookies: &'a CookieStore,
    pub otp: &'a OtpHandle,
    pub timings: &'a FetchTimings,
}

impl FetchPipeline<'_> {
    /// Fetch `url` and return the final HTML and URL.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let target = self
            .adapter
            .clean_url(url)
            .map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;

        let mut ctx = self
            .renderer
            .new_context()
            .await
            .map_err(FetchError::Browser)?;
        let result = self.drive(ctx.as_mut(), &target).await;
        if let Err(e) = ctx.close().await {
            warn!(agent = %self.adapter.name(), url = %target, "failed to close tab: {e:#}");
        }
        result
    }

    async fn drive(
        &self,
        ctx: &mut dyn RenderContext,
        target: &str,
    ) -> Result<FetchedPage, FetchError> {
        let agent = self.adapter.name();
        if let Some(listener) = self.adapter.event_listener() {
            ctx.listen(listener).await.map_err(FetchError::Browser)?;
        }

        self.open(ctx, "about:blank").await?;
        tokio::time::sleep(self.timings.settle_delay).await;
        self.open(ctx, target).await?;
        let landed = ctx.get_url().await.map_err(FetchError::Browser)?;
        debug!(agent = %agent, url = %target, landed = %landed, "navigated");

        if is_blocked(self.adapter, &landed) {
            return Err(FetchError::Blocked { url: landed });
        }

        self.adapter
            .check_finish_loading(ctx)
            .await
            .map_err(FetchError::from_probe)?;

        if self.paywalled(ctx).await? {
            self.unlock(ctx, &landed).await?;
        }

        if self.adapter.requires_scrolling() {
            self.scroll_to_bottom(ctx).await?;
        }

        let title = ctx.get_title().await.map_err(FetchError::Browser)?;
        if title == BAD_CONNECTION_TITLE {
            return Err(FetchError::Connection { title });
        }

        let html = ctx.get_html().await.map_err(FetchError::Browser)?;
        let url = ctx.get_url().await.map_err(FetchError::Browser)?;
        Ok(FetchedPage { url, html })
    }

    async fn open(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<(), FetchError> {
        ctx.navigate(url, NAVIGATION_TIMEOUT_MS)
            .await
            .with_context(|| format!("failed to navigate to {url}"))
            .map_err(FetchError::Browser)?;
        Ok(())
    }

    async fn paywalled(&self, ctx: &dyn RenderContext) -> Result<bool, FetchError> {
        self.adapter
            .is_paywalled(ctx)
            .await
            .map_err(FetchError::from_probe)
    }

    /// Log in, return to `landed` if the login flow moved away, and persist the session.
    async fn unlock(&self, ctx: &mut dyn RenderContext, landed: &str) -> Result<(), FetchError> {
        let agent = self.adapter.name();
        info!(agent = %agent, url = %landed, "paywalled, ensuring login");
        self.adapter
            .ensure_logged_in(ctx, self.otp)
            .await
            .map_err(|e| FetchError::from_login(self.adapter.display_name(), e))?;

        let after_login = ctx.get_url().await.map_err(FetchError::Browser)?;
        if after_login != landed {
            debug!(agent = %agent, from = %after_login, to = %landed, "returning to article");
            self.open(ctx, landed).await?;
            self.adapter
                .check_finish_loading(ctx)
                .await
                .map_err(FetchError::from_probe)?;
        }

        if self.paywalled(ctx).await? {
            return Err(FetchError::InvalidSubscription {
                site: self.adapter.display_name().to_string(),
            });
        }

        let jar = ctx.cookies().await.map_err(FetchError::Browser)?;
        self.cookies
            .save(&jar)
            .await
            .map_err(FetchError::Storage)?;
        info!(agent = %agent, cookies = jar.len(), "login succeeded, session saved");
        Ok(())
    }

    async fn scroll_to_bottom(&self, ctx: &dyn RenderContext) -> Result<(), FetchError> {
        for _ in 0..self.timings.max_scroll_steps {
            ctx.execute_js(SCROLL_STEP_JS)
                .await
                .map_err(FetchError::Browser)?;
            tokio::time::sleep(self.timings.scroll_pause).await;
            let raw = ctx
                .execute_js(SCROLL_METRICS_JS)
                .await
                .map_err(FetchError::Browser)?;
            let metrics: ScrollMetrics = serde_json::from_value(raw)
                .context("unexpected scroll metrics")
                .map_err(FetchError::Browser)?;
            if metrics.remaining() < SCROLL_OFFSET {
                return Ok(());
            }
        }
        warn!(
            agent = %self.adapter.name(),
            steps = self.timings.max_scroll_steps,
            "page kept growing, giving up on scrolling"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scroll_metrics_parse_from_js_array() {
        let m: ScrollMetrics = serde_json::from_value(json!([3000, 2100, 800])).unwrap();
        assert_eq!(m.remaining(), 100.0);
        assert!(m.remaining() < SCROLL_OFFSET);

        let m: ScrollMetrics = serde_json::from_value(json!([3000.0, 0, 800])).unwrap();
        assert!(m.remaining() >= SCROLL_OFFSET);

        assert!(serde_json::from_value::<ScrollMetrics>(json!(null)).is_err());
    }

    #[test]
    fn test_step_script_uses_the_offset() {
        assert!(SCROLL_STEP_JS.contains(&format!("{}", SCROLL_OFFSET as i64)));
    }
}
