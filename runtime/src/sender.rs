//! Pushes fetched articles to the Readwise Reader save API.

use crate::config::ConfigHandle;
use crate::store::{ArticleQuery, ArticleRecord, ArticleStore, HtmlArchive};
use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const READWISE_SAVE_URL: &str = "https://readwise.io/api/v3/save/";

const SAVED_USING: &str = "Paywire";

#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub endpoint: String,
    pub poll_interval: Duration,
    /// Pause before each attempt after the first.
    pub attempt_pause: Duration,
    pub attempts: usize,
    pub request_timeout: Duration,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            endpoint: READWISE_SAVE_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            attempt_pause: Duration::from_secs(3),
            attempts: 4,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct SavePayload<'a> {
    url: &'a str,
    html: &'a str,
    should_clean_html: bool,
    location: &'a str,
    saved_using: &'a str,
}

pub struct Sender {
    client: reqwest::Client,
    config: Arc<ConfigHandle>,
    store: Arc<dyn ArticleStore>,
    html: HtmlArchive,
    options: SenderOptions,
}

impl Sender {
    pub fn new(
        config: Arc<ConfigHandle>,
        store: Arc<dyn ArticleStore>,
        html: HtmlArchive,
        options: SenderOptions,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            store,
            html,
            options,
        })
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("sender started");
        loop {
            match self.push_pending().await {
                Ok(0) => {}
                Ok(n) => info!(pushed = n, "articles sent to reader"),
                Err(e) => error!("push round failed: {e:#}"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("sender stopped");
    }

    /// Push every fetched, unsaved article once. Returns how many were saved.
    pub async fn push_pending(&self) -> Result<usize> {
        let config = self.config.snapshot();
        if config.read_later_token.trim().is_empty() {
            bail!("read-later token is empty, cannot send articles");
        }
        let pending = self.store.query(&ArticleQuery::pending_push())?;
        let mut pushed = 0;
        for record in pending {
            let html = match self.html.read(&record.url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %record.url, "no archived html, skipping: {e:#}");
                    continue;
                }
            };
            if self
                .push_with_retries(&record, &html, &config.read_later_token, &config.reader_location)
                .await
            {
                pushed += 1;
            }
        }
        Ok(pushed)
    }

    async fn push_with_retries(
        &self,
        record: &ArticleRecord,
        html: &str,
        token: &str,
        location: &str,
    ) -> bool {
        for attempt in 0..self.options.attempts {
            if attempt > 0 {
                tokio::time::sleep(self.options.attempt_pause).await;
            }
            match self.send(&record.url, html, token, location).await {
                Ok(body) => {
                    info!(url = %record.url, "saved to reader");
                    if let Err(e) = self.store.mark_saved(&record.url, &record.agent, &body) {
                        error!(url = %record.url, "failed to mark saved: {e:#}");
                    }
                    return true;
                }
                Err(e) => debug!(url = %record.url, attempt, "push failed: {e:#}"),
            }
        }
        warn!(url = %record.url, "push failed, will try again later");
        false
    }

    async fn send(&self, url: &str, html: &str, token: &str, location: &str) -> Result<String> {
        let payload = SavePayload {
            url,
            html,
            should_clean_html: true,
            location,
            saved_using: SAVED_USING,
        };
        let resp = self
            .client
            .post(&self.options.endpoint)
            .header("Authorization", format!("Token {token}"))
            .json(&payload)
            .send()
            .await
            .context("request failed")?;
        let status = resp.status();
        let body = resp.text().await.context("failed to read response body")?;
        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(body),
            other => bail!("unexpected status {other}: {body}"),
        }
    }
}
