// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-agent RSS poller.
//!
//! Each cycle: read every feed, drop keyword hits, already-saved URLs and
//! blocked prefixes, fetch what is left, then sleep and retry one queued
//! failure. The close token is only checked between cycles.

use crate::agent::Agent;
use crate::error::{FailureKind, FetchError};
use crate::retry::{RetryItem, RetryOutcome};
use crate::store::ArticleQuery;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pauses of the poll loop. Tests shrink them.
#[derive(Debug, Clone)]
pub struct PollerTimings {
    /// Sleep between the feed pass and the retry of one queued item.
    pub cycle_interval: Duration,
    /// Pause after a failed fetch.
    pub failure_cooldown: Duration,
    /// Pause after a feed could not be read.
    pub feed_error_backoff: Duration,
}

impl Default for PollerTimings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(60),
            failure_cooldown: Duration::from_secs(10),
            feed_error_backoff: Duration::from_secs(10),
        }
    }
}

/// Counts for one feed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub queued: usize,
    /// Marked saved without fetching on the first cycle.
    pub marked: usize,
    /// The poller must stop.
    pub halted: bool,
}

/// Whether a feed title hits one of the (lower-case) keywords.
///
/// ASCII titles match whole whitespace-separated words, ignoring leading and
/// trailing punctuation; titles with any non-ASCII character match by
/// substring.
pub fn title_blocked(title: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let title = title.to_lowercase();
    if title.is_ascii() {
        let words: HashSet<&str> = title
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
            .collect();
        keywords.iter().any(|k| words.contains(k.as_str()))
    } else {
        keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

pub struct Poller {
    agent: Arc<Agent>,
    save_first_fetch: bool,
    first_cycle: bool,
    timings: PollerTimings,
}

impl Poller {
    pub fn new(agent: Arc<Agent>, save_first_fetch: bool, timings: PollerTimings) -> Self {
        Self {
            agent,
            save_first_fetch,
            first_cycle: true,
            timings,
        }
    }

    /// Loop until the agent's close token fires or a terminal failure.
    pub async fn run(mut self) {
        let name = self.agent.name().to_string();
        info!(agent = %name, "poller started");
        loop {
            if self.agent.is_closed() {
                break;
            }

            let candidates = match self.refresh().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(agent = %name, "feed refresh failed: {e:#}");
                    self.pause(self.timings.feed_error_backoff).await;
                    continue;
                }
            };

            let report = self.process(candidates).await;
            debug!(agent = %name, ?report, "cycle finished");
            if report.halted {
                break;
            }

            self.pause(self.timings.cycle_interval).await;
            if self.agent.is_closed() || !self.retry_one().await {
                break;
            }
        }
        info!(agent = %name, "poller stopped");
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.agent.close_token().cancelled() => {}
        }
    }

    /// Read every feed and return the canonical URLs worth fetching.
    pub async fn refresh(&self) -> Result<Vec<String>> {
        let agent = &self.agent;
        let keywords = agent.title_keywords();
        let mut links = Vec::new();
        for feed in agent.feed_links() {
            let items = agent
                .services()
                .feeds
                .parse(&feed)
                .await
                .with_context(|| format!("failed to read feed {feed}"))?;
            for item in items {
                if title_blocked(&item.title, &keywords) {
                    info!(agent = %agent.name(), title = %item.title, "filtered by keyword");
                    continue;
                }
                match agent.adapter().clean_url(&item.link) {
                    Ok(url) => links.push(url),
                    Err(e) => info!(agent = %agent.name(), link = %item.link, "skipping feed link: {e:#}"),
                }
            }
        }

        let mut seen = HashSet::new();
        links.retain(|url| seen.insert(url.clone()));

        let saved: HashSet<String> = agent
            .services()
            .store
            .query(&ArticleQuery::saved_among(&links))?
            .into_iter()
            .map(|r| r.url)
            .collect();

        Ok(links
            .into_iter()
            .filter(|url| !saved.contains(url))
            .filter(|url| {
                let blocked = agent.is_blocked(url);
                if blocked {
                    info!(agent = %agent.name(), url = %url, "skipping blocked url");
                }
                !blocked
            })
            .collect())
    }

    /// Fetch each candidate, or mark them all saved on a suppressed first cycle.
    pub async fn process(&mut self, candidates: Vec<String>) -> CycleReport {
        let agent = Arc::clone(&self.agent);
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        if self.first_cycle && !self.save_first_fetch {
            for url in &candidates {
                match agent.services().store.mark_saved(url, agent.name(), "") {
                    Ok(()) => report.marked += 1,
                    Err(e) => warn!(agent = %agent.name(), url = %url, "failed to mark saved: {e:#}"),
                }
            }
            info!(agent = %agent.name(), marked = report.marked, "first cycle, skipping backlog");
            self.first_cycle = false;
            return report;
        }
        self.first_cycle = false;

        for url in candidates {
            match agent.handle_article(&url).await {
                Ok(_) => {
                    info!(agent = %agent.name(), url = %url, "article fetched");
                    report.fetched += 1;
                }
                Err(e) => match self.on_failure(&url, e) {
                    FailureKind::Skip => report.skipped += 1,
                    FailureKind::Terminal | FailureKind::Cancelled => {
                        report.halted = true;
                        return report;
                    }
                    FailureKind::Transient => {
                        if agent.retry_queue().try_enqueue(RetryItem::new(url.as_str())) {
                            report.queued += 1;
                        } else {
                            warn!(agent = %agent.name(), url = %url, "retry queue full, dropping");
                        }
                        self.pause(self.timings.failure_cooldown).await;
                    }
                },
            }
        }
        report
    }

    /// Retry one queued URL. Returns `false` when the poller must stop.
    pub async fn retry_one(&self) -> bool {
        let agent = &self.agent;
        let Some(item) = agent.retry_queue().try_pop() else {
            return true;
        };
        let url = item.url.clone();
        debug!(agent = %agent.name(), url = %url, retried = item.retried_times, "retrying");
        let err = match agent.handle_article(&url).await {
            Ok(_) => {
                info!(agent = %agent.name(), url = %url, "retry succeeded");
                return true;
            }
            Err(e) => e,
        };
        match self.on_failure(&url, err) {
            FailureKind::Skip => true,
            FailureKind::Terminal | FailureKind::Cancelled => false,
            FailureKind::Transient => {
                match agent.retry_queue().record_failure(item) {
                    RetryOutcome::Requeued(n) => {
                        debug!(agent = %agent.name(), url = %url, retried = n, "requeued")
                    }
                    RetryOutcome::Exhausted => {
                        warn!(agent = %agent.name(), url = %url, "retry limit reached, dropping")
                    }
                    RetryOutcome::Dropped => {
                        warn!(agent = %agent.name(), url = %url, "retry queue full, dropping")
                    }
                }
                true
            }
        }
    }

    fn on_failure(&self, url: &str, err: FetchError) -> FailureKind {
        let agent = &self.agent;
        let kind = err.kind();
        match kind {
            FailureKind::Skip => info!(agent = %agent.name(), url = %url, "skipped: {err}"),
            FailureKind::Terminal => {
                error!(agent = %agent.name(), url = %url, "{err}, taking agent offline");
                agent.set_offline(err.to_string());
            }
            FailureKind::Cancelled => debug!(agent = %agent.name(), url = %url, "fetch cancelled"),
            FailureKind::Transient => warn!(agent = %agent.name(), url = %url, "fetch failed: {err}"),
        }
        kind
    }
}
