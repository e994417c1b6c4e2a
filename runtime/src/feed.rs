//! Feed fetching and parsing (RSS 2.0 and Atom).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;

/// One entry of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

/// Source of feed items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch `url` and return its items in document order.
    async fn parse(&self, url: &str) -> Result<Vec<FeedItem>>;
}

/// Fetches feeds over HTTP.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("paywire/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpFeedSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn parse(&self, url: &str) -> Result<Vec<FeedItem>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch feed {url}"))?
            .error_for_status()
            .with_context(|| format!("feed {url} returned an error status"))?;
        let body = resp
            .text()
            .await
            .with_context(|| format!("failed to read feed {url}"))?;
        parse_feed(&body).with_context(|| format!("failed to parse feed {url}"))
    }
}

#[derive(Default)]
struct Entry {
    title: String,
    link: String,
    date: String,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let rel = e
        .try_get_attribute("rel")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()));
    if rel.as_deref().is_some_and(|r| r != "alternate") {
        return None;
    }
    e.try_get_attribute("href")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
}

/// Parse an RSS `<item>` list or an Atom `<entry>` list.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    let mut saw_root = false;
    let mut current: Option<Entry> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "rss" | "feed" | "RDF" => saw_root = true,
                    "item" | "entry" => current = Some(Entry::default()),
                    "link" => {
                        if let (Some(entry), Some(href)) = (current.as_mut(), atom_href(&e)) {
                            if entry.link.is_empty() {
                                entry.link = href;
                            }
                        }
                    }
                    _ => {}
                }
                current_tag = name;
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), atom_href(&e)) {
                        if entry.link.is_empty() {
                            entry.link = href;
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "item" || name == "entry" {
                    if let Some(entry) = current.take() {
                        if !entry.link.is_empty() {
                            items.push(FeedItem {
                                title: entry.title.trim().to_string(),
                                link: entry.link.trim().to_string(),
                                published: parse_date(&entry.date),
                            });
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                append_text(current.as_mut(), &current_tag, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                append_text(current.as_mut(), &current_tag, &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "XML parse error at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(anyhow!("document is not an RSS or Atom feed"));
    }
    Ok(items)
}

fn append_text(entry: Option<&mut Entry>, tag: &str, text: &str) {
    let Some(entry) = entry else {
        return;
    };
    match tag {
        "title" => entry.title.push_str(text),
        "link" => entry.link.push_str(text.trim()),
        "pubDate" | "published" | "updated" | "date" => {
            if entry.date.is_empty() {
                entry.date = text.trim().to_string();
            }
        }
        _ => {}
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}
