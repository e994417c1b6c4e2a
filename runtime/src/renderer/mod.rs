//! Browser session driver.
//!
//! `Renderer` is one browser process per agent; its default browser context
//! holds the agent's long-lived session (cookies, storage). Each fetch opens
//! an ephemeral tab through `new_context` and closes it on every exit path.

pub mod chromium;
pub mod wait;

use crate::cookies::StoredCookie;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Timeout for a single page navigation.
pub const NAVIGATION_TIMEOUT_MS: u64 = 120_000;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The URL after any redirects.
    pub final_url: String,
}

/// What to do with a JavaScript dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    Accept,
    Dismiss,
    /// Leave the dialog open.
    Ignore,
}

/// Handler for page-level events, registered for the lifetime of one tab.
pub trait PageEventListener: Send + Sync {
    fn on_dialog(&self, message: &str) -> DialogAction;
}

/// A browser engine bound to one agent's session.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new tab in the session's browser context.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Close every tab, then the browser process.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open tabs.
    fn active_contexts(&self) -> usize;
}

/// A single browser tab.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page and return the result (`null` for `undefined`).
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Get the document title.
    async fn get_title(&self) -> Result<String>;
    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str) -> Result<()>;
    /// Focus the first element matching a CSS selector and type into it.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;
    /// All cookies of the session.
    async fn cookies(&self) -> Result<Vec<StoredCookie>>;
    /// Add cookies to the session.
    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;
    /// Route page events to `listener` until the tab closes.
    async fn listen(&mut self, listener: Arc<dyn PageEventListener>) -> Result<()>;
    /// Close this tab.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts one browser per agent.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, site: &str, headless: bool) -> Result<Arc<dyn Renderer>>;
}
