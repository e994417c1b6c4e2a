//! Chromium session driver using chromiumoxide.

use super::{
    BrowserLauncher, DialogAction, NavigationResult, PageEventListener, RenderContext, Renderer,
};
use crate::cookies::StoredCookie;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const WINDOW_SIZE: (u32, u32) = (2280, 1020);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PAYWIRE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// One Chromium process serving one agent.
pub struct ChromiumRenderer {
    browser: tokio::sync::Mutex<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch Chromium with the desktop fingerprint the sites expect.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome or set PAYWIRE_CHROMIUM_PATH.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
        });

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            handler: Mutex::new(Some(handler)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open tab")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
            listener: None,
            closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Ok(pages) = browser.pages().await {
            for page in pages {
                let _ = page.close().await;
            }
        }
        if let Err(e) = browser.close().await {
            warn!("failed to close Chromium: {e}");
        }
        let _ = browser.wait().await;
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Launches a `ChromiumRenderer` per agent.
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, site: &str, headless: bool) -> Result<Arc<dyn Renderer>> {
        let renderer = ChromiumRenderer::launch(headless)
            .await
            .with_context(|| format!("browser for {site}"))?;
        Ok(Arc::new(renderer))
    }
}

/// A single Chromium tab.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
    listener: Option<JoinHandle<()>>,
    closed: bool,
}

fn to_stored(c: Cookie) -> StoredCookie {
    StoredCookie {
        name: c.name,
        value: c.value,
        domain: c.domain,
        path: c.path,
        secure: c.secure,
        http_only: c.http_only,
        same_site: c.same_site.map(|s| s.as_ref().to_string()),
        expires: (!c.session).then_some(c.expires),
    }
}

fn to_param(c: &StoredCookie) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(c.name.clone())
        .value(c.value.clone())
        .domain(c.domain.clone())
        .path(c.path.clone())
        .secure(c.secure)
        .http_only(c.http_only);
    if let Some(same_site) = c.same_site.as_deref() {
        if let Ok(same_site) = CookieSameSite::from_str(same_site) {
            builder = builder.same_site(same_site);
        }
    }
    if let Some(expires) = c.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder
        .build()
        .map_err(|e| anyhow!("invalid cookie {}: {e}", c.name))
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                let final_url = self.get_url().await.unwrap_or_else(|_| url.to_string());
                Ok(NavigationResult { final_url })
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn get_title(&self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .context("failed to get title")?
            .unwrap_or_default();
        Ok(title)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches `{selector}`"))?
            .click()
            .await
            .with_context(|| format!("failed to click `{selector}`"))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches `{selector}`"))?;
        element
            .click()
            .await
            .with_context(|| format!("failed to focus `{selector}`"))?;
        element
            .type_str(text)
            .await
            .with_context(|| format!("failed to type into `{selector}`"))?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("failed to read cookies")?;
        Ok(cookies.into_iter().map(to_stored).collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = cookies.iter().map(to_param).collect::<Result<Vec<_>>>()?;
        self.page
            .set_cookies(params)
            .await
            .context("failed to set cookies")?;
        Ok(())
    }

    async fn listen(&mut self, listener: Arc<dyn PageEventListener>) -> Result<()> {
        let mut dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .context("failed to subscribe to dialogs")?;
        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = dialogs.next().await {
                let accept = match listener.on_dialog(&event.message) {
                    DialogAction::Accept => true,
                    DialogAction::Dismiss => false,
                    DialogAction::Ignore => continue,
                };
                debug!(message = %event.message, accept, "handling dialog");
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(accept)).await {
                    warn!("failed to handle dialog: {e}");
                }
            }
        });
        if let Some(old) = self.listener.replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.closed = true;
        this.page
            .clone()
            .close()
            .await
            .context("failed to close tab")?;
        Ok(())
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if !self.closed {
            let page = self.page.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
