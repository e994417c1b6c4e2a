//! In-memory stand-ins for the browser, a site and its feeds.
//!
//! `FakeWeb` is the whole "internet" a fake browser sees: pages by URL, one
//! login endpoint and the session's cookies.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use paywire_runtime::adapters::SiteAdapter;
use paywire_runtime::agent::{Agent, Services};
use paywire_runtime::config::{AgentConfig, ConfigOption, FieldType};
use paywire_runtime::cookies::StoredCookie;
use paywire_runtime::error::{InitError, LoginError};
use paywire_runtime::feed::{FeedItem, FeedSource};
use paywire_runtime::otp::{OtpHandle, OtpRendezvous};
use paywire_runtime::pipeline::FetchTimings;
use paywire_runtime::poller::PollerTimings;
use paywire_runtime::renderer::{
    BrowserLauncher, NavigationResult, PageEventListener, RenderContext, Renderer,
};
use paywire_runtime::router::DomainRouter;
use paywire_runtime::store::{HtmlArchive, SqliteArticleStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const LOGIN_URL: &str = "https://fake.test/login";
pub const ACCOUNT_URL: &str = "https://fake.test/account";
pub const SESSION_COOKIE: &str = "session";
pub const BROKEN_TITLE: &str = "broken";

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub html: String,
    pub title: String,
    pub paywalled: bool,
    /// Where navigating to this page actually ends up.
    pub redirect: Option<String>,
}

impl FakePage {
    pub fn article(title: &str) -> Self {
        Self {
            html: format!("<html><h1>{title}</h1></html>"),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn paywalled(mut self) -> Self {
        self.paywalled = true;
        self
    }

    pub fn redirect_to(mut self, url: &str) -> Self {
        self.redirect = Some(url.to_string());
        self
    }
}

#[derive(Debug)]
pub struct WebState {
    pub pages: HashMap<String, FakePage>,
    pub logged_in: bool,
    pub subscription_valid: bool,
    pub session_cookies: Vec<StoredCookie>,
    pub replayed: Vec<StoredCookie>,
    pub navigations: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub tabs_opened: usize,
    pub tabs_closed: usize,
    pub listeners: usize,
    pub scroll_steps: usize,
    pub endless_scroll: bool,
    pub shutdowns: usize,
    pub fail_navigation: bool,
    pub fail_close: bool,
}

impl Default for WebState {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            logged_in: false,
            subscription_valid: true,
            session_cookies: Vec::new(),
            replayed: Vec::new(),
            navigations: Vec::new(),
            typed: Vec::new(),
            tabs_opened: 0,
            tabs_closed: 0,
            listeners: 0,
            scroll_steps: 0,
            endless_scroll: false,
            shutdowns: 0,
            fail_navigation: false,
            fail_close: false,
        }
    }
}

#[derive(Default)]
pub struct FakeWeb {
    state: Mutex<WebState>,
    /// When set, each browser shutdown records whether `fake.test` still routes.
    router: Mutex<Option<Arc<DomainRouter>>>,
    routed_at_shutdown: Mutex<Vec<bool>>,
}

impl FakeWeb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, WebState> {
        self.state.lock().unwrap()
    }

    pub fn add_page(&self, url: &str, page: FakePage) {
        self.state().pages.insert(url.to_string(), page);
    }

    pub fn watch_router(&self, router: Arc<DomainRouter>) {
        *self.router.lock().unwrap() = Some(router);
    }

    pub fn routed_at_shutdown(&self) -> Vec<bool> {
        self.routed_at_shutdown.lock().unwrap().clone()
    }

    /// Navigations after the agent's start-up probe.
    pub fn navigations_since(&self, start: usize) -> Vec<String> {
        self.state().navigations[start..].to_vec()
    }
}

pub fn session_cookie() -> StoredCookie {
    StoredCookie {
        name: SESSION_COOKIE.to_string(),
        value: "abc".to_string(),
        domain: ".fake.test".to_string(),
        path: "/".to_string(),
        secure: true,
        http_only: true,
        same_site: None,
        expires: None,
    }
}

pub struct FakeContext {
    web: Arc<FakeWeb>,
    current: String,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let mut web = self.web.state();
        if web.fail_navigation && url != "about:blank" {
            bail!("net::ERR_CONNECTION_RESET");
        }
        web.navigations.push(url.to_string());
        self.current = if url == LOGIN_URL {
            if web.subscription_valid {
                web.logged_in = true;
            }
            web.session_cookies = vec![session_cookie()];
            ACCOUNT_URL.to_string()
        } else {
            match web.pages.get(url).and_then(|p| p.redirect.clone()) {
                Some(target) => target,
                None => url.to_string(),
            }
        };
        Ok(NavigationResult {
            final_url: self.current.clone(),
        })
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        let mut web = self.web.state();
        if script.contains("scrollBy") {
            web.scroll_steps += 1;
            return Ok(Value::Null);
        }
        if script.contains("innerHeight") {
            return Ok(if web.endless_scroll {
                json!([100_000 + web.scroll_steps * 200, web.scroll_steps * 200, 800])
            } else {
                json!([1000, 200, 800])
            });
        }
        Ok(Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        let web = self.web.state();
        Ok(match web.pages.get(&self.current) {
            Some(page) if page.paywalled && !web.logged_in => {
                "<html><div id=\"paywall\">PAYWALL</div></html>".to_string()
            }
            Some(page) => page.html.clone(),
            None => String::new(),
        })
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn get_title(&self) -> Result<String> {
        let web = self.web.state();
        Ok(web
            .pages
            .get(&self.current)
            .map(|p| p.title.clone())
            .unwrap_or_default())
    }

    async fn click(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.web
            .state()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(self.web.state().session_cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let mut web = self.web.state();
        web.replayed.extend(cookies.iter().cloned());
        if cookies.iter().any(|c| c.name == SESSION_COOKIE) && web.subscription_valid {
            web.logged_in = true;
        }
        web.session_cookies.extend(cookies.iter().cloned());
        Ok(())
    }

    async fn listen(&mut self, _listener: Arc<dyn PageEventListener>) -> Result<()> {
        self.web.state().listeners += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.web.state();
        state.tabs_closed += 1;
        if state.fail_close {
            bail!("target already detached");
        }
        Ok(())
    }
}

pub struct FakeRenderer {
    web: Arc<FakeWeb>,
}

impl FakeRenderer {
    pub fn new(web: Arc<FakeWeb>) -> Arc<Self> {
        Arc::new(Self { web })
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.web.state().tabs_opened += 1;
        Ok(Box::new(FakeContext {
            web: Arc::clone(&self.web),
            current: "about:blank".to_string(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.web.state().shutdowns += 1;
        let router = self.web.router.lock().unwrap().clone();
        if let Some(router) = router {
            let routed = router.dispatch("https://fake.test/").is_ok();
            self.web.routed_at_shutdown.lock().unwrap().push(routed);
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        let web = self.web.state();
        web.tabs_opened - web.tabs_closed
    }
}

/// A site on `<name>.test` whose paywall is the word `PAYWALL`.
pub struct FakeAdapter {
    name: String,
    display_name: String,
    /// Ask the operator for a one-time code during login.
    pub uses_otp: bool,
    config: AgentConfig,
}

impl FakeAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: format!("Fake {name}"),
            uses_otp: false,
            config: AgentConfig::default(),
        }
    }

    pub fn with_otp(mut self) -> Self {
        self.uses_otp = true;
        self
    }

    fn domain(&self) -> String {
        format!("{}.test", self.name)
    }
}

#[async_trait]
impl SiteAdapter for FakeAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn config_options(&self) -> Vec<ConfigOption> {
        vec![ConfigOption::new("username", "Username", FieldType::Str).required()]
    }

    fn base_domains(&self) -> Vec<String> {
        vec![self.domain()]
    }

    fn test_page(&self) -> &str {
        "https://fake.test/"
    }

    fn url_prefix_block_list(&self) -> Vec<String> {
        vec![format!("https://{}/blocked/", self.domain())]
    }

    fn default_rss_links(&self) -> Vec<String> {
        vec![format!("https://{}/feed", self.domain())]
    }

    fn requires_scrolling(&self) -> bool {
        true
    }

    fn init(&mut self, config: &AgentConfig) -> Result<(), InitError> {
        if config.username.is_empty() {
            return Err(InitError::MissingOption {
                site: self.name.clone(),
                option: "username".to_string(),
            });
        }
        self.config = config.clone();
        Ok(())
    }

    fn clean_url(&self, url: &str) -> Result<String> {
        if !url.starts_with("https://") {
            bail!("not an https url");
        }
        Ok(url.split(['?', '#']).next().unwrap_or(url).to_string())
    }

    async fn check_finish_loading(&self, ctx: &dyn RenderContext) -> Result<()> {
        if ctx.get_title().await? == BROKEN_TITLE {
            return Err(anyhow!("article body never appeared"));
        }
        Ok(())
    }

    async fn is_paywalled(&self, ctx: &dyn RenderContext) -> Result<bool> {
        Ok(ctx.get_html().await?.contains("PAYWALL"))
    }

    async fn ensure_logged_in(
        &self,
        ctx: &mut dyn RenderContext,
        otp: &OtpHandle,
    ) -> Result<(), LoginError> {
        if !self.is_paywalled(ctx).await? {
            return Ok(());
        }
        if self.uses_otp {
            let code = otp.request_code(&self.display_name).await?;
            ctx.type_text("#code", &code).await?;
        }
        ctx.navigate(LOGIN_URL, 1_000).await?;
        Ok(())
    }
}

pub fn fake_factory(name: &str) -> Option<Box<dyn SiteAdapter>> {
    match name {
        "fake" | "other" => Some(Box::new(FakeAdapter::new(name))),
        _ => None,
    }
}

/// Feeds by URL; unknown feeds are empty.
#[derive(Default)]
pub struct FakeFeed {
    feeds: Mutex<HashMap<String, Result<Vec<FeedItem>, String>>>,
}

impl FakeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set<S: AsRef<str>>(&self, url: &str, items: &[(&str, S)]) {
        let items = items
            .iter()
            .map(|(title, link)| FeedItem {
                title: title.to_string(),
                link: link.as_ref().to_string(),
                published: None,
            })
            .collect();
        self.feeds.lock().unwrap().insert(url.to_string(), Ok(items));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.feeds
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn parse(&self, url: &str) -> Result<Vec<FeedItem>> {
        match self.feeds.lock().unwrap().get(url) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Ok(Vec::new()),
        }
    }
}

pub struct FakeLauncher {
    pub web: Arc<FakeWeb>,
    pub launched: Mutex<Vec<String>>,
    pub failing: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub fn new(web: Arc<FakeWeb>) -> Arc<Self> {
        Arc::new(Self {
            web,
            launched: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, site: &str, _headless: bool) -> Result<Arc<dyn Renderer>> {
        self.launched.lock().unwrap().push(site.to_string());
        if self.failing.lock().unwrap().iter().any(|s| s == site) {
            bail!("chromium exited early");
        }
        Ok(FakeRenderer::new(Arc::clone(&self.web)))
    }
}

pub fn fast_fetch() -> FetchTimings {
    FetchTimings {
        settle_delay: Duration::ZERO,
        scroll_pause: Duration::ZERO,
        max_scroll_steps: 5,
    }
}

pub fn fast_poller() -> PollerTimings {
    PollerTimings {
        cycle_interval: Duration::from_millis(10),
        failure_cooldown: Duration::ZERO,
        feed_error_backoff: Duration::from_millis(10),
    }
}

pub fn services(dir: &Path, feeds: Arc<FakeFeed>) -> Services {
    Services {
        store: Arc::new(SqliteArticleStore::open_in_memory().unwrap()),
        html: HtmlArchive::new(dir.join("html")),
        feeds,
        otp: Arc::new(OtpRendezvous::new()),
        cookie_dir: dir.to_path_buf(),
    }
}

pub fn agent_config() -> AgentConfig {
    AgentConfig {
        username: "reader@example.com".to_string(),
        password: "pw".to_string(),
        ..Default::default()
    }
}

/// A started agent for `adapter` over `web`.
pub async fn start_agent(
    adapter: FakeAdapter,
    web: &Arc<FakeWeb>,
    services: Services,
) -> Arc<Agent> {
    let agent = Agent::start(
        Box::new(adapter),
        agent_config(),
        FakeRenderer::new(Arc::clone(web)),
        services,
        fast_fetch(),
    )
    .await
    .unwrap();
    Arc::new(agent)
}
