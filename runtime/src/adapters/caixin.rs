//! Caixin (caixin.com).

use super::{require_options, shared_options, AcceptDialogs, SiteAdapter};
use crate::config::{AgentConfig, ConfigOption, FieldType};
use crate::error::{FetchError, InitError, LoginError};
use crate::otp::OtpHandle;
use crate::renderer::wait::{self, ELEMENT_WAIT_TIMEOUT};
use crate::renderer::{PageEventListener, RenderContext, NAVIGATION_TIMEOUT_MS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const NAME: &str = "caixin";

const TEST_PAGE: &str = "https://www.caixin.com/";
const DEFAULT_FEED: &str = "https://rsshub.app/caixin/latest";
const LOGIN_URL: &str = "https://u.caixin.com/web/login";
const WORKBENCH_URL: &str = "https://u.caixin.com/web/workbench";
const PAYWALL: &str = "#chargeWallContent";
const UPGRADE_NOTICE: &str = "请升级后阅读";

const LOGIN_ICON: &str = "#app > div > section > div > div:nth-child(1) > div > div > span > svg > use";
const MOBILE_INPUT: &str = "input[name='mobile']";
const PASSWORD_INPUT: &str = "input[name='password']";
const AGREEMENT: &str = "#app > div > section > div > div.cx-login-argree > label > span > span";
const LOGIN_BUTTON: &str = "button.login-btn";

const STEP_PAUSE: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct Caixin {
    config: AgentConfig,
}

impl Caixin {
    async fn login(&self, ctx: &dyn RenderContext) -> Result<()> {
        info!(site = NAME, "logging in");
        wait::wait_visible(ctx, LOGIN_ICON, None)
            .await
            .context("login icon never showed")?;
        ctx.click(LOGIN_ICON).await?;

        wait::wait_visible(ctx, MOBILE_INPUT, None)
            .await
            .context("mobile input never showed")?;
        ctx.execute_js(&format!(
            "document.querySelector({}).value = ''",
            json!(MOBILE_INPUT)
        ))
        .await
        .context("failed to clear mobile input")?;
        ctx.type_text(MOBILE_INPUT, &self.config.username).await?;
        tokio::time::sleep(STEP_PAUSE).await;

        ctx.type_text(PASSWORD_INPUT, &self.config.password).await?;
        tokio::time::sleep(STEP_PAUSE).await;

        ctx.click(AGREEMENT)
            .await
            .context("failed to accept the agreement")?;
        tokio::time::sleep(STEP_PAUSE).await;

        ctx.click(LOGIN_BUTTON).await?;
        wait::wait_until_gone(ctx, LOGIN_BUTTON, None)
            .await
            .context("login button never went away")?;
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for Caixin {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Caixin"
    }

    fn config_options(&self) -> Vec<ConfigOption> {
        let mut options = vec![
            ConfigOption::new("username", "Caixin username", FieldType::Str)
                .describe("Mobile number used to sign in")
                .required(),
            ConfigOption::new("password", "Caixin password", FieldType::Str).required(),
        ];
        options.extend(shared_options(false));
        options.push(
            ConfigOption::new(
                "include_premium_articles",
                "Include data-pass articles",
                FieldType::Bool,
            )
            .describe("Requires a higher subscription tier")
            .with_default(json!(false)),
        );
        options
    }

    fn base_domains(&self) -> Vec<String> {
        vec!["caixin.com".to_string()]
    }

    fn test_page(&self) -> &str {
        TEST_PAGE
    }

    fn url_prefix_block_list(&self) -> Vec<String> {
        let mut prefixes = vec!["https://photos.caixin.com".to_string()];
        if !self.config.include_premium_articles {
            prefixes.push("https://database.caixin.com".to_string());
        }
        prefixes
    }

    fn default_rss_links(&self) -> Vec<String> {
        vec![DEFAULT_FEED.to_string()]
    }

    fn requires_scrolling(&self) -> bool {
        true
    }

    fn init(&mut self, config: &AgentConfig) -> Result<(), InitError> {
        require_options(NAME, config, &self.config_options())?;
        self.config = config.clone();
        Ok(())
    }

    async fn check_finish_loading(&self, ctx: &dyn RenderContext) -> Result<()> {
        wait::wait_for_element(ctx, "#the_content", ELEMENT_WAIT_TIMEOUT).await?;
        wait::wait_until_invisible(ctx, "#loadinWall", ELEMENT_WAIT_TIMEOUT).await?;
        if wait::exists(ctx, "div.content_video").await? {
            info!(site = NAME, "video found, waiting for its player");
            wait::wait_for_element(ctx, "div.cx-audio-rep", ELEMENT_WAIT_TIMEOUT).await?;
        }
        Ok(())
    }

    async fn is_paywalled(&self, ctx: &dyn RenderContext) -> Result<bool> {
        if !wait::exists(ctx, PAYWALL).await? || wait::is_hidden(ctx, PAYWALL).await? {
            return Ok(false);
        }
        let html = ctx.get_html().await?;
        if html.contains(UPGRADE_NOTICE) {
            return Err(FetchError::UpgradeRequired.into());
        }
        Ok(true)
    }

    async fn ensure_logged_in(
        &self,
        ctx: &mut dyn RenderContext,
        _otp: &OtpHandle,
    ) -> Result<(), LoginError> {
        if !self.is_paywalled(ctx).await? {
            return Ok(());
        }
        info!(site = NAME, "paywalled and not logged in");
        ctx.navigate(LOGIN_URL, NAVIGATION_TIMEOUT_MS)
            .await
            .context("failed to open login page")?;
        wait::wait_document_ready(ctx, ELEMENT_WAIT_TIMEOUT).await?;

        if ctx.get_url().await? == WORKBENCH_URL {
            return Err(LoginError::InvalidSubscription);
        }
        self.login(ctx).await?;
        Ok(())
    }

    fn event_listener(&self) -> Option<Arc<dyn PageEventListener>> {
        Some(Arc::new(AcceptDialogs { site: NAME }))
    }
}
