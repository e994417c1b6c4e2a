//! The Initium (theinitium.com).

use super::{require_options, shared_options, SiteAdapter};
use crate::config::{AgentConfig, ConfigOption, FieldType};
use crate::error::{InitError, LoginError};
use crate::otp::OtpHandle;
use crate::renderer::wait::{self, ELEMENT_WAIT_TIMEOUT};
use crate::renderer::{RenderContext, NAVIGATION_TIMEOUT_MS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};
use zhconv::{zhconv, Variant};

pub const NAME: &str = "the_initium";

const TEST_PAGE: &str = "https://theinitium.com/404";
const DEFAULT_FEED: &str = "https://theinitium.com/newsfeed/";
const LOGIN_URL: &str = "https://theinitium.com/zh-Hans/auth/sign-in";
const PLACEHOLDER_TITLE: &str = "端传媒 Initium Media";

const PAYWALL_XPATH: &str =
    "//h2[contains(text(), '閱讀全文，歡迎加入會員') or contains(text(), '阅读全文，欢迎加入会员')]";
const ARTICLE_BODY: &str = "div[itemprop='articleBody']";

const LANGUAGE_SWITCH: &str = "button[aria-label='繁體中文']";
const SUBSCRIBE_LINK: &str = "a[aria-label='訂閱支持']";
const SIMPLIFIED_OPTION: &str = "a[aria-label='訂閱支持'] + button > span:first-child";
const LANGUAGE_SETTLE: Duration = Duration::from_secs(3);

const EMAIL_INPUT: &str = "input[type='email']";
const PASSWORD_INPUT: &str = "input[type='password']";
const SIGN_IN_BUTTON: &str = "button[aria-label='登入']";

const STEP_PAUSE: Duration = Duration::from_secs(1);

/// Whether `s` changes under Traditional-to-Simplified conversion.
pub fn contains_traditional_chinese(s: &str) -> bool {
    zhconv(s, Variant::ZhHans) != s
}

#[derive(Default)]
pub struct TheInitium {
    config: AgentConfig,
}

impl TheInitium {
    async fn switch_to_simplified(&self, ctx: &dyn RenderContext) -> Result<()> {
        if !wait::exists(ctx, LANGUAGE_SWITCH).await? {
            warn!(site = NAME, "language switcher not found, keeping Traditional Chinese");
            return Ok(());
        }
        info!(site = NAME, "switching to Simplified Chinese");
        wait::wait_visible(ctx, SUBSCRIBE_LINK, Some(ELEMENT_WAIT_TIMEOUT)).await?;
        ctx.click(SIMPLIFIED_OPTION)
            .await
            .context("failed to pick Simplified Chinese")?;
        tokio::time::sleep(LANGUAGE_SETTLE).await;
        Ok(())
    }

    async fn login(&self, ctx: &dyn RenderContext) -> Result<()> {
        info!(site = NAME, "logging in");
        wait::wait_visible(ctx, EMAIL_INPUT, None).await?;
        ctx.type_text(EMAIL_INPUT, &self.config.username).await?;
        tokio::time::sleep(STEP_PAUSE).await;
        ctx.type_text(PASSWORD_INPUT, &self.config.password).await?;
        tokio::time::sleep(STEP_PAUSE).await;
        ctx.click(SIGN_IN_BUTTON).await?;
        wait::wait_until_gone(ctx, SIGN_IN_BUTTON, None)
            .await
            .context("sign-in button never went away")?;
        Ok(())
    }
}

#[async_trait]
impl SiteAdapter for TheInitium {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "The Initium"
    }

    fn config_options(&self) -> Vec<ConfigOption> {
        let mut options = vec![
            ConfigOption::new("username", "Initium email", FieldType::Str).required(),
            ConfigOption::new("password", "Initium password", FieldType::Str).required(),
        ];
        options.extend(shared_options(false));
        options
    }

    fn base_domains(&self) -> Vec<String> {
        vec!["theinitium.com".to_string()]
    }

    fn test_page(&self) -> &str {
        TEST_PAGE
    }

    fn url_prefix_block_list(&self) -> Vec<String> {
        vec![
            "https://theinitium.com/project/".to_string(),
            "https://campaign.theinitium.com/".to_string(),
        ]
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
        let url = ctx.get_url().await?;
        let traditional =
            !url.contains("zh-Hans") && contains_traditional_chinese(&ctx.get_title().await?);
        if traditional {
            self.switch_to_simplified(ctx).await?;
        }
        wait::wait_for_element(ctx, ARTICLE_BODY, ELEMENT_WAIT_TIMEOUT).await?;
        wait::wait_for_title(ctx, ELEMENT_WAIT_TIMEOUT, |title| title != PLACEHOLDER_TITLE).await
    }

    async fn is_paywalled(&self, ctx: &dyn RenderContext) -> Result<bool> {
        Ok(wait::xpath_count(ctx, PAYWALL_XPATH).await? > 0)
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
        self.login(ctx).await?;
        Ok(())
    }
}
