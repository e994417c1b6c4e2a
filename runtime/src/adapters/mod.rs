// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-site strategies.
//!
//! Each supported site implements [`SiteAdapter`]: static metadata, URL
//! cleaning, a readiness check, paywall detection and a login flow. Adapters
//! keep no state beyond what `init` derives from the site's configuration.

pub mod caixin;
pub mod financial_times;
pub mod the_initium;

use crate::config::{common_options, AgentConfig, ConfigOption};
use crate::error::{InitError, LoginError};
use crate::otp::OtpHandle;
use crate::renderer::{PageEventListener, RenderContext};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Names of every built-in site.
pub const SITE_NAMES: &[&str] = &[
    caixin::NAME,
    financial_times::NAME,
    the_initium::NAME,
];

/// Builds an adapter by site name. Injectable so tests can supply fakes.
pub type AdapterFactory = fn(&str) -> Option<Box<dyn SiteAdapter>>;

#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Stable identifier used in config and file names.
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn config_options(&self) -> Vec<ConfigOption>;
    /// Registrable domains routed to this site.
    fn base_domains(&self) -> Vec<String>;
    /// Known-good page used to probe connectivity and to replay cookies on.
    fn test_page(&self) -> &str;
    /// URL prefixes this site cannot fetch.
    fn url_prefix_block_list(&self) -> Vec<String>;
    fn default_rss_links(&self) -> Vec<String>;
    fn requires_scrolling(&self) -> bool;

    /// Validate and keep the site's configuration.
    fn init(&mut self, config: &AgentConfig) -> Result<(), InitError>;

    /// Canonical form of an article URL. Must be idempotent.
    fn clean_url(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }

    /// Block until the article page is ready.
    async fn check_finish_loading(&self, ctx: &dyn RenderContext) -> Result<()>;

    /// Whether the current page is gated.
    async fn is_paywalled(&self, ctx: &dyn RenderContext) -> Result<bool>;

    /// Log in if the page is gated. May request a one-time code.
    async fn ensure_logged_in(
        &self,
        ctx: &mut dyn RenderContext,
        otp: &OtpHandle,
    ) -> Result<(), LoginError>;

    /// Page event handler attached to every tab of this site.
    fn event_listener(&self) -> Option<Arc<dyn PageEventListener>> {
        None
    }
}

/// Build the adapter for `name`.
pub fn create(name: &str) -> Option<Box<dyn SiteAdapter>> {
    match name {
        caixin::NAME => Some(Box::new(caixin::Caixin::default())),
        financial_times::NAME => Some(Box::new(financial_times::FinancialTimes::default())),
        the_initium::NAME => Some(Box::new(the_initium::TheInitium::default())),
        _ => None,
    }
}

/// One fresh adapter per built-in site.
pub fn all() -> Vec<Box<dyn SiteAdapter>> {
    SITE_NAMES.iter().filter_map(|name| create(name)).collect()
}

/// Whether `url` starts with one of the adapter's blocked prefixes.
pub fn is_blocked(adapter: &dyn SiteAdapter, url: &str) -> bool {
    adapter
        .url_prefix_block_list()
        .iter()
        .any(|prefix| url.starts_with(prefix.as_str()))
}

/// Fail with `MissingOption` for the first required option left empty.
pub(crate) fn require_options(
    site: &str,
    config: &AgentConfig,
    options: &[ConfigOption],
) -> Result<(), InitError> {
    match options
        .iter()
        .find(|o| o.required && !config.is_set(&o.key))
    {
        Some(o) => Err(InitError::MissingOption {
            site: site.to_string(),
            option: o.key.clone(),
        }),
        None => Ok(()),
    }
}

/// Schema entries every site shares, with `rss_links` marked required when asked.
pub(crate) fn shared_options(rss_required: bool) -> Vec<ConfigOption> {
    common_options()
        .into_iter()
        .map(|o| {
            if rss_required && o.key == "rss_links" {
                o.required()
            } else {
                o
            }
        })
        .collect()
}

/// Dismisses whatever JavaScript dialog a page opens.
pub struct AcceptDialogs {
    pub site: &'static str,
}

impl PageEventListener for AcceptDialogs {
    fn on_dialog(&self, message: &str) -> crate::renderer::DialogAction {
        tracing::warn!(site = self.site, dialog = message, "accepting dialog");
        crate::renderer::DialogAction::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_covers_every_site() {
        for name in SITE_NAMES {
            let adapter = create(name).unwrap();
            assert_eq!(adapter.name(), *name);
            assert!(!adapter.test_page().is_empty());
            assert!(!adapter.base_domains().is_empty());
        }
        assert!(create("nytimes").is_none());
        assert_eq!(all().len(), SITE_NAMES.len());
    }

    #[test]
    fn test_clean_url_idempotent() {
        let urls = [
            "https://www.ft.com/content/abc?utm_source=rss#comments",
            "https://www.caixin.com/2024-09-24/102239.html?p0",
            "https://theinitium.com/article/20240924-x/",
            "https://www.ft.com/content/abc",
        ];
        for adapter in all() {
            for url in urls {
                let once = adapter.clean_url(url).unwrap();
                assert_eq!(adapter.clean_url(&once).unwrap(), once, "{}", adapter.name());
            }
        }
    }

    #[test]
    fn test_require_options() {
        let mut adapter = create(the_initium::NAME).unwrap();
        let err = adapter.init(&AgentConfig::default()).unwrap_err();
        assert!(matches!(err, InitError::MissingOption { ref option, .. } if option == "username"));

        let config = AgentConfig {
            username: "me".into(),
            password: "pw".into(),
            ..Default::default()
        };
        adapter.init(&config).unwrap();
    }
}
