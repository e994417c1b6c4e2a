// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! DOM queries and polling waits built on `execute_js`.
//!
//! Selectors are JSON-quoted before being spliced into scripts. Evaluation
//! errors while polling (for example a context torn down mid-navigation) are
//! treated as "not yet" and reported only if the wait times out.

use super::RenderContext;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound for element waits inside load-completion checks.
pub const ELEMENT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay between polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn as_bool(v: &Value) -> bool {
    v.as_bool().unwrap_or(false)
}

/// Number of elements matching a CSS selector.
pub async fn element_count(ctx: &dyn RenderContext, selector: &str) -> Result<usize> {
    let script = format!("document.querySelectorAll({}).length", quote(selector));
    let v = ctx.execute_js(&script).await?;
    Ok(v.as_u64().unwrap_or(0) as usize)
}

pub async fn exists(ctx: &dyn RenderContext, selector: &str) -> Result<bool> {
    Ok(element_count(ctx, selector).await? > 0)
}

/// Number of nodes matching an XPath expression.
pub async fn xpath_count(ctx: &dyn RenderContext, xpath: &str) -> Result<usize> {
    let script = format!(
        "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
        quote(xpath)
    );
    let v = ctx.execute_js(&script).await?;
    Ok(v.as_u64().unwrap_or(0) as usize)
}

/// Whether the first match is rendered with a non-empty box.
pub async fn is_visible(ctx: &dyn RenderContext, selector: &str) -> Result<bool> {
    let script = format!(
        r#"(() => {{
            const el = document.querySelector({});
            if (!el) return false;
            const style = window.getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return false;
            const rect = el.getBoundingClientRect();
            return rect.width > 0 || rect.height > 0;
        }})()"#,
        quote(selector)
    );
    Ok(as_bool(&ctx.execute_js(&script).await?))
}

/// Whether the selector is absent or not rendered.
pub async fn is_hidden(ctx: &dyn RenderContext, selector: &str) -> Result<bool> {
    Ok(!is_visible(ctx, selector).await?)
}

async fn poll_until<F, Fut>(what: &str, timeout: Option<Duration>, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut last_error = None;
    loop {
        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => last_error = Some(e),
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(match last_error {
                Some(e) => e.context(format!("timed out waiting for {what}")),
                None => anyhow!("timed out waiting for {what}"),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_document_ready(ctx: &dyn RenderContext, timeout: Duration) -> Result<()> {
    poll_until("document ready", Some(timeout), move || async move {
        let v = ctx.execute_js("document.readyState").await?;
        Ok(v.as_str() == Some("complete"))
    })
    .await
}

/// Wait until at least one element matches.
pub async fn wait_for_element(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
) -> Result<()> {
    poll_until(&format!("`{selector}`"), Some(timeout), || exists(ctx, selector)).await
}

/// Wait until the first match is absent or not rendered.
pub async fn wait_until_invisible(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
) -> Result<()> {
    poll_until(&format!("`{selector}` to hide"), Some(timeout), || {
        is_hidden(ctx, selector)
    })
    .await
}

/// Wait until no element matches. `None` waits indefinitely.
pub async fn wait_until_gone(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    poll_until(&format!("`{selector}` to go away"), timeout, move || async move {
        Ok(!exists(ctx, selector).await?)
    })
    .await
}

/// Wait until the first match is rendered. `None` waits indefinitely.
pub async fn wait_visible(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    poll_until(&format!("`{selector}` to show"), timeout, || {
        is_visible(ctx, selector)
    })
    .await
}

/// Wait until the title satisfies `accept`.
pub async fn wait_for_title<P>(ctx: &dyn RenderContext, timeout: Duration, accept: P) -> Result<()>
where
    P: Fn(&str) -> bool,
{
    let accept = &accept;
    poll_until("page title", Some(timeout), move || async move {
        Ok(accept(&ctx.get_title().await?))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::StoredCookie;
    use crate::renderer::{NavigationResult, PageEventListener};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers every script with the next scripted value; records scripts.
    struct ScriptedContext {
        answers: Vec<Value>,
        calls: AtomicUsize,
        scripts: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedContext {
        fn new(answers: Vec<Value>) -> Self {
            Self {
                answers,
                calls: AtomicUsize::new(0),
                scripts: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RenderContext for ScriptedContext {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
            })
        }
        async fn execute_js(&self, script: &str) -> Result<Value> {
            self.scripts.lock().unwrap().push(script.to_string());
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let v = self
                .answers
                .get(i)
                .or(self.answers.last())
                .cloned()
                .unwrap_or(Value::Null);
            Ok(v)
        }
        async fn get_html(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn get_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn get_title(&self) -> Result<String> {
            Ok(self.execute_js("document.title").await?.as_str().unwrap_or("").to_string())
        }
        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn cookies(&self) -> Result<Vec<StoredCookie>> {
            Ok(Vec::new())
        }
        async fn set_cookies(&self, _cookies: &[StoredCookie]) -> Result<()> {
            Ok(())
        }
        async fn listen(&mut self, _listener: Arc<dyn PageEventListener>) -> Result<()> {
            Ok(())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_selector_is_json_quoted() {
        let ctx = ScriptedContext::new(vec![Value::from(2)]);
        let n = element_count(&ctx, "a[aria-label='訂閱支持'] + \"x\"").await.unwrap();
        assert_eq!(n, 2);
        let script = ctx.scripts.lock().unwrap()[0].clone();
        assert!(script.contains(r#""a[aria-label='訂閱支持'] + \"x\"""#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_polls_until_present() {
        let ctx = ScriptedContext::new(vec![Value::from(0), Value::from(0), Value::from(1)]);
        wait_for_element(&ctx, "#the_content", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let ctx = ScriptedContext::new(vec![Value::from(0)]);
        let err = wait_for_element(&ctx, "#never", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("#never"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_title() {
        let ctx = ScriptedContext::new(vec![
            Value::from("端传媒 Initium Media"),
            Value::from("Some article"),
        ]);
        wait_for_title(&ctx, Duration::from_secs(5), |t| t != "端传媒 Initium Media")
            .await
            .unwrap();
    }
}
