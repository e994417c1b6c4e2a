//! Fetch pipeline scenarios against the fake browser.

mod common;

use common::*;
use paywire_runtime::cookies::CookieStore;
use paywire_runtime::error::{FailureKind, FetchError};
use paywire_runtime::store::ArticleQuery;
use std::sync::Arc;

const ARTICLE: &str = "https://fake.test/news/1";

async fn setup(adapter: FakeAdapter) -> (Arc<FakeWeb>, Arc<paywire_runtime::agent::Agent>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let web = FakeWeb::new();
    let agent = start_agent(adapter, &web, services(dir.path(), FakeFeed::new())).await;
    (web, agent, dir)
}

#[tokio::test]
async fn test_plain_article() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Rates on hold"));
    let start = web.state().navigations.len();

    let page = agent.fetch_page(ARTICLE).await.unwrap();
    assert_eq!(page.url, ARTICLE);
    assert!(page.html.contains("Rates on hold"));

    assert_eq!(web.navigations_since(start), vec!["about:blank", ARTICLE]);
    let state = web.state();
    assert_eq!(state.tabs_opened, state.tabs_closed);
    assert_eq!(state.scroll_steps, 1);
}

#[tokio::test]
async fn test_redirect_into_block_list() {
    let (web, agent, dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(
        ARTICLE,
        FakePage::article("gallery").redirect_to("https://fake.test/blocked/gallery"),
    );

    let err = agent.handle_article(ARTICLE).await.unwrap_err();
    assert!(matches!(err, FetchError::Blocked { ref url } if url == "https://fake.test/blocked/gallery"));
    assert_eq!(err.kind(), FailureKind::Skip);

    let services = agent.services();
    assert!(services.store.query(&ArticleQuery::default()).unwrap().is_empty());
    assert!(!services.html.exists(ARTICLE).await);
    assert!(!dir.path().join("html").join("https_fake.test_news_1.html").exists());
    let state = web.state();
    assert_eq!(state.tabs_opened, state.tabs_closed);
}

#[tokio::test]
async fn test_blocked_input_never_opens_a_tab() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    let opened = web.state().tabs_opened;
    let err = agent
        .handle_article("https://fake.test/blocked/x")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Blocked { .. }));
    assert_eq!(web.state().tabs_opened, opened);
}

#[tokio::test]
async fn test_login_returns_to_the_article() {
    let (web, agent, dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Members only").paywalled());
    web.add_page(ACCOUNT_URL, FakePage::article("Your account"));
    let start = web.state().navigations.len();

    let page = agent.fetch_page(ARTICLE).await.unwrap();
    assert_eq!(page.url, ARTICLE);
    assert!(page.html.contains("Members only"));
    assert!(!page.html.contains("Your account"));
    assert_eq!(
        web.navigations_since(start),
        vec!["about:blank", ARTICLE, LOGIN_URL, ARTICLE]
    );

    let jar = CookieStore::for_site(dir.path(), "fake").load().await.unwrap();
    assert_eq!(jar, vec![session_cookie()]);
}

#[tokio::test]
async fn test_invalid_subscription_is_terminal() {
    let (web, agent, dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Premium").paywalled());
    web.state().subscription_valid = false;

    let err = agent.fetch_page(ARTICLE).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidSubscription { .. }));
    assert_eq!(err.kind(), FailureKind::Terminal);
    assert!(!CookieStore::for_site(dir.path(), "fake").path().exists());
    let state = web.state();
    assert_eq!(state.tabs_opened, state.tabs_closed);
}

#[tokio::test]
async fn test_bad_connection_title() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Unable to connect"));

    let err = agent.fetch_page(ARTICLE).await.unwrap_err();
    assert!(matches!(err, FetchError::Connection { .. }));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn test_load_failure_is_transient() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article(BROKEN_TITLE));

    let err = agent.fetch_page(ARTICLE).await.unwrap_err();
    assert!(matches!(err, FetchError::LoadFailed(_)));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn test_navigation_error_closes_the_tab() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.state().fail_navigation = true;

    let err = agent.fetch_page(ARTICLE).await.unwrap_err();
    assert!(matches!(err, FetchError::Browser(_)));
    let state = web.state();
    assert_eq!(state.tabs_opened, state.tabs_closed);
}

#[tokio::test]
async fn test_endless_page_stops_at_the_scroll_cap() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Live blog"));
    web.state().endless_scroll = true;

    let page = agent.fetch_page(ARTICLE).await.unwrap();
    assert!(page.html.contains("Live blog"));
    assert_eq!(web.state().scroll_steps, fast_fetch().max_scroll_steps);
}

#[tokio::test]
async fn test_saved_cookies_skip_login() {
    let dir = tempfile::tempdir().unwrap();
    CookieStore::for_site(dir.path(), "fake")
        .save(&[session_cookie()])
        .await
        .unwrap();

    let web = FakeWeb::new();
    web.add_page(ARTICLE, FakePage::article("Members only").paywalled());
    let agent = start_agent(
        FakeAdapter::new("fake"),
        &web,
        services(dir.path(), FakeFeed::new()),
    )
    .await;

    {
        let state = web.state();
        assert_eq!(state.replayed.len(), 1);
        assert!(state.replayed[0].expires.is_some());
        assert!(state.logged_in);
    }

    let page = agent.fetch_page(ARTICLE).await.unwrap();
    assert!(page.html.contains("Members only"));
    assert!(!web.state().navigations.iter().any(|u| u == LOGIN_URL));
}

#[tokio::test]
async fn test_login_waits_for_operator_code() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake").with_otp()).await;
    web.add_page(ARTICLE, FakePage::article("Members only").paywalled());
    let otp = Arc::clone(&agent.services().otp);

    let fetch = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.fetch_page(ARTICLE).await }
    });
    while otp.pending_request().is_none() {
        tokio::task::yield_now().await;
    }
    assert_eq!(otp.pending_request().as_deref(), Some("Fake fake"));
    otp.submit("042042").unwrap();

    let page = fetch.await.unwrap().unwrap();
    assert!(page.html.contains("Members only"));
    assert!(web
        .state()
        .typed
        .contains(&("#code".to_string(), "042042".to_string())));
}

#[tokio::test]
async fn test_shutdown_cancels_a_pending_code_wait() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake").with_otp()).await;
    web.add_page(ARTICLE, FakePage::article("Members only").paywalled());
    let otp = Arc::clone(&agent.services().otp);

    let fetch = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.fetch_page(ARTICLE).await }
    });
    while otp.pending_request().is_none() {
        tokio::task::yield_now().await;
    }
    agent.shutdown().await;

    let err = fetch.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), FailureKind::Cancelled);
    assert!(otp.pending_request().is_none());
    assert_eq!(web.state().shutdowns, 1);
}

#[tokio::test]
async fn test_handle_article_keys_by_canonical_url() {
    let (web, agent, _dir) = setup(FakeAdapter::new("fake")).await;
    web.add_page(ARTICLE, FakePage::article("Rates on hold").redirect_to("https://fake.test/news/1-rates"));
    web.add_page("https://fake.test/news/1-rates", FakePage::article("Rates on hold"));

    agent
        .handle_article("https://fake.test/news/1?utm_source=rss")
        .await
        .unwrap();

    let services = agent.services();
    let records = services.store.query(&ArticleQuery::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, ARTICLE);
    assert_eq!(records[0].agent, "fake");
    assert_eq!(records[0].actual_url.as_deref(), Some("https://fake.test/news/1-rates"));
    assert!(!records[0].saved);
    assert!(services.html.read(ARTICLE).await.unwrap().contains("Rates on hold"));

    agent.handle_article(ARTICLE).await.unwrap();
    assert_eq!(services.store.query(&ArticleQuery::default()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_tab_close_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let web = FakeWeb::new();
    web.state().fail_close = true;
    web.add_page(ARTICLE, FakePage::article("Rates on hold"));

    let agent = start_agent(
        FakeAdapter::new("fake"),
        &web,
        services(dir.path(), FakeFeed::new()),
    )
    .await;
    let page = agent.fetch_page(ARTICLE).await.unwrap();
    assert!(page.html.contains("Rates on hold"));
    let state = web.state();
    assert_eq!(state.tabs_opened, state.tabs_closed);
}

#[tokio::test]
async fn test_missing_option_aborts_start() {
    let dir = tempfile::tempdir().unwrap();
    let web = FakeWeb::new();
    let err = paywire_runtime::agent::Agent::start(
        Box::new(FakeAdapter::new("fake")),
        Default::default(),
        FakeRenderer::new(Arc::clone(&web)),
        services(dir.path(), FakeFeed::new()),
        fast_fetch(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(
        err,
        paywire_runtime::error::InitError::MissingOption { .. }
    ));
    assert_eq!(web.state().tabs_opened, 0);
}
