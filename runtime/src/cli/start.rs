//! Run the supervisor, the read-later sender and the REST API until Ctrl-C.

use crate::agent::Services;
use crate::config::{resolve_data_dir, ConfigHandle, DataLayout};
use crate::feed::HttpFeedSource;
use crate::otp::OtpRendezvous;
use crate::renderer::chromium::ChromiumLauncher;
use crate::rest::{self, ApiState};
use crate::router::DomainRouter;
use crate::sender::{Sender, SenderOptions};
use crate::store::{ArticleStore, HtmlArchive, SqliteArticleStore};
use crate::supervisor::{Supervisor, SupervisorOptions};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default port of the operator API.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

pub async fn run(data_dir: Option<PathBuf>, http_port: u16) -> Result<()> {
    let layout = DataLayout::new(resolve_data_dir(data_dir.as_deref()));
    layout.ensure()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %layout.root().display(),
        "starting paywire"
    );

    let config = Arc::new(ConfigHandle::open(layout.config_path())?);
    if let Err(e) = config.snapshot().validate() {
        warn!("{e:#}; update it through PUT /api/v1/config");
    }

    let store: Arc<dyn ArticleStore> = Arc::new(
        SqliteArticleStore::open(&layout.db_path())
            .with_context(|| format!("failed to open {}", layout.db_path().display()))?,
    );
    let html = HtmlArchive::new(layout.html_dir());
    let otp = Arc::new(OtpRendezvous::new());
    let router = Arc::new(DomainRouter::new());

    let services = Services {
        store: Arc::clone(&store),
        html: html.clone(),
        feeds: Arc::new(HttpFeedSource::default()),
        otp: Arc::clone(&otp),
        cookie_dir: layout.cookie_dir(),
    };
    let supervisor = Supervisor::new(
        Arc::clone(&config),
        Arc::new(ChromiumLauncher),
        services,
        Arc::clone(&router),
        SupervisorOptions::default(),
    );
    let sender = Sender::new(Arc::clone(&config), store, html, SenderOptions::default())?;

    let shutdown = CancellationToken::new();
    let supervisor_task = tokio::spawn(supervisor.run(shutdown.clone()));
    let sender_task = tokio::spawn(sender.run(shutdown.clone()));

    let api = ApiState {
        otp,
        router,
        config,
    };
    eprintln!("  Paywire v{} started", env!("CARGO_PKG_VERSION"));
    eprintln!("  Operator API on http://0.0.0.0:{http_port}");

    let outcome = tokio::select! {
        result = rest::start(http_port, api) => result.context("REST API stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    shutdown.cancel();
    if let Err(e) = supervisor_task.await {
        warn!("supervisor task failed: {e}");
    }
    if let Err(e) = sender_task.await {
        warn!("sender task failed: {e}");
    }
    eprintln!("  Paywire stopped.");
    outcome
}
