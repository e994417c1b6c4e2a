// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reconciles the enabled-site list against the running agents.
//!
//! Every tick: reap agents that went offline, stop agents whose site was
//! disabled, start agents for newly enabled sites. A site whose start failed
//! is retried after a fixed back-off; an offline site stays down until it is
//! disabled and enabled again.

use crate::adapters::{self, AdapterFactory};
use crate::agent::{Agent, Services};
use crate::config::{AppConfig, ConfigHandle};
use crate::error::InitError;
use crate::pipeline::FetchTimings;
use crate::poller::{Poller, PollerTimings};
use crate::renderer::BrowserLauncher;
use crate::router::DomainRouter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a stopping poller gets before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub reconcile_interval: Duration,
    pub init_retry_backoff: Duration,
    pub fetch: FetchTimings,
    pub poller: PollerTimings,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(1),
            init_retry_backoff: Duration::from_secs(300),
            fetch: FetchTimings::default(),
            poller: PollerTimings::default(),
        }
    }
}

struct RunningAgent {
    agent: Arc<Agent>,
    poller: JoinHandle<()>,
}

pub struct Supervisor {
    config: Arc<ConfigHandle>,
    launcher: Arc<dyn BrowserLauncher>,
    factory: AdapterFactory,
    services: Services,
    router: Arc<DomainRouter>,
    options: SupervisorOptions,
    running: HashMap<String, RunningAgent>,
    offline: HashSet<String>,
    retry_at: HashMap<String, Instant>,
    warned_idle: bool,
}

impl Supervisor {
    pub fn new(
        config: Arc<ConfigHandle>,
        launcher: Arc<dyn BrowserLauncher>,
        services: Services,
        router: Arc<DomainRouter>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            config,
            launcher,
            factory: adapters::create,
            services,
            router,
            options,
            running: HashMap::new(),
            offline: HashSet::new(),
            retry_at: HashMap::new(),
            warned_idle: false,
        }
    }

    /// Replace the built-in adapter set.
    pub fn with_factory(mut self, factory: AdapterFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn router(&self) -> Arc<DomainRouter> {
        Arc::clone(&self.router)
    }

    /// Names of running agents, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of agents taken offline, sorted.
    pub fn offline(&self) -> Vec<String> {
        let mut names: Vec<String> = self.offline.iter().cloned().collect();
        names.sort();
        names
    }

    /// Reconcile until `shutdown` fires, then stop every agent.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("supervisor started");
        loop {
            self.reconcile().await;
            tokio::select! {
                _ = tokio::time::sleep(self.options.reconcile_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        self.stop_all().await;
        info!("supervisor stopped");
    }

    /// One reconcile tick.
    pub async fn reconcile(&mut self) {
        let config = self.config.snapshot();
        let mut enabled: Vec<String> = Vec::new();
        for site in &config.enabled_sites {
            if !enabled.contains(site) {
                enabled.push(site.clone());
            }
        }
        if enabled.is_empty() && !self.warned_idle {
            warn!("no enabled site");
        }
        self.warned_idle = enabled.is_empty();

        let gone_offline: Vec<String> = self
            .running
            .iter()
            .filter(|(_, r)| r.agent.is_offline())
            .map(|(name, _)| name.clone())
            .collect();
        for name in gone_offline {
            error!(agent = %name, "agent is offline until the site is re-enabled");
            self.stop_agent(&name).await;
            self.offline.insert(name);
        }

        let disabled: Vec<String> = self
            .running
            .keys()
            .filter(|name| !enabled.contains(name))
            .cloned()
            .collect();
        for name in disabled {
            info!(agent = %name, "disabling agent");
            self.stop_agent(&name).await;
        }
        self.offline.retain(|name| enabled.contains(name));
        self.retry_at.retain(|name, _| enabled.contains(name));

        let now = Instant::now();
        for name in enabled {
            if self.running.contains_key(&name) || self.offline.contains(&name) {
                continue;
            }
            if self.retry_at.get(&name).is_some_and(|at| *at > now) {
                continue;
            }
            info!(agent = %name, "enabling agent");
            match self.start_agent(&name, &config).await {
                Ok(running) => {
                    self.retry_at.remove(&name);
                    self.running.insert(name, running);
                }
                Err(e) => {
                    error!(agent = %name, "init failed: {e}");
                    self.retry_at
                        .insert(name, now + self.options.init_retry_backoff);
                }
            }
        }
    }

    async fn start_agent(&self, name: &str, config: &AppConfig) -> Result<RunningAgent, InitError> {
        let adapter =
            (self.factory)(name).ok_or_else(|| InitError::UnknownSite(name.to_string()))?;
        let renderer = self
            .launcher
            .launch(name, config.headless)
            .await
            .map_err(InitError::Browser)?;

        let agent = match Agent::start(
            adapter,
            config.agent(name),
            Arc::clone(&renderer),
            self.services.clone(),
            self.options.fetch.clone(),
        )
        .await
        {
            Ok(agent) => Arc::new(agent),
            Err(e) => {
                if let Err(shutdown) = renderer.shutdown().await {
                    warn!(agent = %name, "browser shutdown failed: {shutdown:#}");
                }
                return Err(e);
            }
        };

        self.router.register(Arc::clone(&agent));
        let poller = Poller::new(
            Arc::clone(&agent),
            config.save_first_fetch,
            self.options.poller.clone(),
        );
        let poller = tokio::spawn(poller.run());
        Ok(RunningAgent { agent, poller })
    }

    async fn stop_agent(&mut self, name: &str) {
        let Some(RunningAgent { agent, mut poller }) = self.running.remove(name) else {
            return;
        };
        agent.shutdown().await;
        self.router.unregister(name);
        if tokio::time::timeout(STOP_GRACE, &mut poller).await.is_err() {
            warn!(agent = %name, "poller did not stop in time, aborting");
            poller.abort();
        }
    }

    async fn stop_all(&mut self) {
        let names: Vec<String> = self.running.keys().cloned().collect();
        for name in names {
            self.stop_agent(&name).await;
        }
    }
}
