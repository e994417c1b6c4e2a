//! Second-level-domain routing to running agents.
//!
//! The supervisor is the only writer; REST handlers and the sender read.

use crate::agent::Agent;
use crate::error::DispatchError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Last two labels of `host` (`www.ft.com` → `ft.com`).
pub fn second_level_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}

#[derive(Default)]
pub struct DomainRouter {
    routes: RwLock<HashMap<String, Arc<Agent>>>,
}

impl DomainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Agent>>> {
        self.routes.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Agent>>> {
        self.routes.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Route every base domain of `agent` to it.
    pub fn register(&self, agent: Arc<Agent>) {
        let mut routes = self.write();
        for domain in agent.base_domains() {
            routes.insert(second_level_domain(&domain), Arc::clone(&agent));
        }
    }

    /// Drop every route owned by the agent named `name`.
    pub fn unregister(&self, name: &str) {
        self.write().retain(|_, agent| agent.name() != name);
    }

    /// The agent owning the URL's second-level domain.
    pub fn dispatch(&self, raw: &str) -> Result<Arc<Agent>, DispatchError> {
        let url = Url::parse(raw).map_err(|e| DispatchError::InvalidUrl(format!("{raw}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| DispatchError::InvalidUrl(format!("{raw}: no host")))?;
        let sld = second_level_domain(host);
        self.read()
            .get(&sld)
            .cloned()
            .ok_or(DispatchError::NoAgent(sld))
    }

    /// Distinct routed agents, sorted by name.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = Vec::new();
        for agent in self.read().values() {
            if !agents.iter().any(|a| Arc::ptr_eq(a, agent)) {
                agents.push(Arc::clone(agent));
            }
        }
        agents.sort_by(|a, b| a.name().cmp(b.name()));
        agents
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
