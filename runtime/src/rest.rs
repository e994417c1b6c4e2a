// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP operator channel.
//!
//! Serves the pending one-time-code prompt and accepts the code, lists the
//! running agents, takes ad-hoc article URLs and reads or replaces the
//! configuration.

use crate::agent::AgentSummary;
use crate::config::{AppConfig, ConfigHandle};
use crate::error::DispatchError;
use crate::otp::OtpRendezvous;
use crate::router::DomainRouter;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Handles shared with every request.
#[derive(Clone)]
pub struct ApiState {
    pub otp: Arc<OtpRendezvous>,
    pub router: Arc<DomainRouter>,
    pub config: Arc<ConfigHandle>,
}

#[derive(Deserialize)]
struct OtpInput {
    input: String,
}

#[derive(Deserialize)]
struct ArticleInput {
    url: String,
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/otp", get(get_otp).post(post_otp))
        .route("/api/v1/agents", get(list_agents))
        .route("/api/v1/articles", post(post_article))
        .route("/api/v1/config", get(get_config).put(put_config))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until the future is dropped.
pub async fn serve(listener: tokio::net::TcpListener, state: ApiState) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("REST API listening on http://{addr}");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind `0.0.0.0:<port>` and serve.
pub async fn start(port: u16, state: ApiState) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn get_otp(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "prompt": state.otp.prompt() }))
}

async fn post_otp(State(state): State<ApiState>, Json(body): Json<OtpInput>) -> Json<Value> {
    match state.otp.submit(&body.input) {
        Ok(()) => Json(json!({ "success": true })),
        Err(e) => Json(json!({ "success": false, "message": e.to_string() })),
    }
}

async fn list_agents(State(state): State<ApiState>) -> Json<Vec<AgentSummary>> {
    Json(state.router.agents().iter().map(|a| a.summary()).collect())
}

/// Route the URL to its agent and fetch it in the background.
async fn post_article(State(state): State<ApiState>, Json(body): Json<ArticleInput>) -> Response {
    let agent = match state.router.dispatch(&body.url) {
        Ok(agent) => agent,
        Err(e @ DispatchError::InvalidUrl(_)) => {
            return failure(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ DispatchError::NoAgent(_)) => return failure(StatusCode::NOT_FOUND, e.to_string()),
    };
    let name = agent.name().to_string();
    let url = body.url;
    info!(agent = %name, url = %url, "article submitted");
    tokio::spawn({
        let url = url.clone();
        async move {
            match agent.handle_article(&url).await {
                Ok(page) => info!(agent = %agent.name(), url = %url, actual = %page.url, "article fetched"),
                Err(e) => warn!(agent = %agent.name(), url = %url, "submitted article failed: {e}"),
            }
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "agent": name, "url": url })),
    )
        .into_response()
}

async fn get_config(State(state): State<ApiState>) -> Json<Value> {
    Json(state.config.snapshot().export())
}

async fn put_config(State(state): State<ApiState>, Json(config): Json<AppConfig>) -> Response {
    match state.config.replace(config) {
        Ok(()) => {
            info!(path = %state.config.path().display(), "configuration replaced");
            Json(json!({ "success": true })).into_response()
        }
        Err(e) => failure(StatusCode::BAD_REQUEST, format!("{e:#}")),
    }
}
