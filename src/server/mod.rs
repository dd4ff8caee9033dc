//! HTTP Boundary
//!
//! - `POST /query` with `{"query": "..."}`: 200 with a success envelope, 400 when
//!   `query` is absent or not a string, 500 with an error envelope on any pipeline
//!   failure
//! - `GET /health`: always 200 `{"status": "ok"}`
//!
//! The orchestrator is built once at startup and shared through an `Arc`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::DatabaseEngine;
use crate::error::{AskError, Result};
use crate::output::{ErrorEnvelope, SuccessEnvelope};
use crate::pipeline::QueryOrchestrator;

/// HTTP bind address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000 }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Routes over a shared orchestrator
pub fn router<E: DatabaseEngine + 'static>(orchestrator: Arc<QueryOrchestrator<E>>) -> Router {
    Router::new()
        .route("/query", post(query::<E>))
        .route("/health", get(health))
        .with_state(orchestrator)
}

/// Serve until Ctrl-C or SIGTERM, then close the engine's pool
///
/// # Errors
/// Returns `AskError::Config` when the address cannot be bound.
pub async fn serve<E: DatabaseEngine + 'static>(
    orchestrator: Arc<QueryOrchestrator<E>>,
    config: &ServerConfig,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.address())
        .await
        .map_err(|e| AskError::config(format!("Could not bind {}: {e}", config.address())))?;
    info!(address = %config.address(), "listening");

    let served = axum::serve(listener, router(Arc::clone(&orchestrator)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    orchestrator.engine().close().await;
    info!("server stopped, connections closed");

    served.map_err(|e| AskError::connection_failed(format!("HTTP server failed: {e}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn query<E: DatabaseEngine + 'static>(
    State(orchestrator): State<Arc<QueryOrchestrator<E>>>,
    body: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let question = body
        .ok()
        .and_then(|Json(value)| value.get("query").and_then(|q| q.as_str()).map(str::to_string));

    let Some(question) = question else {
        let err = AskError::invalid_input("Query is required and must be a string");
        return (StatusCode::BAD_REQUEST, Json(ErrorEnvelope::from_error(&err))).into_response();
    };

    match orchestrator.process(&question).await {
        Ok(outcome) => (StatusCode::OK, Json(SuccessEnvelope::new(outcome))).into_response(),
        Err(err) => {
            warn!(code = err.error_code(), "request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorEnvelope::from_error(&err)))
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_config_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(config, ServerConfig { host: "0.0.0.0".to_string(), port: 8080 });
        assert_eq!(ServerConfig::default().address(), "0.0.0.0:3000");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }
}
