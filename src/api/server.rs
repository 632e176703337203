//! API server setup: router assembly, CORS/tracing middleware, and the
//! graceful-shutdown wiring shared with the dispatcher's cancellation token.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{MakeSpan, OnResponse, TraceLayer};
use tracing::Span;

use crate::api::routes;
use crate::database::repositories::{JobManager, TokenRepository};
use crate::error::{Error, Result};
use crate::progress::ProgressBus;

/// Bind address and CORS/body-limit knobs for the API server.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 8765, enable_cors: true }
    }
}

impl ApiServerConfig {
    /// `API_BIND_ADDRESS` / `API_PORT` override the defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("API_BIND_ADDRESS") {
            if !addr.trim().is_empty() {
                config.bind_address = addr;
            }
        }
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.port = parsed;
            }
        }
        config
    }
}

/// Shared state every route handler reads from. The dispatcher owns its own
/// clones of the same `Arc`s so both sides observe one consistent store.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub jobs: Arc<dyn JobManager>,
    pub tokens: Arc<dyn TokenRepository>,
    pub bus: Arc<ProgressBus>,
}

impl AppState {
    pub fn new(jobs: Arc<dyn JobManager>, tokens: Arc<dyn TokenRepository>, bus: Arc<ProgressBus>) -> Self {
        Self { start_time: Instant::now(), jobs, tokens, bus }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self { config, state, cancel_token }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO).make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO).on_response(res, latency, span);
                    },
                ),
        )
    }

    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address: {e}")))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert!(config.enable_cors);
    }
}
