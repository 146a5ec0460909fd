use super::handlers::{
    feed_handler, get_credentials_handler, get_dev_mode_handler, health_handler,
    ingest_event_handler, ingest_integration_status_handler, ingest_push_handler,
    save_credentials_handler, set_dev_mode_handler, snapshot_handler,
};
use super::state::AppState;
use super::ws::ws_handler;
use crate::{
    config::ServerConfig,
    error::{DashboardError, Result, ServerError},
    mobile::{handle_panic, mobile_adapter, with_compression, MobileAdapter},
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

/// Create the Axum router with all routes and the mobile adapter stack.
///
/// Layers, outermost first: request tracing, mobile compression, desktop
/// compression, the mobile adapter, panic recovery.
pub fn create_router(state: AppState) -> Router {
    let config = state.config();
    let adapter = MobileAdapter::new(
        config.mobile.clone(),
        config.server.request_timeout(),
        config.server.max_body_bytes,
    );

    let routes = Router::new()
        .route("/health", get(health_handler))
        .route("/api/dashboard/snapshot", get(snapshot_handler))
        .route("/api/dashboard/feed", get(feed_handler))
        .route(
            "/api/dev-mode",
            get(get_dev_mode_handler).put(set_dev_mode_handler),
        )
        .route("/api/events", post(ingest_event_handler))
        .route("/api/push", post(ingest_push_handler))
        .route(
            "/api/integrations/status",
            post(ingest_integration_status_handler),
        )
        .route(
            "/api/integrations/credentials",
            get(get_credentials_handler).post(save_credentials_handler),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(adapter, mobile_adapter));

    with_compression(routes).layer(TraceLayer::new_for_http())
}

/// HTTP server for the dashboard API and WebSocket relay
pub struct DashboardServer {
    pub(crate) config: ServerConfig,
    pub(crate) state: AppState,
}

impl DashboardServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Serve until `shutdown` is cancelled, then drain in-flight requests
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.address();
        let app = create_router(self.state);

        info!("Starting dashboard server on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| ServerError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("Dashboard server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Dashboard server stopped accepting connections");
        Ok(())
    }
}

/// Dashboard server builder
pub struct DashboardServerBuilder {
    config: Option<ServerConfig>,
    state: Option<AppState>,
}

impl DashboardServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            state: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<DashboardServer> {
        let config = self.config.ok_or_else(|| {
            DashboardError::Server(ServerError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let state = self.state.ok_or_else(|| {
            DashboardError::Server(ServerError::StartupFailed {
                details: "Application state is required".to_string(),
            })
        })?;

        Ok(DashboardServer::new(config, state))
    }
}

impl Default for DashboardServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
