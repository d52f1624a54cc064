use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::db::MonitorStore;
use crate::server::state::MonitorState;

pub mod status_routes;

#[derive(Clone)]
pub struct AppState {
    pub monitor_state: Arc<MonitorState>,
    pub store: Arc<dyn MonitorStore>,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status_routes::status_routes())
        .with_state(app_state)
}

/// Serves the status surface until `shutdown` resolves.
pub async fn run_http_server(
    addr: SocketAddr,
    app_state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status endpoint listening.");
    axum::serve(listener, create_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}
