//! HTTP server for reportwatch.
//!
//! A thin JSON adapter over `ReportService`: every route parses its
//! parameters, calls one service operation and maps the outcome.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use reportwatch_core::ReportService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve the HTTP API on `address` until `shutdown` is cancelled.
pub async fn serve(
    service: Arc<ReportService>,
    address: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
