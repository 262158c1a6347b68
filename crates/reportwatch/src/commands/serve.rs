//! Long-running commands: the watcher alone, or the watcher plus HTTP API.

use reportwatch_core::ReportService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `shutdown` on Ctrl+C.
fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C");
            return;
        }
        info!("Shutting down");
        shutdown.cancel();
    });
}

/// Watch the reports directory until interrupted.
pub async fn run_watch(service: ReportService) -> anyhow::Result<()> {
    ensure_root(&service)?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    println!("Watching {}", service.root().display());
    println!("Press Ctrl+C to stop");

    service.watch().run(shutdown).await?;
    Ok(())
}

/// Watch the reports directory and serve the HTTP API until interrupted.
pub async fn run_server(service: ReportService, address: SocketAddr) -> anyhow::Result<()> {
    ensure_root(&service)?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let service = Arc::new(service);
    let watcher = tokio::spawn(service.watch().run(shutdown.clone()));

    println!("Server running on http://{}", address);
    println!("Watching {}", service.root().display());
    println!("Press Ctrl+C to stop");

    let served = reportwatch_server::serve(Arc::clone(&service), address, shutdown.clone()).await;
    // A server that failed to start must not leave the watcher running.
    shutdown.cancel();

    match watcher.await {
        Ok(Err(e)) => warn!(error = %e, "Watcher stopped with an error"),
        Err(e) => warn!(error = %e, "Watcher task failed"),
        Ok(Ok(())) => {}
    }

    served?;
    Ok(())
}

fn ensure_root(service: &ReportService) -> anyhow::Result<()> {
    let root = service.root();
    if !root.is_dir() {
        anyhow::bail!("reports directory not found: {}", root.display());
    }
    Ok(())
}
