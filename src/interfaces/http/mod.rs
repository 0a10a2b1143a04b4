//! HTTP boundary: maps routes onto [`GateService`](crate::application::service::GateService).

pub mod error;
pub mod routes;

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Serves `router` until the process is asked to terminate.
///
/// Signal handlers are installed before the listener starts accepting, so a
/// registration failure aborts startup instead of shutting down at once.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    let shutdown = shutdown_signal()?;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, shutting down"),
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        }
    })
}
