//! HTTP server and internal scheduler loop
//!
//! Thin hosting layer: binding, serving, and the optional internal tick
//! that stands in for an external scheduler trigger.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::warn;

use crate::dispatcher::Dispatcher;

/// Binds a listener, returning the actual bound address
///
/// Binding port 0 picks a free port, which tests rely on.
///
/// # Errors
///
/// Returns an error if the address cannot be bound
pub async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    Ok((listener, actual_addr))
}

/// Serves the application on the given listener
///
/// # Errors
///
/// Returns an error if the server fails while running
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .await
        .map_err(std::io::Error::other)
}

/// Periodic dispatcher trigger for deployments without an external scheduler
///
/// Each tick is an independent budgeted invocation; a failed scan is logged
/// and the loop keeps ticking. Runs until the task is dropped.
pub async fn run_scheduler_loop(dispatcher: Arc<Dispatcher>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if let Err(e) = dispatcher.run(None).await {
            warn!(error = %e, "Scheduled dispatch invocation failed");
        }
    }
}
