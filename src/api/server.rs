use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::routes::{self, ControlState};
use crate::controller::idle;
use crate::controller::state::{ExitListener, ExitReason, ExitRequest};
use crate::controller::Controller;

pub fn router(controller: Arc<Controller>) -> Router {
    routes::api_router(ControlState { controller }).layer(TraceLayer::new_for_http())
}

pub async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding control endpoint to {}", addr))
}

/// Serve the control endpoint until `cancel` fires, then finish in-flight
/// responses.
pub async fn serve(
    listener: TcpListener,
    controller: Arc<Controller>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(controller))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Run the bridge until something requests exit, then tear it down.
///
/// Once the exit listener resolves the server stops accepting connections and
/// drains what is in flight (bounded by the drain timeout), so the
/// acknowledging DELETE response is written out before the terminal reclaim
/// runs. Returns the exit request; the caller ends the process with its code.
pub async fn serve_until_exit(
    listener: TcpListener,
    controller: Arc<Controller>,
    mut exit: ExitListener,
) -> ExitRequest {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "bridge control endpoint listening");
    }

    let cancel = CancellationToken::new();
    let mut server = tokio::spawn(serve(listener, Arc::clone(&controller), cancel.clone()));
    tokio::spawn(idle::run_watchdog(Arc::clone(&controller), cancel.clone()));

    let mut server_done = false;
    let request = tokio::select! {
        request = exit.wait() => request,
        joined = &mut server => {
            server_done = true;
            match joined {
                Ok(Ok(())) => warn!("control server stopped unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "control server failed"),
                Err(e) => error!(error = %e, "control server task panicked"),
            }
            controller.force_stop(1, ExitReason::ServerStopped);
            exit.wait().await
        }
    };
    info!(code = request.code, reason = %request.reason, "bridge exiting");

    cancel.cancel();
    if !server_done {
        let drain = controller.drain_timeout().await;
        match tokio::time::timeout(drain, &mut server).await {
            Ok(Ok(Err(e))) => warn!(error = %e, "control server failed while draining"),
            Ok(_) => {}
            Err(_) => {
                warn!(timeout = ?drain, "connections did not drain in time; closing them");
                server.abort();
            }
        }
    }

    controller.shutdown().await;
    request
}
