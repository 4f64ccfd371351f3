//! regscan event source infrastructure.
//!
//! Receives registry notification envelopes on `POST /event`, keeps the
//! manifest pushes, normalizes them and hands them to the dispatch queue.
//! The queue applies back-pressure: a request is answered only after every
//! accepted event has been enqueued.
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | Envelope decoded; relevant events queued, malformed ones skipped |
//! | 400 | Body is not a notification envelope |
//! | 503 | The dispatch queue has shut down |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and body decoding live here. Filtering
//! and normalization rules come from [`pipeline::notification`].

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod webhook;

pub use webhook::{router, WebhookState, EVENT_PATH};

/// Errors from binding or running the HTTP server.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Binds the webhook port on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, ListenerError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })
}

/// Serves `router` on `listener` until `cancel` fires, then drains in-flight
/// requests.
pub async fn serve(
    listener: TcpListener,
    router: axum::Router,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "webhook listener started");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ListenerError::Serve)?;
    info!("webhook listener stopped");
    Ok(())
}
