//! `POST /event` handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use dispatch::EventSender;
use pipeline::{filter_notifications, normalize, Envelope, QueuedEvent};
use tracing::{debug, error, info, instrument, warn};

/// Path the registry is configured to notify.
pub const EVENT_PATH: &str = "/event";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct WebhookState {
    sender: EventSender,
}

impl WebhookState {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }
}

/// Builds the webhook router.
pub fn router(sender: EventSender) -> Router {
    Router::new()
        .route(EVENT_PATH, post(receive_event))
        .with_state(WebhookState::new(sender))
}

// Registries send `application/vnd.docker.distribution.events.v1+json`, so the
// body is decoded directly instead of through the `Json` extractor.
#[instrument(skip_all, fields(events))]
async fn receive_event(State(state): State<WebhookState>, body: Bytes) -> Response {
    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "rejecting undecodable notification body");
            return (
                StatusCode::BAD_REQUEST,
                format!("error decoding request body: {e}"),
            )
                .into_response();
        }
    };

    let received = envelope.events.len();
    tracing::Span::current().record("events", received);

    let mut queued = 0usize;
    for notification in filter_notifications(envelope.events) {
        let event = match normalize(&notification) {
            Ok(event) => event,
            Err(e) => {
                warn!(id = %notification.id, error = %e, "skipping malformed notification");
                continue;
            }
        };

        let item = QueuedEvent::new(event);
        debug!(
            delivery_id = %item.delivery_id,
            reference = %item.event.reference(),
            "received event from registry"
        );
        if let Err(closed) = state.sender.enqueue(item).await {
            error!(delivery_id = %closed.0.delivery_id, "dispatch queue closed; refusing delivery");
            return (StatusCode::SERVICE_UNAVAILABLE, "event queue is closed").into_response();
        }
        queued += 1;
    }

    info!(received, queued, "notification envelope processed");
    StatusCode::OK.into_response()
}
