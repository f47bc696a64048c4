//! HTTP server for board webhooks.
//!
//! Every webhook path acknowledges with a 200-style JSON body regardless
//! of internal failures - the board retries aggressively on non-2xx and a
//! retry storm helps nobody. The only non-ack behavior is the subscription
//! handshake, which echoes the challenge back verbatim.

use axum::{body::Bytes, extract::State, response::Json, routing::get, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::assist::AssistClassifier;
use crate::board::BoardClient;
use crate::config::Config;
use crate::dedup::DedupSuppressor;
use crate::pipeline::{handle_status_update, handle_tracking_update};
use crate::router::NotificationRouter;
use crate::tracker::StalenessTracker;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Arc<Config>,
    /// Board API client.
    pub board: Arc<BoardClient>,
    /// Assisted classifier, when configured.
    pub assist: Option<Arc<AssistClassifier>>,
    /// Staleness tracker store.
    pub tracker: Arc<StalenessTracker>,
    /// Duplicate suppressor store.
    pub dedup: Arc<DedupSuppressor>,
    /// Notification router.
    pub router: Arc<NotificationRouter>,
}

/// Build the HTTP router for the service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/board", post(board_webhook_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Inbound webhook body: either a subscription handshake or an event.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    /// Subscription handshake token, echoed back verbatim
    #[serde(default)]
    pub challenge: Option<String>,
    /// Change event
    #[serde(default)]
    pub event: Option<WebhookEvent>,
}

/// A board change event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Board the change happened on
    pub board_id: i64,
    /// Changed item
    #[serde(alias = "itemId")]
    pub pulse_id: i64,
    /// Changed column id, absent for non-column events
    #[serde(default)]
    pub column_id: Option<String>,
    /// Event type label
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    /// New column value; shape varies by column type
    #[serde(default)]
    pub value: Option<Value>,
}

/// Pull a text value out of the event's column-value payload.
///
/// Column values arrive in several shapes (`"text"`, `{"text": ...}`,
/// `{"value": ...}`, `{"label": {"text": ...}}`); tolerate all of them.
#[must_use]
pub fn extract_text_value(value: &Value) -> Option<String> {
    fn non_empty(s: &str) -> Option<String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    match value {
        Value::String(s) => non_empty(s),
        Value::Object(map) => {
            for key in ["text", "value", "label"] {
                match map.get(key) {
                    Some(Value::String(s)) => {
                        if let Some(found) = non_empty(s) {
                            return Some(found);
                        }
                    }
                    Some(Value::Object(inner)) => {
                        if let Some(Value::String(s)) = inner.get("text") {
                            if let Some(found) = non_empty(s) {
                                return Some(found);
                            }
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Handle incoming board webhooks.
pub async fn board_webhook_handler(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload: WebhookBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Unparseable webhook payload");
            return Json(json!({
                "status": "ignored",
                "reason": "unparseable_payload"
            }));
        }
    };

    // Subscription handshake: echo the challenge back verbatim.
    if let Some(challenge) = payload.challenge {
        info!("Answering webhook subscription challenge");
        return Json(json!({ "challenge": challenge }));
    }

    let Some(event) = payload.event else {
        debug!("Webhook without challenge or event, ignoring");
        return Json(json!({
            "status": "ignored",
            "reason": "no_event"
        }));
    };

    let board = state.config.board_or_fallback(event.board_id);

    let Some(column_id) = event.column_id.as_deref() else {
        debug!(
            board_id = event.board_id,
            event_type = ?event.event_type,
            "Event without a column id, ignoring"
        );
        return Json(json!({
            "status": "ignored",
            "reason": "no_column"
        }));
    };

    if column_id == board.columns.status {
        let text = event.value.as_ref().and_then(extract_text_value);
        info!(
            board_id = event.board_id,
            item_id = event.pulse_id,
            has_text = text.is_some(),
            "Processing status update"
        );
        handle_status_update(&state, event.board_id, event.pulse_id, text).await;
        Json(json!({
            "status": "accepted",
            "item_id": event.pulse_id
        }))
    } else if column_id == board.columns.tracking {
        info!(
            board_id = event.board_id,
            item_id = event.pulse_id,
            "Processing tracking-column update"
        );
        handle_tracking_update(&state, event.board_id, event.pulse_id).await;
        Json(json!({
            "status": "accepted",
            "item_id": event.pulse_id,
            "action": "tracking_normalization"
        }))
    } else {
        debug!(
            board_id = event.board_id,
            column_id = column_id,
            "Column not monitored for this board, ignoring"
        );
        Json(json!({
            "status": "ignored",
            "reason": "column_not_monitored"
        }))
    }
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness check endpoint with store sizes for debugging.
async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "tracked_entities": state.tracker.tracked_entities().await,
        "recent_alerts": state.dedup.live_entries().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge_body() {
        let body: WebhookBody =
            serde_json::from_str(r#"{"challenge": "abc123"}"#).unwrap();
        assert_eq!(body.challenge.as_deref(), Some("abc123"));
        assert!(body.event.is_none());
    }

    #[test]
    fn test_parse_event_body() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "event": {
                    "boardId": 101,
                    "pulseId": 8812,
                    "columnId": "status",
                    "type": "update_column_value",
                    "value": {"text": "Held by customs"}
                }
            }"#,
        )
        .unwrap();

        let event = body.event.unwrap();
        assert_eq!(event.board_id, 101);
        assert_eq!(event.pulse_id, 8812);
        assert_eq!(event.column_id.as_deref(), Some("status"));
        assert_eq!(
            event.value.as_ref().and_then(extract_text_value).as_deref(),
            Some("Held by customs")
        );
    }

    #[test]
    fn test_extract_text_value_shapes() {
        assert_eq!(
            extract_text_value(&json!("Held by customs")).as_deref(),
            Some("Held by customs")
        );
        assert_eq!(
            extract_text_value(&json!({"text": "Held by customs"})).as_deref(),
            Some("Held by customs")
        );
        assert_eq!(
            extract_text_value(&json!({"value": "Held by customs"})).as_deref(),
            Some("Held by customs")
        );
        assert_eq!(
            extract_text_value(&json!({"label": {"text": "Held by customs"}})).as_deref(),
            Some("Held by customs")
        );
        assert_eq!(extract_text_value(&json!({"text": "  "})), None);
        assert_eq!(extract_text_value(&json!(42)), None);
    }
}
