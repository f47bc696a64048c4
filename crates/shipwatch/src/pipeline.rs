//! Per-event processing pipeline.
//!
//! One webhook event flows: fetch entity fresh from the board (falling
//! back to webhook data when the fetch fails) -> normalize the tracking
//! token -> classify (assisted or rules) and observe staleness -> gate
//! each issue through the duplicate suppressor -> route. Every
//! collaborator failure is caught and logged; the pipeline never returns
//! an error to the webhook handler.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::assist::{classify_update, AssistContext};
use crate::board::extract_tracking_token;
use crate::location::resolve_location;
use crate::models::TrackedEntity;
use crate::server::AppState;

/// Process a status-column update event.
pub async fn handle_status_update(
    state: &AppState,
    board_id: i64,
    item_id: i64,
    webhook_text: Option<String>,
) {
    let board = state.config.board_or_fallback(board_id);

    let entity = fetch_entity(state, item_id, webhook_text.as_deref(), &board.columns.status).await;

    // Webhook value wins over the (possibly older) fetched column value.
    let Some(update_text) = webhook_text
        .clone()
        .or_else(|| entity.field(&board.columns.status).map(str::to_string))
    else {
        debug!(item_id, "No update text on event or item, nothing to classify");
        return;
    };

    normalize_tracking_token(state, &entity, board_id, item_id, &board.columns.tracking).await;

    let context = AssistContext {
        item_name: entity.name.clone(),
        location: entity.field(&board.columns.location).map(str::to_string),
        due_date: entity.field(&board.columns.due_date).map(str::to_string),
    };

    let (classified, assist_location) =
        classify_update(state.assist.as_deref(), &update_text, None, &context).await;

    let now = Utc::now();
    let tracked = state.tracker.observe(item_id, &update_text, now).await;

    let location = resolve_location(
        entity.field(&board.columns.location),
        assist_location.as_deref(),
        Some(&update_text),
    );

    let issues = std::iter::once(classified)
        .chain(tracked)
        .filter(|issue| !issue.is_none());

    for issue in issues {
        if state
            .dedup
            .should_suppress(item_id, &update_text, issue.kind, now)
            .await
        {
            debug!(
                item_id,
                kind = issue.kind.as_str(),
                "Alert suppressed by dedup window"
            );
            continue;
        }

        info!(
            item_id,
            kind = issue.kind.as_str(),
            severity = issue.severity.as_str(),
            "Dispatching alert"
        );
        state
            .router
            .route(&issue, &entity, &board, &location, &update_text)
            .await;
    }
}

/// Process a tracking-column update event: normalization only.
pub async fn handle_tracking_update(state: &AppState, board_id: i64, item_id: i64) {
    let board = state.config.board_or_fallback(board_id);
    let entity = fetch_entity(state, item_id, None, &board.columns.status).await;
    normalize_tracking_token(state, &entity, board_id, item_id, &board.columns.tracking).await;
}

/// Fetch the entity fresh from the board, falling back to a minimal record
/// built from webhook data when the board is unreachable.
async fn fetch_entity(
    state: &AppState,
    item_id: i64,
    webhook_text: Option<&str>,
    status_column: &str,
) -> TrackedEntity {
    match state.board.fetch_item(item_id).await {
        Ok(Some(entity)) => entity,
        Ok(None) => {
            warn!(item_id, "Item not found on board, using webhook data only");
            minimal_entity(item_id, webhook_text, status_column)
        }
        Err(e) => {
            warn!(item_id, error = %e, "Board fetch failed, using webhook data only");
            minimal_entity(item_id, webhook_text, status_column)
        }
    }
}

fn minimal_entity(item_id: i64, webhook_text: Option<&str>, status_column: &str) -> TrackedEntity {
    let mut fields = HashMap::new();
    if let Some(text) = webhook_text {
        fields.insert(status_column.to_string(), text.to_string());
    }
    TrackedEntity {
        id: item_id,
        name: format!("item {item_id}"),
        fields,
    }
}

/// Normalize a tracking-URL column value into a bare tracking number.
///
/// Idempotent: a value that is already a bare token extracts to `None` and
/// no write happens.
async fn normalize_tracking_token(
    state: &AppState,
    entity: &TrackedEntity,
    board_id: i64,
    item_id: i64,
    tracking_column: &str,
) {
    let Some(raw) = entity.field(tracking_column) else {
        return;
    };
    let Some(token) = extract_tracking_token(raw) else {
        return;
    };

    match state
        .board
        .write_column(board_id, item_id, tracking_column, &token)
        .await
    {
        Ok(()) => info!(item_id, token = %token, "Tracking token normalized"),
        Err(e) => warn!(item_id, error = %e, "Failed to write normalized tracking token"),
    }
}
