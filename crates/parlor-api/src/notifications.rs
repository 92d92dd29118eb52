use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use parlor_db::{Store, blocking};
use parlor_types::api::{
    MarkReadResponse, NotificationResponse, ReadByMessageRequest, UnreadCountResponse,
};
use parlor_types::events::wire_timestamp;

use crate::auth::AppState;
use crate::middleware::Identity;
use crate::{HandlerError, internal};

const LIST_LIMIT: u32 = 100;

/// The caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<NotificationResponse>>, HandlerError> {
    let db = state.db.clone();
    let notifications = blocking(move || db.get_notifications(&identity.user_id, LIST_LIMIT))
        .await
        .map_err(internal)?;

    Ok(Json(
        notifications
            .into_iter()
            .map(|n| NotificationResponse {
                id: n.id,
                kind: n.kind,
                content: n.content,
                is_read: n.is_read,
                created_at: wire_timestamp(n.created_at),
            })
            .collect(),
    ))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UnreadCountResponse>, HandlerError> {
    let db = state.db.clone();
    let count = blocking(move || db.unread_count(&identity.user_id))
        .await
        .map_err(internal)?;
    Ok(Json(UnreadCountResponse { ok: true, count }))
}

/// Mark one of the caller's notifications read. Ids belonging to someone
/// else are ignored; the response still carries the caller's count.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<MarkReadResponse>, HandlerError> {
    let db = state.db.clone();
    let me = identity.user_id.clone();
    blocking(move || db.mark_notification_read(id, &me))
        .await
        .map_err(internal)?;

    let unread = state
        .notifier
        .push_unread_badge(&identity.user_id)
        .await
        .map_err(internal)?;
    Ok(Json(MarkReadResponse { ok: true, unread }))
}

/// Clear the DM notifications for a message the caller has now seen.
pub async fn read_by_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReadByMessageRequest>,
) -> Result<Json<MarkReadResponse>, HandlerError> {
    if req.message_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "bad messageId"));
    }

    let db = state.db.clone();
    let me = identity.user_id.clone();
    blocking(move || db.mark_dm_notifications_read(&me, &req.message_id))
        .await
        .map_err(internal)?;

    let unread = state
        .notifier
        .push_unread_badge(&identity.user_id)
        .await
        .map_err(internal)?;
    Ok(Json(MarkReadResponse { ok: true, unread }))
}
