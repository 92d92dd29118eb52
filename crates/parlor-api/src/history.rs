use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};

use parlor_db::{Store, blocking};
use parlor_types::api::{
    GroupHistoryEntry, GroupHistoryQuery, GroupHistoryResponse, HistoryEntry, HistoryQuery,
};
use parlor_types::events::wire_timestamp;

use crate::auth::AppState;
use crate::middleware::Identity;
use crate::{HandlerError, internal};

const HISTORY_LIMIT: u32 = 200;

/// Direct messages between the caller and `peer_id`, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, HandlerError> {
    let peer = query
        .peer_id
        .filter(|p| !p.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "peer_id required"))?;
    if peer == identity.user_id {
        return Err((StatusCode::BAD_REQUEST, "cannot load self history"));
    }

    let db = state.db.clone();
    let me = identity.user_id;
    let messages = blocking(move || db.direct_message_history(&me, &peer, HISTORY_LIMIT))
        .await
        .map_err(internal)?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| HistoryEntry {
                id: m.id.to_string(),
                from: m.sender,
                to: m.receiver,
                text: m.text,
                ts: wire_timestamp(m.sent_at),
            })
            .collect(),
    ))
}

/// Messages in `group_id`, oldest first. Only accepted members may read.
pub async fn get_group_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<GroupHistoryQuery>,
) -> Result<Json<GroupHistoryResponse>, HandlerError> {
    let group_id = query
        .group_id
        .filter(|g| !g.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "group_id required"))?;

    let db = state.db.clone();
    let me = identity.user_id;
    let messages = blocking(move || {
        if !db.is_accepted_group_member(&me, &group_id)? {
            return Ok(None);
        }
        db.group_message_history(&group_id, HISTORY_LIMIT).map(Some)
    })
    .await
    .map_err(internal)?
    .ok_or((StatusCode::FORBIDDEN, "Not a member of this group"))?;

    Ok(Json(GroupHistoryResponse {
        ok: true,
        messages: messages
            .into_iter()
            .map(|m| GroupHistoryEntry {
                id: m.id.to_string(),
                from: m.sender,
                group_id: m.group_id,
                text: m.text,
                ts: wire_timestamp(m.sent_at),
            })
            .collect(),
    }))
}
