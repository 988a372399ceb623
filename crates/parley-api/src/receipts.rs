use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Caller, MarkReadResponse, UnreadCountResponse};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{commit, run};

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = caller.user_id;
    let last_read_at = commit(
        &state,
        move |e| e.mark_read(&caller, conversation_id),
        move |last_read_at| {
            Some(GatewayEvent::ReadStatusUpdate {
                conversation_id,
                user_id,
                last_read_at: *last_read_at,
            })
        },
    )
    .await?;
    Ok(Json(MarkReadResponse { last_read_at }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let count = run(&state, move |e| e.unread_count(&caller, conversation_id)).await?;
    Ok(Json(UnreadCountResponse { conversation_id, count }))
}

pub async fn read_status(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let status = run(&state, move |e| e.read_status(&caller, conversation_id)).await?;
    Ok(Json(status))
}

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let counts = run(&state, move |e| e.unread_counts(&caller)).await?;
    Ok(Json(counts))
}
