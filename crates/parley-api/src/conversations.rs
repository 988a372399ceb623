use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use parley_types::api::{Caller, CreateDirectRequest, CreateGroupRequest};

use crate::auth::AppState;
use crate::error::run;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversations = run(&state, move |e| e.list_conversations(&caller)).await?;
    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation = run(&state, move |e| e.get_conversation(&caller, conversation_id)).await?;
    Ok(Json(conversation))
}

/// 201 when this call created the conversation, 200 when it already existed.
pub async fn get_or_create_direct(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateDirectRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let (conversation, created) = run(&state, move |e| {
        let resolved = e.get_or_create_direct_conversation(&caller, req.other_user_id)?;
        Ok((e.get_conversation(&caller, resolved.conversation.id)?, resolved.created))
    })
    .await?;

    if created {
        debug!("Announcing direct conversation {}", conversation.id);
        state.hub.conversation_created(conversation.clone()).await;
        return Ok((StatusCode::CREATED, Json(conversation)));
    }
    Ok((StatusCode::OK, Json(conversation)))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation = run(&state, move |e| {
        let group = e.create_group_conversation(&caller, &req.name, &req.member_ids)?;
        e.get_conversation(&caller, group.id)
    })
    .await?;

    state.hub.conversation_created(conversation.clone()).await;
    Ok((StatusCode::CREATED, Json(conversation)))
}
