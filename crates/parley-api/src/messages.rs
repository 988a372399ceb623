use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Caller, EditMessageRequest, SendMessageRequest, SendMessageResponse};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{commit, run};

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = run(&state, move |e| e.list_messages(&caller, conversation_id)).await?;
    Ok(Json(messages))
}

/// A retried send carrying an already-used idempotency key answers 200 with
/// the original id and broadcasts nothing.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let sent = commit(
        &state,
        move |e| {
            e.send_message(
                &caller,
                conversation_id,
                &req.content,
                req.reply_to_id,
                req.idempotency_key.as_deref(),
            )
        },
        |sent| {
            sent.created.then(|| GatewayEvent::MessageCreate {
                message: sent.message.clone(),
            })
        },
    )
    .await?;

    let body = SendMessageResponse {
        message_id: sent.message.id,
        created: sent.created,
    };
    let status = if sent.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(body)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = commit(
        &state,
        move |e| e.edit_message(&caller, message_id, &req.content),
        |message| {
            Some(GatewayEvent::MessageUpdate {
                message: message.clone(),
            })
        },
    )
    .await?;
    Ok(Json(message))
}

/// Idempotent: deleting a tombstone is a 204 with no broadcast.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    commit(
        &state,
        move |e| e.delete_message(&caller, message_id),
        |deleted| {
            deleted.changed.then(|| GatewayEvent::MessageDelete {
                conversation_id: deleted.conversation_id,
                message_id: deleted.message_id,
                deleted_at: deleted.deleted_at,
            })
        },
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
