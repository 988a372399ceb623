use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{BatchReactionsRequest, Caller, ToggleReactionRequest, ToggleReactionResponse};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{commit, run};

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let toggled = commit(
        &state,
        move |e| e.toggle_reaction(&caller, message_id, &req.emoji),
        |toggled| {
            Some(GatewayEvent::ReactionUpdate {
                conversation_id: toggled.conversation_id,
                message_id: toggled.message_id,
                reactions: toggled.reactions.clone(),
            })
        },
    )
    .await?;

    Ok(Json(ToggleReactionResponse {
        outcome: toggled.outcome,
        reactions: toggled.reactions,
    }))
}

pub async fn get_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let reactions = run(&state, move |e| e.aggregate_reactions(&caller, message_id)).await?;
    Ok(Json(reactions))
}

pub async fn batch_reactions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<BatchReactionsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let reactions = run(&state, move |e| e.aggregate_reactions_many(&caller, &req.message_ids)).await?;
    Ok(Json(reactions))
}
