use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::Caller;

use crate::auth::AppState;
use crate::error::run;

pub async fn start_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let signal = run(&state, move |e| e.set_typing(&caller, conversation_id)).await?;
    state.hub.typing_changed(conversation_id).await;
    Ok(Json(signal))
}

pub async fn active_typers(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let typers = run(&state, move |e| e.active_typers(&caller, conversation_id)).await?;
    Ok(Json(typers))
}
