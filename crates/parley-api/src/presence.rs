use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use parley_types::api::Caller;

use crate::auth::AppState;
use crate::error::status;

/// Client heartbeat. Also cancels a pending backgrounded-offline report.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    state.hub.cancel_offline(caller.user_id);
    let presence = state.hub.heartbeat(caller).await.map_err(status)?;
    Ok(Json(presence))
}

pub async fn offline(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    state.hub.cancel_offline(caller.user_id);
    let presence = state.hub.set_offline(caller).await.map_err(status)?;
    Ok(Json(presence))
}
