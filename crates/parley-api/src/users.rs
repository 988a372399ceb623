use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Caller, SyncProfileRequest};

use crate::auth::AppState;
use crate::error::run;

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = run(&state, move |e| e.current_user(&caller)).await?;
    Ok(Json(user))
}

/// Push the identity provider's current profile into the local record.
pub async fn sync_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SyncProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = run(&state, move |e| e.sync_profile(&caller, &req)).await?;
    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let users = run(&state, move |e| e.list_users(&caller)).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_caller): Extension<Caller>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = run(&state, move |e| e.get_user(user_id)).await?;
    Ok(Json(user))
}
