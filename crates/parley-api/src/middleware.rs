use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::auth::{AppState, authenticate};

/// Resolve the bearer token to a [`Caller`](parley_types::api::Caller) and
/// attach it to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let caller = authenticate(&state, bearer.token()).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
