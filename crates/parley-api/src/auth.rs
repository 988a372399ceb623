use std::sync::Arc;

use axum::http::StatusCode;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use parley_core::SyncError;
use parley_gateway::Hub;
use parley_types::api::{Caller, Claims};

use crate::error;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: Hub,
    pub jwt_secret: String,
}

/// Verify an HS256 token minted by the identity provider.
pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, SyncError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        SyncError::Unauthenticated
    })
}

/// Token → local user, provisioning the user on first sight. Shared by the
/// REST middleware and the gateway upgrade.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Caller, StatusCode> {
    let claims = decode_claims(&state.jwt_secret, token).map_err(error::status)?;
    error::run(state, move |e| e.resolve_caller(&claims)).await
}
