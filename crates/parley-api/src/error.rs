use axum::http::StatusCode;
use tracing::error;

use parley_core::{SyncEngine, SyncError};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;

/// Map an engine error to the HTTP status clients see.
pub fn status(err: SyncError) -> StatusCode {
    match err {
        SyncError::Unauthenticated => StatusCode::UNAUTHORIZED,
        SyncError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SyncError::Conflict(_) => StatusCode::CONFLICT,
        SyncError::Storage(e) => {
            error!("Storage error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run an engine operation off the async runtime and map its error.
/// Returns only after the operation has committed.
pub async fn run<T, F>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&SyncEngine) -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    state.hub.call(f).await.map_err(status)
}

/// Like [`run`], but also broadcasts the event derived from the committed
/// result, in commit order with every other change.
pub async fn commit<T, F, P>(state: &AppState, f: F, event: P) -> Result<T, StatusCode>
where
    F: FnOnce(&SyncEngine) -> Result<T, SyncError> + Send + 'static,
    P: FnOnce(&T) -> Option<GatewayEvent> + Send + 'static,
    T: Send + 'static,
{
    state.hub.commit(f, event).await.map_err(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(SyncError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(SyncError::NotAuthorized("x")), StatusCode::FORBIDDEN);
        assert_eq!(status(SyncError::NotFound("x")), StatusCode::NOT_FOUND);
        assert_eq!(status(SyncError::invalid("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status(SyncError::Conflict("x")), StatusCode::CONFLICT);
    }
}
