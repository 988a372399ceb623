//! REST surface over the sync engine. Every handler runs its engine call to
//! completion before publishing the matching gateway event.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod reactions;
pub mod receipts;
pub mod typing;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

pub async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/me", get(users::me).put(users::sync_profile))
        .route("/users", get(users::list_users))
        .route("/users/{user_id}", get(users::get_user))
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence/offline", post(presence::offline))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/direct", post(conversations::get_or_create_direct))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            get(reactions::get_reactions).post(reactions::toggle_reaction),
        )
        .route("/reactions/batch", post(reactions::batch_reactions))
        .route("/conversations/{conversation_id}/read", post(receipts::mark_read))
        .route("/conversations/{conversation_id}/unread", get(receipts::unread_count))
        .route("/conversations/{conversation_id}/read-status", get(receipts::read_status))
        .route("/unread", get(receipts::unread_counts))
        .route(
            "/conversations/{conversation_id}/typing",
            get(typing::active_typers).post(typing::start_typing),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(protected)
}
