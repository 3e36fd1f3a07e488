use std::sync::Arc;

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::app_state::AppState;
use super::rest_api;

/// Query bodies are a handful of ids and numbers.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Build the axum router with the member-list query routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/getMemberListWindow",
            axum::routing::post(rest_api::get_member_list_window),
        )
        .route(
            "/getChannelMemberListWindow",
            axum::routing::post(rest_api::get_channel_member_list_window),
        )
        .route(
            "/getUserCommunityRoleIds",
            axum::routing::post(rest_api::get_user_community_role_ids),
        )
        .route("/health", axum::routing::get(rest_api::health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
