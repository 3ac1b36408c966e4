use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let user_routes = Router::new()
        .route("/v1/users", get(handlers::list_users).post(handlers::add_user))
        .route(
            "/v1/users/:name",
            post(handlers::login).delete(handlers::delete_user),
        )
        .route(
            "/v1/users/:name/:provider",
            axum::routing::put(handlers::update_credential).delete(handlers::delete_credential),
        );

    let token_routes = Router::new()
        .route("/v1/tokens", delete(handlers::revoke_token))
        .route("/v1/tokens/verify", post(handlers::verify_token));

    Router::new()
        .merge(user_routes)
        .merge(token_routes)
        .route("/v1/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
