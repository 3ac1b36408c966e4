use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::{user_to_response, UserResponse};
use crate::api::response::{ApiError, JSend};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<JSend<()>>, ApiError> {
    if req.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    state.manager.revoke_token(&req.token)?;
    Ok(JSend::success(()))
}

pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<JSend<UserResponse>>, ApiError> {
    if req.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let user = state.manager.validate(&req.token)?;
    Ok(JSend::success(user_to_response(&user)))
}
