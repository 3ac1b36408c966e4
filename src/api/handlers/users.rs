use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{user_to_response, UserResponse};
use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangedResponse {
    pub changed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<JSend<Vec<UserResponse>>> {
    let users = state.manager.users();
    JSend::success(users.iter().map(user_to_response).collect())
}

pub async fn add_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddUserRequest>,
) -> Result<Json<JSend<UserResponse>>, ApiError> {
    state.manager.add_user(&req.name, &req.password)?;
    Ok(JSend::success(UserResponse {
        name: req.name,
        providers: Vec::new(),
    }))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.manager.delete_user(&name)?;
    Ok(JSend::success(()))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<JSend<LoginResponse>>, ApiError> {
    let token = state.manager.issue_token(&name, &req.password)?;
    Ok(JSend::success(LoginResponse { token }))
}

pub async fn update_credential(
    State(state): State<Arc<AppState>>,
    Path((name, provider)): Path<(String, String)>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<JSend<ChangedResponse>>, ApiError> {
    let changed = state
        .manager
        .update_credential(&name, &provider, &req.secret)?;
    Ok(JSend::success(ChangedResponse { changed }))
}

pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    Path((name, provider)): Path<(String, String)>,
) -> Result<Json<JSend<ChangedResponse>>, ApiError> {
    let changed = state.manager.delete_credential(&name, &provider)?;
    Ok(JSend::success(ChangedResponse { changed }))
}
