mod admin;
mod tokens;
mod users;

pub use admin::health;
pub use tokens::{revoke_token, verify_token};
pub use users::{
    add_user, delete_credential, delete_user, list_users, login, update_credential,
};

use serde::Serialize;

use crate::storage::models::{Provider, User};

/// Public view of a user: never carries secrets
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub name: String,
    pub providers: Vec<Provider>,
}

fn user_to_response(user: &User) -> UserResponse {
    UserResponse {
        name: user.id.clone(),
        providers: user.creds.keys().copied().collect(),
    }
}
