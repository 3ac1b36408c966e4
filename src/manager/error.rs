use thiserror::Error;

use crate::storage::models::UnknownProvider;
use crate::storage::StorageError;
use crate::tokens::TokenError;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("User '{0}' already registered")]
    AlreadyExists(String),
    #[error("Token expired")]
    Expired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid cloud provider: {0}")]
    InvalidProvider(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Failed to generate token: {0}")]
    Signing(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthnError {
    pub(crate) fn user_not_found(id: &str) -> Self {
        AuthnError::NotFound(format!("User '{id}'"))
    }

    pub(crate) fn token_not_found() -> Self {
        AuthnError::NotFound("Token".to_string())
    }
}

impl From<TokenError> for AuthnError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => AuthnError::InvalidToken,
            TokenError::Sign(e) => AuthnError::Signing(e.to_string()),
        }
    }
}

impl From<UnknownProvider> for AuthnError {
    fn from(e: UnknownProvider) -> Self {
        AuthnError::InvalidProvider(e.0)
    }
}
