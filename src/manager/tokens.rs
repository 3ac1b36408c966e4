use std::collections::HashMap;

use chrono::{SubsecRound, Utc};
use tracing::{debug, error, info};

use super::{token_list, AuthnError, UserManager};
use crate::storage::models::{Token, TokenList, User};
use crate::sync::SyncJob;

impl UserManager {
    /// Issue a token for a user, or return the one it already holds.
    ///
    /// An unexpired token is returned unchanged, so repeated logins within a
    /// session neither re-sign nor bump the version.
    pub fn issue_token(&self, id: &str, secret: &str) -> Result<String, AuthnError> {
        let mut tokens = self.tokens.lock();

        let creds = {
            let users = self.users.lock();
            match users.get(id) {
                Some(user) if user.secret_matches(secret) => user.creds.clone(),
                _ => {
                    debug!(user = %id, "Token request with invalid credentials");
                    return Err(AuthnError::InvalidCredentials);
                }
            }
        };

        let now = Utc::now();
        if let Some(existing) = tokens.get(id) {
            if !existing.is_expired_at(now) {
                return Ok(existing.signed.clone());
            }
        }

        let issued_at = now.trunc_subsecs(0);
        let expires_at = issued_at
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AuthnError::Signing("token expiry is out of range".to_string()))?;
        let token = self.codec.encode(id, issued_at, expires_at, &creds)?;
        let signed = token.signed.clone();

        let previous = tokens.insert(id.to_string(), token);
        self.version.bump();
        if let Err(e) = self.save_tokens(&tokens) {
            match previous {
                Some(old) => tokens.insert(id.to_string(), old),
                None => tokens.remove(id),
            };
            return Err(e.into());
        }
        drop(tokens);

        info!(user = %id, "Issued token");
        self.schedule(SyncJob::Tokens);
        Ok(signed)
    }

    /// Revoke a token by its signed value (logout).
    ///
    /// Unknown values are ignored: logging out with an already invalid token
    /// is not an error. Returns whether a token was removed.
    pub fn revoke_token(&self, signed: &str) -> Result<bool, AuthnError> {
        let mut tokens = self.tokens.lock();

        let Some(owner) = tokens
            .iter()
            .find(|(_, t)| t.signed == signed)
            .map(|(owner, _)| owner.clone())
        else {
            return Ok(false);
        };

        let removed = tokens.remove(&owner);
        self.version.bump();
        if let Err(e) = self.save_tokens(&tokens) {
            if let Some(token) = removed {
                tokens.insert(owner, token);
            }
            return Err(e.into());
        }
        drop(tokens);

        info!(user = %owner, "Revoked token");
        self.schedule(SyncJob::Tokens);
        Ok(true)
    }

    /// Resolve the owner of a live token.
    ///
    /// An expired token is evicted on the spot and reported as `Expired`.
    pub fn validate(&self, signed: &str) -> Result<User, AuthnError> {
        let mut tokens = self.tokens.lock();

        let (owner, expired) = tokens
            .iter()
            .find(|(_, t)| t.signed == signed)
            .map(|(owner, t)| (owner.clone(), t.is_expired_at(Utc::now())))
            .ok_or_else(AuthnError::token_not_found)?;

        if expired {
            tokens.remove(&owner);
            if let Err(e) = self.save_tokens(&tokens) {
                error!(error = %e, "Failed to save token list after expiry");
            }
            debug!(user = %owner, "Token expired");
            return Err(AuthnError::Expired);
        }

        // Token lock is held: user lock second
        let users = self.users.lock();
        users.get(&owner).cloned().ok_or(AuthnError::InvalidToken)
    }

    /// Evict expired tokens and return the live list stamped with the
    /// current version, persisting it to the token file.
    pub fn live_token_list(&self) -> TokenList {
        let mut tokens = self.tokens.lock();

        let now = Utc::now();
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        let reaped = before - tokens.len();
        if reaped > 0 {
            self.version.bump();
            debug!(count = reaped, "Removed expired tokens");
        }

        let list = token_list(&tokens, self.version.current());
        if let Err(e) = self.save_tokens(&tokens) {
            error!(error = %e, "Failed to save tokens");
        }
        list
    }

    /// Drop the token held by `owner`, returning whether one existed.
    /// `tokens` is the guarded token map.
    pub(super) fn revoke_owner(&self, tokens: &mut HashMap<String, Token>, owner: &str) -> bool {
        if tokens.remove(owner).is_none() {
            return false;
        }
        if let Err(e) = self.save_tokens(tokens) {
            error!(error = %e, user = %owner, "Failed to save tokens");
        }
        debug!(user = %owner, "Revoked token of removed user");
        true
    }
}
