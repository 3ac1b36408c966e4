//! In-memory identity state: registered users and their live tokens.
//!
//! Users and tokens live in two maps, each behind its own mutex. Code that
//! needs both always takes the token lock first, then the user lock. Every
//! mutation bumps the shared [`VersionCounter`], rewrites the affected file
//! while still holding the map's lock, and queues a push to the primary
//! through the [`SyncHandle`]. No network I/O happens under either lock.

mod error;
mod tokens;
mod users;

pub use error::AuthnError;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::storage::models::{ManagerState, Token, TokenList, User};
use crate::storage::{load_json, save_json, StorageError};
use crate::sync::{SyncHandle, SyncJob};
use crate::tokens::TokenCodec;
use crate::version::VersionCounter;

pub struct UserManager {
    codec: TokenCodec,
    sync: SyncHandle,
    token_ttl: chrono::Duration,
    /// Live tokens keyed by owner; at most one per user
    tokens: Mutex<HashMap<String, Token>>,
    tokens_path: PathBuf,
    users: Mutex<BTreeMap<String, User>>,
    users_path: PathBuf,
    version: VersionCounter,
}

/// Borrowed view of the user file, avoids cloning the map on every save
#[derive(Serialize)]
struct UsersFile<'a> {
    users: &'a BTreeMap<String, User>,
    version: i64,
}

impl UserManager {
    /// Load users and tokens from the data directory.
    ///
    /// A file that exists but cannot be read or parsed is an error: running
    /// with a partially loaded identity store is not safe. Individual tokens
    /// that no longer verify are dropped with a warning.
    pub fn open(config: &Config, sync: SyncHandle) -> Result<Self, AuthnError> {
        let codec = TokenCodec::new(&config.auth.secret);
        let users_path = config.users_path();
        let tokens_path = config.tokens_path();

        let users_file: Option<ManagerState> = load_json(&users_path)?;
        let token_file: Option<TokenList> = load_json(&tokens_path)?;
        let loaded_any = users_file.is_some() || token_file.is_some();

        let (users, users_version) = match users_file {
            Some(state) => {
                let users: BTreeMap<String, User> = state
                    .users
                    .into_values()
                    .map(|user| (user.id.clone(), user))
                    .collect();
                (users, state.version)
            }
            None => (BTreeMap::new(), 0),
        };

        let mut tokens = HashMap::new();
        let mut tokens_version = 0;
        if let Some(list) = token_file {
            tokens_version = list.version;
            for signed in &list.tokens {
                match codec.decode(signed) {
                    Ok(token) if users.contains_key(&token.owner) => {
                        tokens.insert(token.owner.clone(), token);
                    }
                    Ok(token) => {
                        warn!(user = %token.owner, "Dropping token of unknown user");
                    }
                    Err(e) => warn!(error = %e, "Dropping token that failed to decode"),
                }
            }
        }

        // Resume strictly above anything written (and possibly pushed) before
        let version = if loaded_any {
            VersionCounter::new(users_version.max(tokens_version) + 1)
        } else {
            VersionCounter::default()
        };

        info!(
            users = users.len(),
            tokens = tokens.len(),
            version = version.current(),
            "Loaded identity state"
        );

        let token_ttl = chrono::Duration::from_std(config.token_ttl())
            .map_err(|e| AuthnError::Signing(format!("token lifetime: {e}")))?;
        Ok(Self {
            codec,
            sync,
            token_ttl,
            tokens: Mutex::new(tokens),
            tokens_path,
            users: Mutex::new(users),
            users_path,
            version,
        })
    }

    /// Current state version
    pub fn version(&self) -> i64 {
        self.version.current()
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Snapshot of every user and credential map, for the primary's creds list
    pub fn credentials_snapshot(&self) -> ManagerState {
        let users = self.users.lock();
        ManagerState {
            users: users.clone(),
            version: self.version.current(),
        }
    }

    /// Caller must hold the user lock; `users` is the guarded map
    fn save_users(&self, users: &BTreeMap<String, User>) -> Result<(), StorageError> {
        save_json(
            &self.users_path,
            &UsersFile {
                users,
                version: self.version.current(),
            },
        )
    }

    /// Caller must hold the token lock; `tokens` is the guarded map
    fn save_tokens(&self, tokens: &HashMap<String, Token>) -> Result<(), StorageError> {
        save_json(&self.tokens_path, &token_list(tokens, self.version.current()))
    }

    fn schedule(&self, job: SyncJob) {
        self.sync.schedule(job);
    }
}

fn token_list(tokens: &HashMap<String, Token>, version: i64) -> TokenList {
    let mut live: Vec<&Token> = tokens.values().collect();
    live.sort_by(|a, b| a.owner.cmp(&b.owner));
    TokenList {
        tokens: live.into_iter().map(|t| t.signed.clone()).collect(),
        version,
    }
}
