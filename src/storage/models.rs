use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StorageError;

/// Cloud provider a user can keep access credentials for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Aws, Provider::Azure, Provider::Gcp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Invalid cloud provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Per-provider credential map
pub type Credentials = BTreeMap<Provider, String>;

/// A registered user.
///
/// The secret is kept decoded in memory and written in its reversible
/// base64 form whenever the user is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "UserRecord", try_from = "UserRecord")]
pub struct User {
    pub creds: Credentials,
    pub id: String,
    secret: String,
}

impl User {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            creds: Credentials::new(),
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Byte-for-byte comparison against the decoded secret
    pub fn secret_matches(&self, secret: &str) -> bool {
        self.secret.as_bytes() == secret.as_bytes()
    }

    pub fn encoded_secret(&self) -> String {
        STANDARD.encode(self.secret.as_bytes())
    }
}

/// On-disk and on-wire form of a user
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    creds: Credentials,
    name: String,
    password: String,
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        let password = user.encoded_secret();
        Self {
            creds: user.creds,
            name: user.id,
            password,
        }
    }
}

impl TryFrom<UserRecord> for User {
    type Error = StorageError;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        let bytes = STANDARD.decode(record.password.as_bytes()).map_err(|e| {
            StorageError::Encoding(format!("password of user '{}': {e}", record.name))
        })?;
        let secret = String::from_utf8(bytes).map_err(|e| {
            StorageError::Encoding(format!("password of user '{}': {e}", record.name))
        })?;
        Ok(Self {
            creds: record.creds,
            id: record.name,
            secret,
        })
    }
}

/// A live bearer token held for its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub owner: String,
    /// Signed token string, also the lookup key for validation and revocation
    pub signed: String,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Token file contents and the body pushed to `<primary>/v1/tokens`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenList {
    pub tokens: Vec<String>,
    pub version: i64,
}

/// User file contents and the body pushed to `<primary>/v1/creds`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerState {
    pub users: BTreeMap<String, User>,
    pub version: i64,
}
