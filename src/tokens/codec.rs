//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs keyed by the shared secret. The claim set is fixed:
//! `username`, `issued`, `expires` (RFC 2822 text, second precision) and
//! `creds`, the owner's provider credentials at issuance time.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::models::{Credentials, Token};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, structure, algorithm or claim failure. Deliberately a
    /// single kind: callers cannot tell tampering from a bad timestamp.
    #[error("Invalid token")]
    Invalid,
    #[error("Failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub creds: Credentials,
    pub expires: String,
    pub issued: String,
    pub username: String,
}

pub struct TokenCodec {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry lives in our own textual claim and is checked by the token store
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a token for `owner` embedding its current credentials
    pub fn encode(
        &self,
        owner: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        creds: &Credentials,
    ) -> Result<Token, TokenError> {
        let claims = Claims {
            creds: creds.clone(),
            expires: format_timestamp(expires_at),
            issued: format_timestamp(issued_at),
            username: owner.to_string(),
        };
        let signed =
            encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(TokenError::Sign)?;

        Ok(Token {
            expires_at: parse_timestamp(&claims.expires)?,
            issued_at: parse_timestamp(&claims.issued)?,
            owner: claims.username,
            signed,
        })
    }

    /// Verify a signed token and rebuild its store record
    pub fn decode(&self, signed: &str) -> Result<Token, TokenError> {
        let claims = self.decode_claims(signed)?;
        Ok(Token {
            expires_at: parse_timestamp(&claims.expires)?,
            issued_at: parse_timestamp(&claims.issued)?,
            owner: claims.username,
            signed: signed.to_string(),
        })
    }

    /// Verify a signed token and return its raw claims
    pub fn decode_claims(&self, signed: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(signed, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token failed verification");
            TokenError::Invalid
        })?;
        if data.claims.username.is_empty() {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &ALGORITHM)
            .finish()
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc2822()
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TokenError> {
    DateTime::parse_from_rfc2822(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| TokenError::Invalid)
}
