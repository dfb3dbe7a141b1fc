//! Token authority
//!
//! The only component that mints or revokes credential pairs. A credential is
//! accepted only when its signature is valid *and* its uuid is registered in
//! the credential cache under the user that the token names.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::jwt::{Claims, SignerError, TokenKind, TokenSigner, TokenSubject};
use crate::cache::{CacheError, CredentialCache};
use crate::config::{CacheConfig, JwtConfig};
use crate::models::CredentialPair;

/// Why a presented credential was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    Expired,

    #[error("token malformed")]
    Malformed,

    #[error("token not registered")]
    NotRegistered,

    #[error("token user mismatch")]
    UserMismatch,

    #[error("token user no longer exists")]
    UnknownUser,
}

impl From<SignerError> for CredentialError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::InvalidSignature | SignerError::WrongKind => {
                CredentialError::SignatureInvalid
            }
            SignerError::Expired => CredentialError::Expired,
            SignerError::Malformed(_) | SignerError::EncodingFailed(_) => {
                CredentialError::Malformed
            }
        }
    }
}

/// Token authority errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Credential rejected: {0}")]
    Rejected(CredentialError),

    #[error("Credential cache error: {0}")]
    Cache(CacheError),
}

#[derive(Clone)]
pub struct TokenAuthority {
    signer: Arc<dyn TokenSigner>,
    cache: CredentialCache,
    access_ttl: Duration,
    refresh_ttl: Duration,
    access_prefix: String,
    refresh_prefix: String,
}

impl TokenAuthority {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        cache: CredentialCache,
        jwt: &JwtConfig,
        keys: &CacheConfig,
    ) -> Self {
        Self {
            signer,
            cache,
            access_ttl: jwt.access_ttl(),
            refresh_ttl: jwt.refresh_ttl(),
            access_prefix: keys.access_uuid_prefix.clone(),
            refresh_prefix: keys.refresh_uuid_prefix.clone(),
        }
    }

    /// Cache key under which a token uuid of `kind` is registered
    pub fn uuid_key(&self, kind: TokenKind, uuid: &str) -> String {
        match kind {
            TokenKind::Access => format!("{}{}", self.access_prefix, uuid),
            TokenKind::Refresh => format!("{}{}", self.refresh_prefix, uuid),
        }
    }

    /// Mint a fresh pair for `user_id`. Does not touch the cache.
    pub fn create_token_pair(&self, user_id: i64) -> Result<CredentialPair, SignerError> {
        let subject = TokenSubject {
            user_id,
            access_uuid: Uuid::new_v4().to_string(),
            refresh_uuid: Uuid::new_v4().to_string(),
        };

        let access = self.signer.issue(TokenKind::Access, &subject, self.access_ttl)?;
        let refresh = self
            .signer
            .issue(TokenKind::Refresh, &subject, self.refresh_ttl)?;

        Ok(CredentialPair {
            user_id,
            access_token: access.token,
            refresh_token: refresh.token,
            access_uuid: subject.access_uuid,
            refresh_uuid: subject.refresh_uuid,
            access_expiry: access.claims.exp,
            refresh_expiry: refresh.claims.exp,
        })
    }

    /// Register both uuids of `pair`, each for the remaining lifetime of its
    /// token. Fails if either write fails.
    pub async fn store_token_pair(&self, pair: &CredentialPair) -> Result<(), CacheError> {
        let now = Utc::now().timestamp();

        self.cache
            .set(
                &self.uuid_key(TokenKind::Access, &pair.access_uuid),
                pair.user_id,
                remaining_ttl(pair.access_expiry, now),
            )
            .await?;

        self.cache
            .set(
                &self.uuid_key(TokenKind::Refresh, &pair.refresh_uuid),
                pair.user_id,
                remaining_ttl(pair.refresh_expiry, now),
            )
            .await?;

        tracing::debug!(user_id = pair.user_id, "token pair stored");
        Ok(())
    }

    /// Unregister both uuids of a pair, returning how many were still
    /// registered. Already-absent uuids are fine.
    pub async fn revoke_token_pair(
        &self,
        access_uuid: &str,
        refresh_uuid: &str,
    ) -> Result<u64, CacheError> {
        let keys = [
            self.uuid_key(TokenKind::Access, access_uuid),
            self.uuid_key(TokenKind::Refresh, refresh_uuid),
        ];
        self.cache.del(&keys).await
    }

    /// Check signature, expiry, registration and ownership of `token`
    pub async fn verify_credential(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Claims, TokenError> {
        let claims = self.signer.parse(token, kind).map_err(|e| {
            tracing::debug!(kind = kind.as_str(), error = %e, "token failed to parse");
            TokenError::Rejected(e.into())
        })?;

        let uuid = match kind {
            TokenKind::Access => &claims.aid,
            TokenKind::Refresh => &claims.rid,
        };
        let key = self.uuid_key(kind, uuid);

        let stored = match self.cache.get(&key).await {
            Ok(stored) => stored,
            Err(CacheError::NotFound) => {
                tracing::debug!(
                    kind = kind.as_str(),
                    user_id = claims.uid,
                    "token uuid not registered"
                );
                return Err(TokenError::Rejected(CredentialError::NotRegistered));
            }
            Err(e) => {
                tracing::error!(kind = kind.as_str(), error = %e, "credential cache lookup failed");
                return Err(TokenError::Cache(e));
            }
        };

        match stored.parse::<i64>() {
            Ok(owner) if owner == claims.uid => Ok(claims),
            _ => {
                tracing::warn!(
                    kind = kind.as_str(),
                    user_id = claims.uid,
                    "token uuid registered to a different user"
                );
                Err(TokenError::Rejected(CredentialError::UserMismatch))
            }
        }
    }
}

/// Seconds until `expiry`, never zero since zero means "no expiry"
fn remaining_ttl(expiry: i64, now: i64) -> u64 {
    (expiry - now).max(1) as u64
}
