//! Session service
//!
//! Login, logout, refresh and verification of credential pairs. Composes the
//! token authority with the user store and the cached user snapshots.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::authority::{CredentialError, TokenAuthority, TokenError};
use super::jwt::{SignerError, TokenKind};
use crate::cache::{CacheError, CredentialCache};
use crate::config::{CacheConfig, Config};
use crate::db::{StoreError, UserStore};
use crate::models::{CredentialPair, LoginResponse, SessionIdentity, UserSnapshot, VerifiedSession};

/// Session service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Unknown email")]
    InvalidEmail,

    #[error("Wrong password")]
    InvalidPassword,

    #[error("Invalid access token: {0}")]
    InvalidAccessToken(CredentialError),

    #[error("Invalid refresh token: {0}")]
    InvalidRefreshToken(CredentialError),

    #[error("Failed to create token pair: {0}")]
    CreateToken(SignerError),

    #[error("Failed to store token pair: {0}")]
    StoreToken(CacheError),

    #[error("Credential cache error: {0}")]
    Cache(CacheError),

    #[error("User store error: {0}")]
    UserStore(StoreError),

    /// The new pair is live but the old one could not be revoked
    #[error("Token rotation incomplete: {source}")]
    RotationIncomplete {
        issued: Box<LoginResponse>,
        stale_access_uuid: String,
        stale_refresh_uuid: String,
        source: CacheError,
    },

    #[error("Session operation exceeded its deadline")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether the caller failed to prove who they are, as opposed to the
    /// service failing to find out
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidEmail
                | AuthError::InvalidPassword
                | AuthError::InvalidAccessToken(_)
                | AuthError::InvalidRefreshToken(_)
        )
    }
}

/// Session service tunables
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user_prefix: String,
    pub store_timeout: Duration,
    pub request_timeout: Duration,
    /// Cost of the decoy hash compared against when the email is unknown
    pub password_cost: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_prefix: config.cache.user_prefix.clone(),
            store_timeout: config.store_timeout,
            request_timeout: config.request_timeout,
            password_cost: config.password_cost,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_prefix: CacheConfig::default().user_prefix,
            store_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Session service
#[derive(Clone)]
pub struct SessionService {
    tokens: TokenAuthority,
    users: Arc<dyn UserStore>,
    cache: CredentialCache,
    user_prefix: String,
    store_timeout: Duration,
    request_timeout: Duration,
    decoy_hash: Arc<str>,
}

impl SessionService {
    /// Fails only if `settings.password_cost` is outside what bcrypt accepts.
    pub fn new(
        tokens: TokenAuthority,
        users: Arc<dyn UserStore>,
        cache: CredentialCache,
        settings: SessionSettings,
    ) -> Result<Self, AuthError> {
        let decoy_hash = bcrypt::hash(Uuid::new_v4().to_string(), settings.password_cost)
            .map_err(|e| AuthError::Internal(format!("failed to build decoy hash: {}", e)))?;

        Ok(Self {
            tokens,
            users,
            cache,
            user_prefix: settings.user_prefix,
            store_timeout: settings.store_timeout,
            request_timeout: settings.request_timeout,
            decoy_hash: decoy_hash.into(),
        })
    }

    /// Authenticate by email and password and issue a new pair
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        self.within_deadline("login", self.login_inner(email, password))
            .await
    }

    /// Revoke the pair behind `identity`. Revoking an already revoked pair
    /// succeeds.
    pub async fn logout(&self, identity: &SessionIdentity) -> Result<(), AuthError> {
        self.within_deadline("logout", self.logout_inner(identity))
            .await
    }

    /// Exchange a live refresh token for a new pair.
    ///
    /// The new pair is stored before the old one is revoked. If two callers
    /// race on the same refresh token only the one whose revoke actually
    /// removed the old pair wins; the other drops its new pair and is told the
    /// token is no longer registered.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<LoginResponse, AuthError> {
        self.within_deadline("refresh_token", self.refresh_token_inner(refresh_token))
            .await
    }

    /// Resolve an access token to its session and user snapshot
    pub async fn verify_token(&self, access_token: &str) -> Result<VerifiedSession, AuthError> {
        self.within_deadline("verify_token", self.verify_token_inner(access_token))
            .await
    }

    async fn login_inner(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let user = match self.bounded(self.users.get_by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                tracing::debug!("login for unknown email");
                // Same bcrypt work as a known email with a wrong password
                let _ = verify_password(password, &self.decoy_hash).await;
                return Err(AuthError::InvalidEmail);
            }
            Err(e) => return Err(AuthError::UserStore(e)),
        };

        check_password(password, &user.password_hash, user.id).await?;

        let pair = self
            .tokens
            .create_token_pair(user.id)
            .map_err(AuthError::CreateToken)?;
        self.store_pair(&pair).await?;

        self.record_login(user.id).await;

        let snapshot = match self.user_snapshot(user.id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.discard_pair(&pair).await;
                return Err(e);
            }
        };

        tracing::info!(user_id = user.id, "user logged in");
        Ok(LoginResponse::new(pair, snapshot))
    }

    async fn logout_inner(&self, identity: &SessionIdentity) -> Result<(), AuthError> {
        self.tokens
            .revoke_token_pair(&identity.access_uuid, &identity.refresh_uuid)
            .await
            .map_err(AuthError::Cache)?;

        tracing::info!(user_id = identity.user_id, "user logged out");
        Ok(())
    }

    async fn refresh_token_inner(&self, refresh_token: &str) -> Result<LoginResponse, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let claims = self
            .tokens
            .verify_credential(refresh_token, TokenKind::Refresh)
            .await
            .map_err(|e| match e {
                TokenError::Rejected(reason) => AuthError::InvalidRefreshToken(reason),
                TokenError::Cache(e) => AuthError::Cache(e),
            })?;

        match self.bounded(self.users.get_by_id(claims.uid)).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                tracing::warn!(user_id = claims.uid, "refresh for a user that no longer exists");
                if let Err(e) = self.tokens.revoke_token_pair(&claims.aid, &claims.rid).await {
                    tracing::error!(user_id = claims.uid, error = %e, "failed to revoke orphaned pair");
                }
                if let Err(e) = self.invalidate_user(claims.uid).await {
                    tracing::warn!(user_id = claims.uid, error = %e, "failed to invalidate user snapshot");
                }
                return Err(AuthError::InvalidRefreshToken(CredentialError::UnknownUser));
            }
            Err(e) => return Err(AuthError::UserStore(e)),
        }

        let pair = self
            .tokens
            .create_token_pair(claims.uid)
            .map_err(AuthError::CreateToken)?;
        self.store_pair(&pair).await?;

        let snapshot = match self.user_snapshot(claims.uid).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.discard_pair(&pair).await;
                return Err(e);
            }
        };

        let new_access_uuid = pair.access_uuid.clone();
        let new_refresh_uuid = pair.refresh_uuid.clone();
        let issued = LoginResponse::new(pair, snapshot);

        match self.tokens.revoke_token_pair(&claims.aid, &claims.rid).await {
            Ok(0) => {
                tracing::warn!(
                    user_id = claims.uid,
                    "refresh token revoked concurrently, dropping new pair"
                );
                if let Err(e) = self
                    .tokens
                    .revoke_token_pair(&new_access_uuid, &new_refresh_uuid)
                    .await
                {
                    tracing::error!(user_id = claims.uid, error = %e, "failed to drop new pair");
                }
                Err(AuthError::InvalidRefreshToken(CredentialError::NotRegistered))
            }
            Ok(_) => {
                tracing::info!(user_id = claims.uid, "token pair rotated");
                Ok(issued)
            }
            Err(e) => {
                tracing::error!(user_id = claims.uid, error = %e, "failed to revoke rotated pair");
                Err(AuthError::RotationIncomplete {
                    issued: Box::new(issued),
                    stale_access_uuid: claims.aid,
                    stale_refresh_uuid: claims.rid,
                    source: e,
                })
            }
        }
    }

    async fn verify_token_inner(&self, access_token: &str) -> Result<VerifiedSession, AuthError> {
        if access_token.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let claims = self
            .tokens
            .verify_credential(access_token, TokenKind::Access)
            .await
            .map_err(|e| match e {
                TokenError::Rejected(reason) => AuthError::InvalidAccessToken(reason),
                TokenError::Cache(e) => AuthError::Cache(e),
            })?;

        let user = self.user_snapshot(claims.uid).await?;

        Ok(VerifiedSession {
            identity: SessionIdentity {
                user_id: claims.uid,
                access_uuid: claims.aid,
                refresh_uuid: claims.rid,
            },
            user,
        })
    }

    /// Drop the cached snapshot of `user_id` so the next read rebuilds it
    pub async fn invalidate_user(&self, user_id: i64) -> Result<(), AuthError> {
        self.cache
            .del(&[self.user_key(user_id)])
            .await
            .map_err(AuthError::Cache)?;
        Ok(())
    }

    /// Read-through lookup of the user snapshot
    pub async fn user_snapshot(&self, user_id: i64) -> Result<UserSnapshot, AuthError> {
        let key = self.user_key(user_id);

        match self.cache.get_struct::<UserSnapshot>(&key).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(CacheError::NotFound) => {}
            Err(CacheError::Serialization(e)) => {
                tracing::warn!(user_id, error = %e, "cached user snapshot unreadable, rebuilding");
            }
            Err(e) => return Err(AuthError::Cache(e)),
        }

        let projection = self
            .bounded(self.users.get_projection(user_id))
            .await
            .map_err(AuthError::UserStore)?;
        let snapshot = UserSnapshot::from(projection);

        if let Err(e) = self.cache.set_struct(&key, &snapshot, 0).await {
            tracing::warn!(user_id, error = %e, "failed to cache user snapshot");
        }

        Ok(snapshot)
    }

    fn user_key(&self, user_id: i64) -> String {
        format!("{}{}", self.user_prefix, user_id)
    }

    async fn record_login(&self, user_id: i64) {
        if let Err(e) = self
            .bounded(self.users.update_last_login(user_id, Utc::now()))
            .await
        {
            tracing::warn!(user_id, error = %e, "failed to record last login");
            return;
        }

        if let Err(e) = self.invalidate_user(user_id).await {
            tracing::warn!(user_id, error = %e, "failed to invalidate user snapshot");
        }
    }

    /// Store a freshly minted pair, removing whatever half of it landed if
    /// the store fails
    async fn store_pair(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        if let Err(e) = self.tokens.store_token_pair(pair).await {
            self.discard_pair(pair).await;
            return Err(AuthError::StoreToken(e));
        }
        Ok(())
    }

    /// Best-effort revoke of a pair that was stored but never handed out
    async fn discard_pair(&self, pair: &CredentialPair) {
        if let Err(e) = self
            .tokens
            .revoke_token_pair(&pair.access_uuid, &pair.refresh_uuid)
            .await
        {
            tracing::error!(user_id = pair.user_id, error = %e, "failed to discard unissued pair");
        }
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "user store call timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }

    async fn within_deadline<T>(
        &self,
        operation: &'static str,
        op: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.request_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "session operation exceeded its deadline"
                );
                Err(AuthError::DeadlineExceeded)
            }
        }
    }
}

/// Run `bcrypt::verify` on the blocking pool
async fn verify_password(password: &str, hash: &str) -> Result<bcrypt::BcryptResult<bool>, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))
}

async fn check_password(password: &str, hash: &str, user_id: i64) -> Result<(), AuthError> {
    match verify_password(password, hash).await? {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(user_id, "login with wrong password");
            Err(AuthError::InvalidPassword)
        }
        Err(e) => {
            tracing::warn!(user_id, error = %e, "stored password hash is unusable");
            Err(AuthError::InvalidPassword)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures() {
        assert!(AuthError::InvalidEmail.is_authentication_failure());
        assert!(AuthError::InvalidPassword.is_authentication_failure());
        assert!(
            AuthError::InvalidAccessToken(CredentialError::Expired).is_authentication_failure()
        );
        assert!(AuthError::InvalidRefreshToken(CredentialError::NotRegistered)
            .is_authentication_failure());

        assert!(!AuthError::MissingCredentials.is_authentication_failure());
        assert!(!AuthError::Cache(CacheError::Timeout).is_authentication_failure());
        assert!(!AuthError::UserStore(StoreError::Timeout).is_authentication_failure());
        assert!(!AuthError::DeadlineExceeded.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_check_password() {
        let hash = bcrypt::hash("hunter2", 4).unwrap();

        assert!(check_password("hunter2", &hash, 1).await.is_ok());
        assert!(matches!(
            check_password("hunter3", &hash, 1).await,
            Err(AuthError::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn test_unusable_hash_is_wrong_password() {
        assert!(matches!(
            check_password("hunter2", "not-a-bcrypt-hash", 1).await,
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.user_prefix, "user:");
        assert_eq!(settings.password_cost, bcrypt::DEFAULT_COST);
        assert!(settings.request_timeout > settings.store_timeout);
    }
}
