//! Authentication models

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::UserSnapshot;

/// Access and refresh tokens issued together.
///
/// Both uuids are embedded in both tokens; the pair is live only while both
/// uuids resolve in the credential cache to `user_id`.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub access_uuid: String,
    pub refresh_uuid: String,
    /// Unix timestamp
    pub access_expiry: i64,
    /// Unix timestamp
    pub refresh_expiry: i64,
}

/// The principal of one authenticated request; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub access_uuid: String,
    pub refresh_uuid: String,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Tokens plus the caller's profile, returned by login and refresh
#[derive(Debug, Serialize, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token expiry (Unix timestamp)
    pub expires_in: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_in: i64,
    pub user: UserSnapshot,
}

impl LoginResponse {
    pub fn new(pair: CredentialPair, user: UserSnapshot) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.access_expiry,
            refresh_expires_in: pair.refresh_expiry,
            user,
        }
    }
}

/// Result of verifying an access token
#[derive(Debug, Serialize, Clone)]
pub struct VerifiedSession {
    pub identity: SessionIdentity,
    pub user: UserSnapshot,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
