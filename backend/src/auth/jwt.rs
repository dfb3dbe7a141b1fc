//! JWT token signing and verification
//!
//! Access and refresh tokens are signed with independent HS256 secrets so a
//! leaked access secret cannot mint refresh tokens and vice versa.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;

/// Signer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token kind mismatch")]
    WrongKind,
}

/// Token kind; each kind has its own secret and lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims embedded in both token kinds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub uid: i64,
    /// Access token uuid (revocation handle)
    pub aid: String,
    /// Refresh token uuid (revocation handle)
    pub rid: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Token kind
    pub typ: TokenKind,
}

impl Claims {
    fn check_required(&self) -> Result<(), SignerError> {
        if self.uid <= 0 {
            return Err(SignerError::Malformed("missing user id".to_string()));
        }
        if self.aid.is_empty() || self.rid.is_empty() {
            return Err(SignerError::Malformed("missing token uuid".to_string()));
        }
        Ok(())
    }
}

/// What a token is about: the user and the pair's two revocation handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: i64,
    pub access_uuid: String,
    pub refresh_uuid: String,
}

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

/// Produces and verifies signed, time-bound tokens
pub trait TokenSigner: Send + Sync {
    /// Sign `subject` as a `kind` token that expires `ttl` from now
    fn issue(
        &self,
        kind: TokenKind,
        subject: &TokenSubject,
        ttl: Duration,
    ) -> Result<SignedToken, SignerError>;

    /// Verify signature and expiry against the `kind` secret
    fn parse(&self, token: &str, kind: TokenKind) -> Result<Claims, SignerError>;
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 signer with one secret per token kind
pub struct JwtSigner {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl JwtSigner {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            validation,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(&config.access_secret, &config.refresh_secret)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

impl TokenSigner for JwtSigner {
    fn issue(
        &self,
        kind: TokenKind,
        subject: &TokenSubject,
        ttl: Duration,
    ) -> Result<SignedToken, SignerError> {
        let now = Utc::now();
        let exp = now + ttl;

        let claims = Claims {
            uid: subject.user_id,
            aid: subject.access_uuid.clone(),
            rid: subject.refresh_uuid.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            typ: kind,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|e| SignerError::EncodingFailed(e.to_string()))?;

        Ok(SignedToken { token, claims })
    }

    fn parse(&self, token: &str, kind: TokenKind) -> Result<Claims, SignerError> {
        let token_data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    SignerError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => SignerError::Expired,
                _ => SignerError::Malformed(e.to_string()),
            })?;

        let claims = token_data.claims;
        if claims.typ != kind {
            return Err(SignerError::WrongKind);
        }
        claims.check_required()?;

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn signer() -> JwtSigner {
        JwtSigner::new("access-secret", "refresh-secret")
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 42,
            access_uuid: Uuid::new_v4().to_string(),
            refresh_uuid: Uuid::new_v4().to_string(),
        }
    }

    #[test]
    fn test_issue_and_parse_access_token() {
        let signer = signer();
        let subject = subject();

        let signed = signer
            .issue(TokenKind::Access, &subject, Duration::minutes(15))
            .unwrap();
        assert!(!signed.token.is_empty());

        let claims = signer.parse(&signed.token, TokenKind::Access).unwrap();
        assert_eq!(claims, signed.claims);
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.aid, subject.access_uuid);
        assert_eq!(claims.rid, subject.refresh_uuid);
        assert_eq!(claims.typ, TokenKind::Access);
    }

    #[test]
    fn test_expiry_is_now_plus_ttl() {
        let before = Utc::now().timestamp();
        let signed = signer()
            .issue(TokenKind::Refresh, &subject(), Duration::days(7))
            .unwrap();
        let after = Utc::now().timestamp();

        let week = Duration::days(7).num_seconds();
        assert!(signed.claims.exp >= before + week);
        assert!(signed.claims.exp <= after + week);
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let signer = signer();
        let signed = signer
            .issue(TokenKind::Access, &subject(), Duration::minutes(15))
            .unwrap();

        let result = signer.parse(&signed.token, TokenKind::Refresh);
        assert_eq!(result.unwrap_err(), SignerError::InvalidSignature);
    }

    #[test]
    fn test_kind_claim_checked_even_with_shared_secret() {
        let signer = JwtSigner::new("same", "same");
        let signed = signer
            .issue(TokenKind::Access, &subject(), Duration::minutes(15))
            .unwrap();

        let result = signer.parse(&signed.token, TokenKind::Refresh);
        assert_eq!(result.unwrap_err(), SignerError::WrongKind);
    }

    #[test]
    fn test_expired_token() {
        let signer = signer();
        let signed = signer
            .issue(TokenKind::Access, &subject(), Duration::seconds(-30))
            .unwrap();

        let result = signer.parse(&signed.token, TokenKind::Access);
        assert_eq!(result.unwrap_err(), SignerError::Expired);
    }

    #[test]
    fn test_garbage_token() {
        let result = signer().parse("invalid.token.here", TokenKind::Access);
        assert!(matches!(result, Err(SignerError::Malformed(_))));
    }

    #[test]
    fn test_foreign_algorithm_rejected() {
        let subject = subject();
        let now = Utc::now().timestamp();
        let claims = Claims {
            uid: subject.user_id,
            aid: subject.access_uuid,
            rid: subject.refresh_uuid,
            iat: now,
            exp: now + 900,
            typ: TokenKind::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        let result = signer().parse(&token, TokenKind::Access);
        assert_eq!(result.unwrap_err(), SignerError::InvalidSignature);
    }

    #[test]
    fn test_missing_uuid_rejected() {
        let signer = signer();
        let subject = TokenSubject {
            user_id: 1,
            access_uuid: String::new(),
            refresh_uuid: Uuid::new_v4().to_string(),
        };
        let signed = signer
            .issue(TokenKind::Access, &subject, Duration::minutes(15))
            .unwrap();

        let result = signer.parse(&signed.token, TokenKind::Access);
        assert!(matches!(result, Err(SignerError::Malformed(_))));
    }
}
