//! Authentication extractor
//!
//! Resolves the Bearer access token of a request into a verified session.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

use crate::auth::SessionService;
use crate::error::ApiError;
use crate::models::{SessionIdentity, UserSnapshot, VerifiedSession};

/// Caller of an authenticated request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: SessionIdentity,
    pub user: UserSnapshot,
}

impl From<VerifiedSession> for AuthenticatedUser {
    fn from(session: VerifiedSession) -> Self {
        Self {
            identity: session.identity,
            user: session.user,
        }
    }
}

/// Extractor for authenticated users
///
/// Verifies the access token from the Authorization header against the
/// credential cache; a revoked token is rejected even when its signature is
/// still good.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.identity.user_id)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<SessionService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthorized(
                        "Authorization header with Bearer token required".to_string(),
                    )
                })?;

        let session_service = Arc::<SessionService>::from_ref(state);
        let session = session_service.verify_token(bearer.token()).await?;

        Ok(session.into())
    }
}
