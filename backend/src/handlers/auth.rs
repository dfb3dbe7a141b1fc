//! Authentication HTTP handlers
//!
//! Endpoints for email/password login and the token lifecycle.

use axum::{extract::State, Json};
use validator::Validate;

use super::AuthenticatedUser;
use crate::auth::AuthError;
use crate::error::ApiResult;
use crate::models::{
    LoginRequest, LoginResponse, MessageResponse, RefreshTokenRequest, VerifiedSession,
};
use crate::state::AppState;

/// POST /v1/login - Authenticate with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let response = state
        .session_service
        .login(&req.email, &req.password)
        .await?;

    Ok(Json(response))
}

/// POST /v1/logout - Revoke the pair behind the presented access token
pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<MessageResponse>> {
    state.session_service.logout(&user.identity).await?;

    Ok(Json(MessageResponse {
        message: "Successfully logged out".to_string(),
    }))
}

/// POST /v1/token/refresh - Rotate a refresh token into a new pair
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> ApiResult<Json<LoginResponse>> {
    match state.session_service.refresh_token(&req.refresh_token).await {
        Ok(response) => Ok(Json(response)),
        // The new pair is already live; the old one expires on its own
        Err(AuthError::RotationIncomplete {
            issued,
            stale_access_uuid,
            stale_refresh_uuid,
            source,
        }) => {
            tracing::error!(
                user_id = issued.user.id,
                stale_access_uuid = %stale_access_uuid,
                stale_refresh_uuid = %stale_refresh_uuid,
                error = %source,
                "old token pair left active after rotation"
            );
            Ok(Json(*issued))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /v1/token/verify - Resolve the presented access token
pub async fn verify_token(user: AuthenticatedUser) -> Json<VerifiedSession> {
    Json(VerifiedSession {
        identity: user.identity,
        user: user.user,
    })
}
