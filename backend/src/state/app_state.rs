//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::SessionService;
use crate::cache::CredentialCache;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session_service: Arc<SessionService>,
    /// Only read by the health check; the auth core goes through its stores
    pub db_pool: PgPool,
    pub cache: CredentialCache,
}

impl AppState {
    pub fn new(
        session_service: Arc<SessionService>,
        db_pool: PgPool,
        cache: CredentialCache,
    ) -> Self {
        Self {
            session_service,
            db_pool,
            cache,
        }
    }
}

impl FromRef<AppState> for Arc<SessionService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.session_service.clone()
    }
}
