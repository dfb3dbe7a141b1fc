//! API handlers for the OMS backend

pub mod auth;
pub mod health;

pub use auth::*;
pub use health::health_check;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::AuthenticatedUser;
