//! Middleware for the OMS API
//!
//! Request tracing and authentication.

pub mod auth;
mod tracing;

pub use auth::AuthenticatedUser;
pub use self::tracing::request_tracing;
