//! OMS Backend Library
//!
//! Authentication and session core of the order-management service: token
//! signing, the Redis-backed credential cache, the token authority and the
//! session service, plus the HTTP surface that exposes them.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
