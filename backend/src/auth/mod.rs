//! Authentication core
//!
//! - Signed, time-bound access and refresh tokens
//! - Registration and revocation of token uuids in the credential cache
//! - Login, logout, refresh and verification of sessions

mod authority;
mod jwt;
mod service;

pub use authority::{CredentialError, TokenAuthority, TokenError};
pub use jwt::{Claims, JwtSigner, SignedToken, SignerError, TokenKind, TokenSigner, TokenSubject};
pub use service::{AuthError, SessionService, SessionSettings};
